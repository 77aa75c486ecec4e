//! Request extractors.

mod principal;

pub use principal::{bearer_token, AuthPrincipal};
