//! Identity: request principal, password hashing and signed tokens.

mod password;
mod principal;
mod token;

pub use password::{hash_password, verify_password};
pub use principal::Principal;
pub use token::{Claims, JwtService, REFRESH_WINDOW_SECS};
