//! Safe SQL layer: identifiers from metadata only, values as parameters.

mod builder;
mod filter;
pub mod params;
mod query;

pub use builder::*;
pub use filter::*;
pub use params::*;
pub use query::*;
