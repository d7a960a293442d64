//! SQL generation for the Postgres store: identifiers from resource definitions only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
