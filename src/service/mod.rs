//! CrudService: generic resource operations over the store capability.

mod crud;
mod validation;
pub use crud::{parse_id, CrudService};
pub use validation::RequestValidator;
