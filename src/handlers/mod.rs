//! HTTP handlers: generic resource CRUD plus bootcamp-specific routes.

pub mod bootcamp;
pub mod resource;
