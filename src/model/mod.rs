//! Resource model: static definitions for bootcamps and courses.

pub mod bootcamp;
pub mod course;
pub mod record;
pub mod resource;

pub use bootcamp::{Bootcamps, BOOTCAMPS};
pub use course::{Courses, COURSES};
pub use record::{lookup_path, record_id, slugify, Record, CREATED_AT_FIELD, ID_FIELD, SYSTEM_FIELDS};
pub use resource::{
    Cascade, Check, DefaultValue, Derived, FieldDef, FieldKind, IncludeSpec, Join, Resource,
    ResourceDef, ValidationRule,
};
