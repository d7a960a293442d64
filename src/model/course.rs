use super::bootcamp::BOOTCAMPS;
use super::resource::{DefaultValue, FieldDef, FieldKind, IncludeSpec, Join, Resource, ResourceDef};
use crate::auth::Role;

pub const SKILLS: &[&str] = &["beginner", "intermediate", "advanced"];

pub static COURSES: ResourceDef = ResourceDef {
    name: "courses",
    label: "Course",
    table: "courses",
    fields: &[
        FieldDef::new("title", FieldKind::Text).required("Please add a course title"),
        FieldDef::new("description", FieldKind::Text).required("Please add a description"),
        FieldDef::new("weeks", FieldKind::Number).required("Please add number of weeks"),
        FieldDef::new("tuition", FieldKind::Number).required("Please add a tuition cost"),
        FieldDef::new("minimumSkill", FieldKind::Text)
            .required("Please add a minimum skill")
            .one_of(SKILLS, "Minimum skill must be beginner, intermediate or advanced"),
        FieldDef::new("scholarshipAvailable", FieldKind::Boolean)
            .default_value(DefaultValue::Bool(false)),
        FieldDef::new("bootcamp", FieldKind::Reference).required("Please add a bootcamp"),
        FieldDef::new("user", FieldKind::Reference),
    ],
    includes: &[IncludeSpec {
        field: "bootcamp",
        related: &BOOTCAMPS,
        join: Join::BelongsTo { local: "bootcamp" },
        select: &["name", "description"],
    }],
    cascades: &[],
    owner_field: Some("user"),
    writer_roles: &[Role::Publisher, Role::Admin],
    max_per_owner: None,
    slug: None,
    geocode: None,
};

pub struct Courses;

impl Resource for Courses {
    fn def() -> &'static ResourceDef {
        &COURSES
    }
}
