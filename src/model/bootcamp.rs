use super::course::COURSES;
use super::resource::{
    Cascade, DefaultValue, Derived, FieldDef, FieldKind, IncludeSpec, Join, Resource, ResourceDef,
};
use crate::auth::Role;

pub const CAREERS: &[&str] = &[
    "Web Development",
    "Mobile Development",
    "UI/UX",
    "Data Science",
    "Business",
    "Other",
];

const URL_PATTERN: &str =
    r"^https?://(www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_+.~#?&/=]*)$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$";

pub static BOOTCAMPS: ResourceDef = ResourceDef {
    name: "bootcamps",
    label: "Bootcamp",
    table: "bootcamps",
    fields: &[
        FieldDef::new("name", FieldKind::Text)
            .required("Please add a name")
            .max_length(50, "Name can not be more than 50 characters")
            .unique(),
        FieldDef::new("slug", FieldKind::Text),
        FieldDef::new("description", FieldKind::Text)
            .required("Please add a description")
            .max_length(500, "Description can not be more than 500 characters"),
        FieldDef::new("website", FieldKind::Text)
            .pattern(URL_PATTERN, "Please use a valid URL with HTTP or HTTPS"),
        FieldDef::new("phone", FieldKind::Text)
            .max_length(20, "Phone number can not be longer than 20 characters"),
        FieldDef::new("email", FieldKind::Text).pattern(EMAIL_PATTERN, "Please add a valid email"),
        FieldDef::new("address", FieldKind::Text).required("Please add an address"),
        FieldDef::new("location", FieldKind::Point),
        FieldDef::new("careers", FieldKind::TextList)
            .required("Please add at least one career")
            .one_of(CAREERS, "Please choose careers from the allowed list"),
        FieldDef::new("averageRating", FieldKind::Number)
            .minimum(1.0, "Rating must be at least 1")
            .maximum(10.0, "Rating can not be more than 10"),
        FieldDef::new("averageCost", FieldKind::Number),
        FieldDef::new("photo", FieldKind::Text).default_value(DefaultValue::Text("no-photo.jpg")),
        FieldDef::new("housing", FieldKind::Boolean).default_value(DefaultValue::Bool(false)),
        FieldDef::new("jobAssistance", FieldKind::Boolean).default_value(DefaultValue::Bool(false)),
        FieldDef::new("jobGuarantee", FieldKind::Boolean).default_value(DefaultValue::Bool(false)),
        FieldDef::new("acceptGi", FieldKind::Boolean).default_value(DefaultValue::Bool(false)),
        FieldDef::new("user", FieldKind::Reference),
    ],
    includes: &[IncludeSpec {
        field: "courses",
        related: &COURSES,
        join: Join::HasMany { foreign: "bootcamp" },
        select: &[],
    }],
    cascades: &[Cascade {
        related: &COURSES,
        foreign: "bootcamp",
    }],
    owner_field: Some("user"),
    writer_roles: &[Role::Publisher, Role::Admin],
    max_per_owner: Some(1),
    slug: Some(Derived {
        source: "name",
        target: "slug",
    }),
    geocode: Some(Derived {
        source: "address",
        target: "location",
    }),
};

pub struct Bootcamps;

impl Resource for Bootcamps {
    fn def() -> &'static ResourceDef {
        &BOOTCAMPS
    }
}
