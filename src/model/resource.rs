//! Resource definitions: fields, validation rules, includes and ownership.
//! Definitions are plain statics so handlers can be generic over a resource type.

use crate::auth::Role;
use serde_json::{Number, Value};

/// Field type, used to coerce query-string operands and to validate bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    TextList,
    /// GeoJSON point object.
    Point,
    /// Id of a record in another resource.
    Reference,
}

impl FieldKind {
    /// Convert a string to this kind when it parses (`"8"` to a number, `"true"` to a
    /// boolean). Arrays are converted element-wise; anything else is returned unchanged.
    pub fn coerce(self, value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.coerce(v)).collect()),
            Value::String(s) => self.coerce_str(s),
            other => other,
        }
    }

    fn coerce_str(self, s: String) -> Value {
        match self {
            FieldKind::Number => parse_number(s.trim()).unwrap_or(Value::String(s)),
            FieldKind::Boolean => {
                if s.eq_ignore_ascii_case("true") {
                    Value::Bool(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Value::Bool(false)
                } else {
                    Value::String(s)
                }
            }
            FieldKind::Text | FieldKind::TextList | FieldKind::Point | FieldKind::Reference => Value::String(s),
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    let f = s.parse::<f64>().ok()?;
    Number::from_f64(f).map(Value::Number)
}

/// A rule limit paired with the message reported when it is violated.
#[derive(Clone, Copy, Debug)]
pub struct Check<T> {
    pub value: T,
    pub message: &'static str,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationRule {
    pub required: Option<&'static str>,
    pub max_length: Option<Check<usize>>,
    pub pattern: Option<Check<&'static str>>,
    pub allowed: Option<Check<&'static [&'static str]>>,
    pub minimum: Option<Check<f64>>,
    pub maximum: Option<Check<f64>>,
}

#[derive(Clone, Copy, Debug)]
pub enum DefaultValue {
    Bool(bool),
    Text(&'static str),
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::Bool(b) => Value::Bool(b),
            DefaultValue::Text(s) => Value::String(s.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub rules: ValidationRule,
    pub unique: bool,
    pub default: Option<DefaultValue>,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        FieldDef {
            name,
            kind,
            rules: ValidationRule {
                required: None,
                max_length: None,
                pattern: None,
                allowed: None,
                minimum: None,
                maximum: None,
            },
            unique: false,
            default: None,
        }
    }

    pub const fn required(mut self, message: &'static str) -> Self {
        self.rules.required = Some(message);
        self
    }

    pub const fn max_length(mut self, value: usize, message: &'static str) -> Self {
        self.rules.max_length = Some(Check { value, message });
        self
    }

    pub const fn pattern(mut self, value: &'static str, message: &'static str) -> Self {
        self.rules.pattern = Some(Check { value, message });
        self
    }

    pub const fn one_of(mut self, value: &'static [&'static str], message: &'static str) -> Self {
        self.rules.allowed = Some(Check { value, message });
        self
    }

    pub const fn minimum(mut self, value: f64, message: &'static str) -> Self {
        self.rules.minimum = Some(Check { value, message });
        self
    }

    pub const fn maximum(mut self, value: f64, message: &'static str) -> Self {
        self.rules.maximum = Some(Check { value, message });
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// How an included resource relates to the primary one.
#[derive(Clone, Copy, Debug)]
pub enum Join {
    /// Related records whose `foreign` field holds this record's id (to-many).
    HasMany { foreign: &'static str },
    /// The related record whose id is held in this record's `local` field (to-one).
    BelongsTo { local: &'static str },
}

/// Related records expanded into list/read responses under `field`.
#[derive(Clone, Copy)]
pub struct IncludeSpec {
    pub field: &'static str,
    pub related: &'static ResourceDef,
    pub join: Join,
    /// Fields of the related record to keep; empty keeps all.
    pub select: &'static [&'static str],
}

/// Records of `related` removed together with the owning record.
#[derive(Clone, Copy)]
pub struct Cascade {
    pub related: &'static ResourceDef,
    pub foreign: &'static str,
}

// Definitions reference each other, so Debug prints related resources by name.
impl std::fmt::Debug for IncludeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeSpec")
            .field("field", &self.field)
            .field("related", &self.related.name)
            .field("join", &self.join)
            .field("select", &self.select)
            .finish()
    }
}

impl std::fmt::Debug for Cascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cascade")
            .field("related", &self.related.name)
            .field("foreign", &self.foreign)
            .finish()
    }
}

/// Derived field computed from another one on create/update.
#[derive(Clone, Copy, Debug)]
pub struct Derived {
    pub source: &'static str,
    pub target: &'static str,
}

#[derive(Debug)]
pub struct ResourceDef {
    /// Plural API name, also the route segment (e.g. "bootcamps").
    pub name: &'static str,
    /// Singular label used in messages (e.g. "Bootcamp").
    pub label: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub includes: &'static [IncludeSpec],
    pub cascades: &'static [Cascade],
    /// Field holding the id of the user that owns the record.
    pub owner_field: Option<&'static str>,
    /// Roles allowed to create, update or delete.
    pub writer_roles: &'static [Role],
    /// Maximum records a non-admin user may own.
    pub max_per_owner: Option<u64>,
    pub slug: Option<Derived>,
    /// Address field geocoded into a GeoJSON point.
    pub geocode: Option<Derived>,
}

impl ResourceDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Kind of the top-level field a dotted path starts with.
    pub fn kind_of(&self, path: &str) -> Option<FieldKind> {
        let head = path.split('.').next().unwrap_or(path);
        self.field(head).map(|f| f.kind)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn is_writer(&self, role: Role) -> bool {
        self.writer_roles.contains(&role)
    }

    /// Fields computed by the service (slug, geocoded location); never taken from a body.
    pub fn is_derived(&self, name: &str) -> bool {
        [self.slug, self.geocode].iter().flatten().any(|d| d.target == name)
    }

    /// Owner and parent links are fixed when the record is created.
    pub fn is_fixed_after_create(&self, name: &str) -> bool {
        self.owner_field == Some(name) || self.field(name).is_some_and(|f| f.kind == FieldKind::Reference)
    }
}

/// A resource type the generic handlers can be instantiated with.
pub trait Resource: Send + Sync + 'static {
    fn def() -> &'static ResourceDef;
}
