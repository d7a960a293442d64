//! Request validation from resource field rules. Every violated rule is reported, in
//! field declaration order.

use crate::error::AppError;
use crate::model::{FieldDef, FieldKind, Record, ResourceDef, SYSTEM_FIELDS};
use regex::Regex;
use serde_json::Value;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a full document. All required fields must be present.
    pub fn validate(def: &ResourceDef, body: &Record) -> Result<(), AppError> {
        let mut errors = Vec::new();
        for field in def.fields {
            match body.get(field.name) {
                Some(v) if !is_blank(v) => check_field(field, v, &mut errors),
                _ => {
                    if let Some(message) = field.rules.required {
                        errors.push(message.to_string());
                    }
                }
            }
        }
        finish(errors)
    }

    /// Validate only the fields present in body (for updates). A required field may not be
    /// cleared.
    pub fn validate_partial(def: &ResourceDef, body: &Record) -> Result<(), AppError> {
        let mut errors = Vec::new();
        for field in def.fields {
            let Some(v) = body.get(field.name) else { continue };
            if is_blank(v) {
                if let Some(message) = field.rules.required {
                    errors.push(message.to_string());
                }
                continue;
            }
            check_field(field, v, &mut errors);
        }
        finish(errors)
    }

    /// Keep only declared, client-writable fields, with string values converted to the
    /// field kind where they parse.
    pub fn sanitize(def: &ResourceDef, body: Record) -> Record {
        body.into_iter()
            .filter(|(k, _)| !SYSTEM_FIELDS.contains(&k.as_str()) && !def.is_derived(k))
            .filter_map(|(k, v)| {
                let kind = def.field(&k)?.kind;
                Some((k, kind.coerce(v)))
            })
            .collect()
    }

    /// Fill declared defaults for absent fields.
    pub fn apply_defaults(def: &ResourceDef, body: &mut Record) {
        for field in def.fields {
            if let Some(default) = field.default {
                body.entry(field.name.to_string()).or_insert_with(|| default.to_value());
            }
        }
    }
}

fn finish(errors: Vec<String>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationFailed(errors))
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn check_field(field: &FieldDef, v: &Value, errors: &mut Vec<String>) {
    let rules = &field.rules;
    match field.kind {
        FieldKind::Text | FieldKind::Reference => {
            let Some(s) = v.as_str() else {
                errors.push(format!("{} must be a string", field.name));
                return;
            };
            check_text(field, s, errors);
        }
        FieldKind::TextList => {
            let items: Vec<&str> = match v {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => match items.iter().map(Value::as_str).collect::<Option<Vec<_>>>() {
                    Some(items) => items,
                    None => {
                        errors.push(format!("{} must be a list of strings", field.name));
                        return;
                    }
                },
                _ => {
                    errors.push(format!("{} must be a list of strings", field.name));
                    return;
                }
            };
            if let Some(allowed) = rules.allowed {
                if items.iter().any(|i| !allowed.value.contains(i)) {
                    errors.push(allowed.message.to_string());
                }
            }
        }
        FieldKind::Number => {
            let Some(n) = v.as_f64() else {
                errors.push(format!("{} must be a number", field.name));
                return;
            };
            if let Some(min) = rules.minimum {
                if n < min.value {
                    errors.push(min.message.to_string());
                }
            }
            if let Some(max) = rules.maximum {
                if n > max.value {
                    errors.push(max.message.to_string());
                }
            }
        }
        FieldKind::Boolean => {
            if !v.is_boolean() {
                errors.push(format!("{} must be true or false", field.name));
            }
        }
        FieldKind::Point => {
            if !v.is_object() {
                errors.push(format!("{} must be a GeoJSON point", field.name));
            }
        }
    }
}

fn check_text(field: &FieldDef, s: &str, errors: &mut Vec<String>) {
    let rules = &field.rules;
    if let Some(max) = rules.max_length {
        if s.chars().count() > max.value {
            errors.push(max.message.to_string());
        }
    }
    if let Some(pattern) = rules.pattern {
        match Regex::new(pattern.value) {
            Ok(re) if !re.is_match(s) => errors.push(pattern.message.to_string()),
            Ok(_) => {}
            Err(e) => tracing::error!(field = field.name, error = %e, "invalid validation pattern"),
        }
    }
    if let Some(allowed) = rules.allowed {
        if !allowed.value.contains(&s) {
            errors.push(allowed.message.to_string());
        }
    }
}
