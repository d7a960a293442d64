//! Structured filter tree: a conjunction of field comparisons plus an optional geo bound.

use crate::model::ResourceDef;
use serde_json::Value;

/// Comparison operators accepted in `field[op]=value` query keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Equality, or containment for list and object fields.
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field equals any element of the operand list.
    In,
}

impl Comparison {
    /// Operator for a nested query key. Only the five range/set tokens qualify; anything
    /// else stays part of an equality operand.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Comparison::Gt),
            "gte" => Some(Comparison::Gte),
            "lt" => Some(Comparison::Lt),
            "lte" => Some(Comparison::Lte),
            "in" => Some(Comparison::In),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Gt => "gt",
            Comparison::Gte => "gte",
            Comparison::Lt => "lt",
            Comparison::Lte => "lte",
            Comparison::In => "in",
        }
    }

    pub fn is_range(self) -> bool {
        matches!(
            self,
            Comparison::Gt | Comparison::Gte | Comparison::Lt | Comparison::Lte
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// Dotted path into the record.
    pub field: String,
    pub op: Comparison,
    pub operand: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Comparison, operand: impl Into<Value>) -> Self {
        let operand = operand.into();
        let operand = match (op, operand) {
            (Comparison::In, Value::Array(items)) => Value::Array(items),
            (Comparison::In, other) => Value::Array(vec![other]),
            (_, other) => other,
        };
        Condition {
            field: field.into(),
            op,
            operand,
        }
    }

    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.field.split('.')
    }
}

/// Records whose GeoJSON point at `field` lies within `radius` radians of the center.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoWithin {
    pub field: String,
    pub longitude: f64,
    pub latitude: f64,
    pub radius: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    within: Option<GeoWithin>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::new(field, Comparison::Eq, value))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::new(field, Comparison::Gt, value))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::new(field, Comparison::Gte, value))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::new(field, Comparison::Lt, value))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::new(field, Comparison::Lte, value))
    }

    pub fn is_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.condition(Condition::new(field, Comparison::In, Value::Array(values)))
    }

    pub fn within(mut self, geo: GeoWithin) -> Self {
        self.within = Some(geo);
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn geo(&self) -> Option<&GeoWithin> {
        self.within.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.within.is_none()
    }

    /// Convert string operands to the declared kind of their field, so that
    /// `averageCost[lte]=10000` compares as a number. Unknown fields and values that do
    /// not parse keep their raw string.
    pub fn coerce(mut self, def: &ResourceDef) -> Self {
        for c in &mut self.conditions {
            let Some(kind) = def.kind_of(&c.field) else { continue };
            if c.field.contains('.') {
                continue;
            }
            let operand = std::mem::take(&mut c.operand);
            c.operand = kind.coerce(operand);
        }
        self
    }
}
