//! Turns raw query-string pairs into a structured, paginated query.
//!
//! Reserved keys (`select`, `sort`, `page`, `limit`) control projection, ordering and
//! paging; every other key is a filter. `field[op]=value` with `op` one of
//! `gt|gte|lt|lte|in` becomes a comparison, other bracketed keys are gathered into an
//! equality operand (`location[state]=MA` matches records whose `location` contains
//! `{"state": "MA"}`).

use super::filter::{Comparison, Condition, Filter};
use super::pagination::Pagination;
use crate::model::CREATED_AT_FIELD;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const RESERVED_KEYS: [&str; 4] = ["select", "sort", "page", "limit"];
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 25;
pub const MAX_LIMIT: u64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// `-field` sorts descending, `field` ascending.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let key = match raw.strip_prefix('-') {
            Some(field) => SortKey::desc(field.trim()),
            None => SortKey::asc(raw.strip_prefix('+').unwrap_or(raw).trim()),
        };
        (!key.field.is_empty()).then_some(key)
    }
}

/// Query parsed from the request, before the store has been asked for a count.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapedQuery {
    pub filter: Filter,
    /// Fields to return, in request order; empty returns all fields.
    pub projection: Vec<String>,
    pub sort: Vec<SortKey>,
    pub page: u64,
    pub limit: u64,
}

impl ShapedQuery {
    pub fn start_index(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn end_index(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }

    pub fn pagination(&self, total_count: u64) -> Pagination {
        Pagination::compute(self.page, self.limit, total_count)
    }

    pub fn into_spec(self, total_count: u64) -> QuerySpec {
        let pagination = self.pagination(total_count);
        QuerySpec {
            skip: self.start_index(),
            limit: self.limit,
            filter: self.filter,
            projection: self.projection,
            sort: self.sort,
            pagination,
            total_count,
        }
    }
}

/// Fully resolved read query, ready to run against a store.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySpec {
    pub filter: Filter,
    pub projection: Vec<String>,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: u64,
    pub pagination: Pagination,
    pub total_count: u64,
}

#[derive(Clone, Debug)]
pub struct QueryShaper {
    reserved: HashSet<String>,
}

impl Default for QueryShaper {
    fn default() -> Self {
        Self::with_reserved(RESERVED_KEYS)
    }
}

impl QueryShaper {
    pub fn with_reserved<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryShaper {
            reserved: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn shape<K, V>(&self, params: &[(K, V)]) -> ShapedQuery
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filter = Filter::new();
        let mut nested: Vec<(String, Map<String, Value>)> = Vec::new();
        let mut select = None;
        let mut sort = None;
        let mut page = None;
        let mut limit = None;

        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            if self.reserved.contains(key) {
                match key {
                    "select" => select = Some(value),
                    "sort" => sort = Some(value),
                    "page" => page = Some(value),
                    "limit" => limit = Some(value),
                    _ => {}
                }
                continue;
            }
            match split_bracket(key) {
                Some((field, inner)) => match Comparison::from_token(inner) {
                    Some(Comparison::In) => filter.push(Condition::new(field, Comparison::In, split_list(value))),
                    Some(op) => filter.push(Condition::new(field, op, value)),
                    None => {
                        let i = match nested.iter().position(|(f, _)| f == field) {
                            Some(i) => i,
                            None => {
                                nested.push((field.to_string(), Map::new()));
                                nested.len() - 1
                            }
                        };
                        nested[i].1.insert(inner.to_string(), Value::String(value.to_string()));
                    }
                },
                None => filter.push(Condition::new(key, Comparison::Eq, value)),
            }
        }
        for (field, operand) in nested {
            filter.push(Condition::new(field, Comparison::Eq, Value::Object(operand)));
        }

        let limit = parse_positive(limit, DEFAULT_LIMIT).min(MAX_LIMIT);
        ShapedQuery {
            filter,
            projection: select.map(parse_select).unwrap_or_default(),
            sort: sort
                .map(parse_sort)
                .filter(|keys| !keys.is_empty())
                .unwrap_or_else(|| vec![SortKey::desc(CREATED_AT_FIELD)]),
            page: parse_positive(page, DEFAULT_PAGE),
            limit,
        }
    }
}

/// Shape with the default reserved keys.
pub fn shape<K, V>(params: &[(K, V)]) -> ShapedQuery
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    QueryShaper::default().shape(params)
}

/// `field[inner]` → `(field, inner)`.
fn split_bracket(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    let field = &key[..open];
    (!field.is_empty() && !inner.is_empty()).then_some((field, inner))
}

fn split_list(raw: &str) -> Value {
    Value::Array(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    )
}

fn parse_select(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .map(str::to_string)
        .collect()
}

fn parse_sort(raw: &str) -> Vec<SortKey> {
    raw.split(',').filter_map(SortKey::parse).collect()
}

/// Unparsable → default; below 1 → 1.
fn parse_positive(raw: Option<&str>, default: u64) -> u64 {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        None => default,
        Some(n) if n < 1 => 1,
        Some(n) => n as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PageRef;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_query_uses_defaults() {
        let q = shape::<&str, &str>(&[]);
        assert!(q.filter.is_empty());
        assert!(q.projection.is_empty());
        assert_eq!(q.sort, vec![SortKey::desc("createdAt")]);
        assert_eq!((q.page, q.limit), (1, 25));
        assert_eq!((q.start_index(), q.end_index()), (0, 25));
    }

    #[test]
    fn reserved_keys_never_become_filters() {
        let q = shape(&params(&[("select", "name"), ("sort", "name"), ("page", "2"), ("limit", "5"), ("housing", "true")]));
        assert_eq!(q.filter.conditions().len(), 1);
        assert_eq!(q.filter.conditions()[0].field, "housing");
    }

    #[test]
    fn operator_tokens_become_comparisons() {
        let q = shape(&params(&[
            ("averageCost[gt]", "5"),
            ("averageCost[gte]", "6"),
            ("averageCost[lt]", "7"),
            ("averageCost[lte]", "8"),
            ("careers[in]", "Business, UI/UX"),
        ]));
        let ops: Vec<(Comparison, Value)> = q
            .filter
            .conditions()
            .iter()
            .map(|c| (c.op, c.operand.clone()))
            .collect();
        assert_eq!(
            ops,
            vec![
                (Comparison::Gt, json!("5")),
                (Comparison::Gte, json!("6")),
                (Comparison::Lt, json!("7")),
                (Comparison::Lte, json!("8")),
                (Comparison::In, json!(["Business", "UI/UX"])),
            ]
        );
    }

    #[test]
    fn unknown_nested_keys_pass_through_as_equality() {
        let q = shape(&params(&[("location[state]", "MA"), ("location[city]", "Boston"), ("name[regex]", "x")]));
        let conditions = q.filter.conditions();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].field, "location");
        assert_eq!(conditions[0].op, Comparison::Eq);
        assert_eq!(conditions[0].operand, json!({ "state": "MA", "city": "Boston" }));
        assert_eq!(conditions[1].field, "name");
        assert_eq!(conditions[1].operand, json!({ "regex": "x" }));
    }

    #[test]
    fn plain_keys_are_equality() {
        let q = shape(&params(&[("location.state", "MA"), ("odd[", "1")]));
        let fields: Vec<(&str, Comparison)> = q.filter.conditions().iter().map(|c| (c.field.as_str(), c.op)).collect();
        assert_eq!(fields, vec![("location.state", Comparison::Eq), ("odd[", Comparison::Eq)]);
    }

    #[test]
    fn select_keeps_request_order() {
        let q = shape(&params(&[("select", "name,email")]));
        assert_eq!(q.projection, vec!["name", "email"]);
        let q = shape(&params(&[("select", " description , name,,description")]));
        assert_eq!(q.projection, vec!["description", "name"]);
    }

    #[test]
    fn sort_parses_directions() {
        let q = shape(&params(&[("sort", "-averageCost,name")]));
        assert_eq!(q.sort, vec![SortKey::desc("averageCost"), SortKey::asc("name")]);
        let q = shape(&params(&[("sort", ",")]));
        assert_eq!(q.sort, vec![SortKey::desc("createdAt")]);
    }

    #[test]
    fn bad_paging_values_default_or_clamp() {
        let q = shape(&params(&[("page", "abc"), ("limit", "")]));
        assert_eq!((q.page, q.limit), (1, 25));
        let q = shape(&params(&[("page", "0"), ("limit", "-4")]));
        assert_eq!((q.page, q.limit), (1, 1));
        let q = shape(&params(&[("limit", "50000")]));
        assert_eq!(q.limit, MAX_LIMIT);
    }

    #[test]
    fn query_carries_skip_and_pagination() {
        let spec = shape(&params(&[("page", "2"), ("limit", "25")])).into_spec(30);
        assert_eq!(spec.skip, 25);
        assert_eq!(spec.limit, 25);
        assert_eq!(spec.total_count, 30);
        assert_eq!(spec.pagination.prev, Some(PageRef { page: 1, limit: 25 }));
        assert_eq!(spec.pagination.next, None);

        let spec = shape(&params(&[("page", "1")])).into_spec(30);
        assert_eq!(spec.pagination.next, Some(PageRef { page: 2, limit: 25 }));
        assert_eq!(spec.pagination.prev, None);
    }

    #[test]
    fn custom_reserved_keys() {
        let shaper = QueryShaper::with_reserved(["page", "limit", "token"]);
        let q = shaper.shape(&params(&[("token", "abc"), ("select", "name")]));
        assert!(q.projection.is_empty());
        assert_eq!(q.filter.conditions()[0].field, "select");
    }
}
