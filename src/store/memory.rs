//! In-process store with the same filter semantics as the Postgres store: equality is
//! JSON containment, range comparisons only match values of the operand's type, missing
//! values sort last.

use super::{FindQuery, ResourceStore};
use crate::error::StoreError;
use crate::geo;
use crate::model::{lookup_path, record_id, IncludeSpec, Join, Record, ResourceDef, CREATED_AT_FIELD, ID_FIELD};
use crate::query::{Comparison, Condition, Filter, GeoWithin, SortDirection, SortKey};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    rows: HashMap<&'static str, Vec<Record>>,
    last_created: Option<DateTime<Utc>>,
}

impl Tables {
    fn table(&self, name: &str) -> &[Record] {
        self.rows.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Strictly increasing creation times keep `createdAt` ordering deterministic.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(at);
        at
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

fn check_unique(def: &ResourceDef, rows: &[Record], doc: &Record, except: Option<&str>) -> Result<(), StoreError> {
    for field in def.unique_fields() {
        let Some(value) = doc.get(field.name).filter(|v| !v.is_null()) else { continue };
        let taken = rows
            .iter()
            .filter(|r| except.is_none() || record_id(r) != except)
            .any(|r| r.get(field.name) == Some(value));
        if taken {
            return Err(StoreError::UniqueViolation(format!("{}.{}", def.table, field.name)));
        }
    }
    Ok(())
}

fn project(record: &Record, projection: &[String]) -> Record {
    if projection.is_empty() {
        return record.clone();
    }
    let mut out = Record::new();
    if let Some(id) = record.get(ID_FIELD) {
        out.insert(ID_FIELD.to_string(), id.clone());
    }
    for field in projection {
        if let Some(v) = record.get(field) {
            out.insert(field.clone(), v.clone());
        }
    }
    out
}

fn select(record: &Record, fields: &[&str]) -> Value {
    if fields.is_empty() {
        return Value::Object(record.clone());
    }
    let owned: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    Value::Object(project(record, &owned))
}

fn expand(tables: &Tables, record: &Record, include: &IncludeSpec) -> Value {
    let related = tables.table(include.related.table);
    match include.join {
        Join::HasMany { foreign } => {
            let Some(id) = record.get(ID_FIELD) else { return Value::Array(Vec::new()) };
            Value::Array(
                related
                    .iter()
                    .filter(|r| r.get(foreign) == Some(id))
                    .map(|r| select(r, include.select))
                    .collect(),
            )
        }
        Join::BelongsTo { local } => {
            let Some(key) = record.get(local) else { return Value::Null };
            related
                .iter()
                .find(|r| r.get(ID_FIELD) == Some(key))
                .map(|r| select(r, include.select))
                .unwrap_or(Value::Null)
        }
    }
}

fn with_includes(tables: &Tables, record: &Record, mut out: Record, includes: &[IncludeSpec]) -> Record {
    for include in includes {
        out.insert(include.field.to_string(), expand(tables, record, include));
    }
    out
}

pub(crate) fn matches(filter: &Filter, record: &Record) -> bool {
    filter.conditions().iter().all(|c| matches_condition(c, record))
        && filter.geo().map_or(true, |g| within(g, record))
}

fn matches_condition(c: &Condition, record: &Record) -> bool {
    let value = lookup_path(record, &c.field);
    match c.op {
        Comparison::Eq => value.map_or(false, |v| contains(v, &c.operand)),
        Comparison::In => match &c.operand {
            Value::Array(options) => options
                .iter()
                .any(|o| value.map_or(false, |v| contains(v, o))),
            _ => false,
        },
        op => {
            let Some(ordering) = value.and_then(|v| compare_same_type(v, &c.operand)) else {
                return false;
            };
            match op {
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Gte => ordering != Ordering::Less,
                Comparison::Lt => ordering == Ordering::Less,
                Comparison::Lte => ordering != Ordering::Greater,
                Comparison::Eq | Comparison::In => false,
            }
        }
    }
}

/// JSON containment: objects contain sub-objects, arrays contain elements or sub-arrays.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, nv)| h.get(k).map_or(false, |hv| contains(hv, nv))),
        (Value::Array(h), Value::Array(n)) => n.iter().all(|nv| h.iter().any(|hv| contains(hv, nv))),
        (Value::Array(h), n) if !n.is_object() => h.iter().any(|hv| scalar_eq(hv, n)),
        (h, n) => scalar_eq(h, n),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn within(g: &GeoWithin, record: &Record) -> bool {
    let coords = lookup_path(record, &format!("{}.coordinates", g.field));
    let Some(Value::Array(pair)) = coords else { return false };
    match (pair.first().and_then(Value::as_f64), pair.get(1).and_then(Value::as_f64)) {
        (Some(lng), Some(lat)) => geo::central_angle(g.longitude, g.latitude, lng, lat) <= g.radius,
        _ => false,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn sort_records(rows: &mut [&Record], keys: &[SortKey]) {
    rows.sort_by(|a, b| {
        for key in keys {
            let ordering = match (lookup_path(a, &key.field), lookup_path(b, &key.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => {
                    let by_value = compare_same_type(x, y)
                        .unwrap_or_else(|| type_rank(x).cmp(&type_rank(y)));
                    match key.direction {
                        SortDirection::Ascending => by_value,
                        SortDirection::Descending => by_value.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn find(&self, def: &ResourceDef, query: &FindQuery) -> Result<Vec<Record>, StoreError> {
        let tables = self.read()?;
        let mut matched: Vec<&Record> = tables
            .table(def.table)
            .iter()
            .filter(|r| matches(&query.filter, r))
            .collect();
        sort_records(&mut matched, &query.sort);
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(matched
            .into_iter()
            .skip(query.skip as usize)
            .take(limit)
            .map(|r| with_includes(&tables, r, project(r, &query.projection), &query.includes))
            .collect())
    }

    async fn count(&self, def: &ResourceDef, filter: &Filter) -> Result<u64, StoreError> {
        let tables = self.read()?;
        Ok(tables.table(def.table).iter().filter(|r| matches(filter, r)).count() as u64)
    }

    async fn find_by_id(
        &self,
        def: &ResourceDef,
        id: Uuid,
        includes: &[IncludeSpec],
    ) -> Result<Option<Record>, StoreError> {
        let tables = self.read()?;
        let id = id.to_string();
        Ok(tables
            .table(def.table)
            .iter()
            .find(|r| record_id(r) == Some(id.as_str()))
            .map(|r| with_includes(&tables, r, r.clone(), includes)))
    }

    async fn create(&self, def: &ResourceDef, mut doc: Record) -> Result<Record, StoreError> {
        let mut tables = self.write()?;
        check_unique(def, tables.table(def.table), &doc, None)?;
        let created_at = tables.next_created_at();
        doc.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
        doc.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        tables.rows.entry(def.table).or_default().push(doc.clone());
        tracing::debug!(table = def.table, id = ?doc.get(ID_FIELD), "inserted");
        Ok(doc)
    }

    async fn update_by_id(
        &self,
        def: &ResourceDef,
        id: Uuid,
        changes: Record,
    ) -> Result<Option<Record>, StoreError> {
        let mut tables = self.write()?;
        let id = id.to_string();
        check_unique(def, tables.table(def.table), &changes, Some(id.as_str()))?;
        let Some(rows) = tables.rows.get_mut(def.table) else { return Ok(None) };
        let Some(row) = rows.iter_mut().find(|r| record_id(r) == Some(id.as_str())) else {
            return Ok(None);
        };
        for (k, v) in changes {
            row.insert(k, v);
        }
        Ok(Some(row.clone()))
    }

    async fn delete_by_id(&self, def: &ResourceDef, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let id = id.to_string();
        let Some(rows) = tables.rows.get_mut(def.table) else { return Ok(false) };
        let before = rows.len();
        rows.retain(|r| record_id(r) != Some(id.as_str()));
        Ok(rows.len() < before)
    }

    async fn delete_many(&self, def: &ResourceDef, filter: &Filter) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let Some(rows) = tables.rows.get_mut(def.table) else { return Ok(0) };
        let before = rows.len();
        rows.retain(|r| !matches(filter, r));
        Ok((before - rows.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BOOTCAMPS, COURSES};
    use serde_json::json;

    fn doc(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    async fn seeded() -> (MemoryStore, Vec<Record>) {
        let store = MemoryStore::new();
        let mut out = Vec::new();
        for (name, cost, careers, state, coords) in [
            ("Devworks", 10000, json!(["Web Development", "UI/UX"]), "MA", json!([-71.104028, 42.350846])),
            ("ModernTech", 8000, json!(["Web Development", "Business"]), "MA", json!([-71.525909, 42.507426])),
            ("Codemasters", 12000, json!(["Data Science"]), "NH", json!([-72.2817, 43.7022])),
            ("Devcentral", 6000, json!(["Mobile Development"]), "RI", json!([-71.4128, 41.824])),
        ] {
            let rec = store
                .create(
                    &BOOTCAMPS,
                    doc(json!({
                        "name": name,
                        "averageCost": cost,
                        "careers": careers,
                        "location": { "type": "Point", "coordinates": coords, "state": state },
                    })),
                )
                .await
                .unwrap();
            out.push(rec);
        }
        (store, out)
    }

    fn names(rows: &[Record]) -> Vec<&str> {
        rows.iter().map(|r| r["name"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn create_assigns_id_and_created_at() {
        let (_, rows) = seeded().await;
        for r in &rows {
            assert!(Uuid::parse_str(record_id(r).unwrap()).is_ok());
            assert!(r.get(CREATED_AT_FIELD).is_some());
        }
        assert!(rows[0]["createdAt"].as_str() < rows[1]["createdAt"].as_str());
    }

    #[tokio::test]
    async fn unique_fields_are_enforced() {
        let (store, rows) = seeded().await;
        let err = store.create(&BOOTCAMPS, doc(json!({ "name": "Devworks" }))).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        let id = Uuid::parse_str(record_id(&rows[1]).unwrap()).unwrap();
        let err = store
            .update_by_id(&BOOTCAMPS, id, doc(json!({ "name": "Devworks" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        // renaming to its own name is fine
        assert!(store
            .update_by_id(&BOOTCAMPS, id, doc(json!({ "name": "ModernTech" })))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn filters_sort_and_paginate() {
        let (store, _) = seeded().await;
        let q = FindQuery {
            filter: Filter::new().lte("averageCost", 10000),
            sort: vec![SortKey::desc("averageCost")],
            ..Default::default()
        };
        assert_eq!(names(&store.find(&BOOTCAMPS, &q).await.unwrap()), ["Devworks", "ModernTech", "Devcentral"]);

        let q = FindQuery {
            filter: Filter::new().eq("careers", "Web Development"),
            sort: vec![SortKey::asc("name")],
            skip: 1,
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(names(&store.find(&BOOTCAMPS, &q).await.unwrap()), ["ModernTech"]);

        let filter = Filter::new().is_in("location.state", vec![json!("NH"), json!("RI")]);
        assert_eq!(store.count(&BOOTCAMPS, &filter).await.unwrap(), 2);

        let filter = Filter::new().eq("location", json!({ "state": "MA" }));
        assert_eq!(store.count(&BOOTCAMPS, &filter).await.unwrap(), 2);

        // range on a string operand never matches numbers
        let filter = Filter::new().gt("averageCost", "1");
        assert_eq!(store.count(&BOOTCAMPS, &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn projection_keeps_id() {
        let (store, _) = seeded().await;
        let q = FindQuery {
            projection: vec!["name".into()],
            limit: Some(1),
            ..Default::default()
        };
        let rows = store.find(&BOOTCAMPS, &q).await.unwrap();
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(rows[0].contains_key("id") && rows[0].contains_key("name"));
    }

    #[tokio::test]
    async fn geo_within_radius() {
        let (store, _) = seeded().await;
        // Boston, 10 miles
        let filter = Filter::new().within(GeoWithin {
            field: "location".into(),
            longitude: -71.0589,
            latitude: 42.3601,
            radius: geo::radius_radians(10.0),
        });
        let rows = store.find(&BOOTCAMPS, &FindQuery::all(filter)).await.unwrap();
        assert_eq!(names(&rows), ["Devworks"]);
    }

    #[tokio::test]
    async fn includes_and_cascading_deletes() {
        let (store, rows) = seeded().await;
        let bootcamp_id = record_id(&rows[0]).unwrap().to_string();
        for title in ["Front End", "Back End"] {
            store
                .create(&COURSES, doc(json!({ "title": title, "bootcamp": bootcamp_id })))
                .await
                .unwrap();
        }
        let id = Uuid::parse_str(&bootcamp_id).unwrap();
        let bootcamp = store
            .find_by_id(&BOOTCAMPS, id, BOOTCAMPS.includes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bootcamp["courses"].as_array().unwrap().len(), 2);

        let courses = store
            .find(&COURSES, &FindQuery { includes: COURSES.includes.to_vec(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(courses[0]["bootcamp"]["name"], json!("Devworks"));
        assert!(courses[0]["bootcamp"].get("averageCost").is_none());

        let removed = store
            .delete_many(&COURSES, &Filter::new().eq("bootcamp", bootcamp_id.as_str()))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.delete_by_id(&BOOTCAMPS, id).await.unwrap());
        assert!(!store.delete_by_id(&BOOTCAMPS, id).await.unwrap());
        assert!(store.find_by_id(&BOOTCAMPS, id, &[]).await.unwrap().is_none());
    }
}
