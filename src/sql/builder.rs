//! Builds parameterized statements over document tables
//! `(id UUID, doc JSONB, created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ)`.
//! Identifiers come from resource definitions only; field paths and values are parameters.

use super::params::PgBindValue;
use crate::model::{IncludeSpec, Join, Record, ResourceDef, CREATED_AT_FIELD, ID_FIELD};
use crate::query::{Comparison, Condition, Filter, GeoWithin, SortDirection, SortKey};
use crate::store::FindQuery;
use serde_json::Value;
use uuid::Uuid;

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: impl Into<PgBindValue>) -> usize {
        self.params.push(v.into());
        self.params.len()
    }
}

fn created_at_text(alias: &str) -> String {
    format!(
        "to_char({}.created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS.US\"Z\"')",
        alias
    )
}

/// Stored document merged with `id` and `createdAt`.
fn record_json(alias: &str) -> String {
    format!(
        "(jsonb_build_object('{}', {a}.id::text, '{}', {}) || {a}.doc)",
        ID_FIELD,
        CREATED_AT_FIELD,
        created_at_text(alias),
        a = alias
    )
}

/// Record restricted to `id` plus the named keys. Empty `fields` keeps everything.
fn projected_json(q: &mut QueryBuf, alias: &str, fields: Vec<String>) -> String {
    let record = record_json(alias);
    if fields.is_empty() {
        return record;
    }
    let n = q.push_param(PgBindValue::TextArray(fields));
    format!(
        "(SELECT COALESCE(jsonb_object_agg(key, value), '{{}}'::jsonb) FROM jsonb_each({}) WHERE key = '{}' OR key = ANY(${}))",
        record, ID_FIELD, n
    )
}

/// JSON expression for a dotted field on the main row.
fn field_expr(q: &mut QueryBuf, field: &str) -> String {
    match field {
        ID_FIELD => format!("to_jsonb({}.id::text)", MAIN_ALIAS),
        CREATED_AT_FIELD => format!("to_jsonb({})", created_at_text(MAIN_ALIAS)),
        _ => {
            let n = q.push_param(PgBindValue::path(field));
            format!("({}.doc #> ${})", MAIN_ALIAS, n)
        }
    }
}

fn condition_sql(q: &mut QueryBuf, c: &Condition) -> String {
    let expr = field_expr(q, &c.field);
    match c.op {
        Comparison::Eq => {
            let n = q.push_param(c.operand.clone());
            format!("COALESCE({} @> ${}::jsonb, false)", expr, n)
        }
        Comparison::In => {
            let n = q.push_param(c.operand.clone());
            format!(
                "EXISTS (SELECT 1 FROM jsonb_array_elements(${}::jsonb) AS opt(v) WHERE {} @> opt.v)",
                n, expr
            )
        }
        op => {
            let sym = match op {
                Comparison::Gt => ">",
                Comparison::Gte => ">=",
                Comparison::Lt => "<",
                _ => "<=",
            };
            let n = q.push_param(c.operand.clone());
            format!(
                "COALESCE(jsonb_typeof({e}) = jsonb_typeof(${n}::jsonb) AND jsonb_typeof(${n}::jsonb) IN ('number', 'string', 'boolean') AND {e} {sym} ${n}::jsonb, false)",
                e = expr,
                n = n,
                sym = sym
            )
        }
    }
}

/// Haversine central angle between the stored point and the center, compared to the radius.
fn within_sql(q: &mut QueryBuf, g: &GeoWithin) -> String {
    let p = q.push_param(PgBindValue::path(&g.field));
    let lng = q.push_param(PgBindValue::F64(g.longitude));
    let lat = q.push_param(PgBindValue::F64(g.latitude));
    let r = q.push_param(PgBindValue::F64(g.radius));
    let coords = format!("({}.doc #> ${} -> 'coordinates')", MAIN_ALIAS, p);
    let plng = format!("(({} ->> 0)::float8)", coords);
    let plat = format!("(({} ->> 1)::float8)", coords);
    format!(
        "CASE WHEN jsonb_typeof({c} -> 0) = 'number' AND jsonb_typeof({c} -> 1) = 'number' THEN \
         2 * asin(least(1.0, sqrt(power(sin(radians({plat} - ${lat}::float8) / 2), 2) \
         + cos(radians(${lat}::float8)) * cos(radians({plat})) * power(sin(radians({plng} - ${lng}::float8) / 2), 2)))) <= ${r}::float8 \
         ELSE false END",
        c = coords,
        plat = plat,
        plng = plng,
        lat = lat,
        lng = lng,
        r = r
    )
}

fn where_clause(q: &mut QueryBuf, filter: &Filter) -> String {
    let mut parts: Vec<String> = filter.conditions().iter().map(|c| condition_sql(q, c)).collect();
    if let Some(g) = filter.geo() {
        parts.push(within_sql(q, g));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(q: &mut QueryBuf, sort: &[SortKey]) -> String {
    let mut parts: Vec<String> = sort
        .iter()
        .map(|k| {
            let expr = match k.field.as_str() {
                ID_FIELD => format!("{}.id::text", MAIN_ALIAS),
                CREATED_AT_FIELD => format!("{}.created_at", MAIN_ALIAS),
                field => {
                    let n = q.push_param(PgBindValue::path(field));
                    format!("({}.doc #> ${})", MAIN_ALIAS, n)
                }
            };
            let dir = match k.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            format!("{} {} NULLS LAST", expr, dir)
        })
        .collect();
    parts.push(format!("{}.created_at ASC", MAIN_ALIAS));
    parts.push(format!("{}.id ASC", MAIN_ALIAS));
    format!(" ORDER BY {}", parts.join(", "))
}

/// Scalar subquery producing the related record(s) for one include.
fn include_sql(q: &mut QueryBuf, schema: &str, inc: &IncludeSpec) -> String {
    const REL_ALIAS: &str = "rel";
    let table = qualified_table(schema, inc.related.table);
    let fields: Vec<String> = inc.select.iter().map(|s| s.to_string()).collect();
    let item = projected_json(q, REL_ALIAS, fields);
    match inc.join {
        Join::HasMany { foreign } => {
            let n = q.push_param(PgBindValue::Text(foreign.to_string()));
            format!(
                "(SELECT COALESCE(jsonb_agg({item} ORDER BY {r}.created_at), '[]'::jsonb) FROM {t} {r} WHERE {r}.doc ->> ${n} = {m}.id::text)",
                item = item,
                r = REL_ALIAS,
                t = table,
                n = n,
                m = MAIN_ALIAS
            )
        }
        Join::BelongsTo { local } => {
            let n = q.push_param(PgBindValue::Text(local.to_string()));
            format!(
                "(SELECT {item} FROM {t} {r} WHERE {r}.id::text = {m}.doc ->> ${n} LIMIT 1)",
                item = item,
                r = REL_ALIAS,
                t = table,
                n = n,
                m = MAIN_ALIAS
            )
        }
    }
}

/// Main record column plus one `jsonb_build_object` per include, merged into a single `record`.
fn record_select(q: &mut QueryBuf, schema: &str, projection: &[String], includes: &[IncludeSpec]) -> String {
    let mut expr = projected_json(q, MAIN_ALIAS, projection.to_vec());
    for inc in includes {
        let sub = include_sql(q, schema, inc);
        let n = q.push_param(PgBindValue::Text(inc.field.to_string()));
        expr = format!("({} || jsonb_build_object(${}::text, {}))", expr, n, sub);
    }
    format!("{} AS record", expr)
}

/// Filtered, sorted, paginated SELECT. The single output column `record` holds the JSON record.
pub fn select_list(schema: &str, def: &ResourceDef, query: &FindQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, def.table);
    let select = record_select(&mut q, schema, &query.projection, &query.includes);
    let where_sql = where_clause(&mut q, &query.filter);
    let order_sql = order_clause(&mut q, &query.sort);
    let mut sql = format!("SELECT {} FROM {} {}{}{}", select, table, MAIN_ALIAS, where_sql, order_sql);
    if let Some(limit) = query.limit {
        let n = q.push_param(PgBindValue::I64(clamp_i64(limit)));
        sql.push_str(&format!(" LIMIT ${}", n));
    }
    if query.skip > 0 {
        let n = q.push_param(PgBindValue::I64(clamp_i64(query.skip)));
        sql.push_str(&format!(" OFFSET ${}", n));
    }
    q.sql = sql;
    q
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub fn count(schema: &str, def: &ResourceDef, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, def.table);
    let where_sql = where_clause(&mut q, filter);
    q.sql = format!("SELECT COUNT(*) FROM {} {}{}", table, MAIN_ALIAS, where_sql);
    q
}

pub fn select_by_id(schema: &str, def: &ResourceDef, id: Uuid, includes: &[IncludeSpec]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, def.table);
    let select = record_select(&mut q, schema, &[], includes);
    let n = q.push_param(PgBindValue::Uuid(id));
    q.sql = format!("SELECT {} FROM {} {} WHERE {}.id = ${}", select, table, MAIN_ALIAS, MAIN_ALIAS, n);
    q
}

/// Strip keys the table keeps in their own columns.
fn document(mut doc: Record) -> Value {
    doc.remove(ID_FIELD);
    doc.remove(CREATED_AT_FIELD);
    Value::Object(doc)
}

pub fn insert(schema: &str, def: &ResourceDef, doc: Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, def.table);
    let n = q.push_param(document(doc));
    q.sql = format!(
        "INSERT INTO {} AS {} (doc) VALUES (${}::jsonb) RETURNING {} AS record",
        table,
        MAIN_ALIAS,
        n,
        record_json(MAIN_ALIAS)
    );
    q
}

/// Shallow merge of `changes` into the stored document.
pub fn update(schema: &str, def: &ResourceDef, id: Uuid, changes: Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, def.table);
    let c = q.push_param(document(changes));
    let n = q.push_param(PgBindValue::Uuid(id));
    q.sql = format!(
        "UPDATE {t} AS {m} SET doc = {m}.doc || ${c}::jsonb, updated_at = NOW() WHERE {m}.id = ${n} RETURNING {rec} AS record",
        t = table,
        m = MAIN_ALIAS,
        c = c,
        n = n,
        rec = record_json(MAIN_ALIAS)
    );
    q
}

pub fn delete(schema: &str, def: &ResourceDef, id: Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, def.table);
    let n = q.push_param(PgBindValue::Uuid(id));
    q.sql = format!("DELETE FROM {} WHERE id = ${}", table, n);
    q
}

pub fn delete_many(schema: &str, def: &ResourceDef, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, def.table);
    let where_sql = where_clause(&mut q, filter);
    q.sql = format!("DELETE FROM {} AS {}{}", table, MAIN_ALIAS, where_sql);
    q
}

/// DDL for one resource table and its unique expression indexes.
pub fn create_table(schema: &str, def: &ResourceDef) -> Vec<String> {
    let table = qualified_table(schema, def.table);
    let mut ddl = vec![format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            doc JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        table
    )];
    for field in def.unique_fields() {
        let index = quoted(&format!("{}_{}_key", def.table, field.name));
        ddl.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((doc ->> '{}'))",
            index,
            table,
            field.name.replace('\'', "''")
        ));
    }
    for inc in def.includes {
        if let Join::BelongsTo { local } = inc.join {
            let index = quoted(&format!("{}_{}_idx", def.table, local));
            ddl.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ((doc ->> '{}'))",
                index,
                table,
                local.replace('\'', "''")
            ));
        }
    }
    ddl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BOOTCAMPS, COURSES};
    use crate::query::SortKey;
    use serde_json::json;

    #[test]
    fn list_binds_paths_and_values_as_params() {
        let query = FindQuery {
            filter: Filter::new().eq("housing", true).gt("averageCost", 5000),
            sort: vec![SortKey::desc("name")],
            skip: 25,
            limit: Some(25),
            ..Default::default()
        };
        let q = select_list("public", &BOOTCAMPS, &query);
        assert!(q.sql.starts_with("SELECT "));
        assert!(q.sql.contains("FROM \"public\".\"bootcamps\" main WHERE "));
        assert!(q.sql.contains("@> $2::jsonb"));
        assert!(q.sql.contains(" > $4::jsonb"));
        assert!(q.sql.contains("DESC NULLS LAST"));
        assert!(q.sql.ends_with("LIMIT $6 OFFSET $7"));
        assert_eq!(q.params[0], PgBindValue::path("housing"));
        assert_eq!(q.params[1], PgBindValue::Json(json!(true)));
        assert_eq!(q.params[3], PgBindValue::Json(json!(5000)));
        assert_eq!(q.params[5], PgBindValue::I64(25));
        assert_eq!(q.params.len(), 7);
        assert!(!q.sql.contains("housing"));
    }

    #[test]
    fn projection_becomes_key_list() {
        let query = FindQuery {
            projection: vec!["name".into(), "description".into()],
            ..Default::default()
        };
        let q = select_list("public", &BOOTCAMPS, &query);
        assert!(q.sql.contains("key = ANY($1)"));
        assert_eq!(
            q.params[0],
            PgBindValue::TextArray(vec!["name".into(), "description".into()])
        );
        assert!(!q.sql.contains("LIMIT"));
    }

    #[test]
    fn includes_are_subqueries() {
        let q = select_by_id("s", &COURSES, Uuid::nil(), COURSES.includes);
        assert!(q.sql.contains("FROM \"s\".\"bootcamps\" rel WHERE rel.id::text = main.doc ->>"));
        assert!(q.sql.contains("LIMIT 1"));
        let q = select_by_id("s", &BOOTCAMPS, Uuid::nil(), BOOTCAMPS.includes);
        assert!(q.sql.contains("jsonb_agg("));
        assert!(q.sql.contains("FROM \"s\".\"courses\" rel"));
        assert_eq!(q.params.last(), Some(&PgBindValue::Uuid(Uuid::nil())));
    }

    #[test]
    fn geo_and_in_conditions() {
        let filter = Filter::new()
            .is_in("careers", vec![json!("Business")])
            .within(GeoWithin {
                field: "location".into(),
                longitude: -71.1,
                latitude: 42.3,
                radius: 0.01,
            });
        let q = count("public", &BOOTCAMPS, &filter);
        assert!(q.sql.starts_with("SELECT COUNT(*) FROM \"public\".\"bootcamps\" main WHERE EXISTS"));
        assert!(q.sql.contains("asin("));
        assert_eq!(q.params.last(), Some(&PgBindValue::F64(0.01)));
    }

    #[test]
    fn writes_drop_system_fields_from_doc() {
        let mut doc = Record::new();
        doc.insert("id".into(), json!("x"));
        doc.insert("createdAt".into(), json!("y"));
        doc.insert("name".into(), json!("Devworks"));
        let q = insert("public", &BOOTCAMPS, doc.clone());
        assert_eq!(q.params, vec![PgBindValue::Json(json!({ "name": "Devworks" }))]);
        let q = update("public", &BOOTCAMPS, Uuid::nil(), doc);
        assert!(q.sql.contains("SET doc = main.doc || $1::jsonb"));
        assert_eq!(q.params[1], PgBindValue::Uuid(Uuid::nil()));
    }

    #[test]
    fn ddl_creates_unique_indexes() {
        let ddl = create_table("public", &BOOTCAMPS);
        assert!(ddl[0].contains("CREATE TABLE IF NOT EXISTS \"public\".\"bootcamps\""));
        assert!(ddl.iter().any(|s| s.contains("UNIQUE INDEX") && s.contains("(doc ->> 'name')")));
    }
}
