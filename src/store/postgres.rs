//! Postgres-backed store: one JSONB document table per resource.

use super::{FindQuery, ResourceStore};
use crate::error::StoreError;
use crate::model::{IncludeSpec, Record, ResourceDef};
use crate::query::Filter;
use crate::sql::{self, bind_all, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema: schema.into(),
        }
    }

    /// Open a pool against `database_url`, creating the database first when it is missing.
    pub async fn connect(database_url: &str, max_connections: u32, schema: &str) -> Result<Self, StoreError> {
        ensure_database_exists(database_url).await?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(PgStore::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn fetch_records(&self, q: QueryBuf) -> Result<Vec<Record>, StoreError> {
        tracing::trace!(sql = %q.sql, "query");
        let rows = bind_all(sqlx::query(&q.sql), q.params)
            .fetch_all(&self.pool)
            .await
            .map_err(translate)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn fetch_record(&self, q: QueryBuf) -> Result<Option<Record>, StoreError> {
        tracing::trace!(sql = %q.sql, "query");
        let row = bind_all(sqlx::query(&q.sql), q.params)
            .fetch_optional(&self.pool)
            .await
            .map_err(translate)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn execute(&self, q: QueryBuf) -> Result<u64, StoreError> {
        tracing::trace!(sql = %q.sql, "execute");
        let done = bind_all(sqlx::query(&q.sql), q.params)
            .execute(&self.pool)
            .await
            .map_err(translate)?;
        Ok(done.rows_affected())
    }
}

fn row_to_record(row: &PgRow) -> Result<Record, StoreError> {
    let sqlx::types::Json(value): sqlx::types::Json<Value> = row.try_get("record")?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Unavailable(format!("unexpected record shape: {}", other))),
    }
}

fn translate(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(db.constraint().unwrap_or("unique").to_string())
        }
        _ => StoreError::Db(err),
    }
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn find(&self, def: &ResourceDef, query: &FindQuery) -> Result<Vec<Record>, StoreError> {
        self.fetch_records(sql::select_list(&self.schema, def, query)).await
    }

    async fn count(&self, def: &ResourceDef, filter: &Filter) -> Result<u64, StoreError> {
        let q = sql::count(&self.schema, def, filter);
        let row = bind_all(sqlx::query(&q.sql), q.params)
            .fetch_one(&self.pool)
            .await
            .map_err(translate)?;
        let n: i64 = row.try_get(0)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn find_by_id(
        &self,
        def: &ResourceDef,
        id: Uuid,
        includes: &[IncludeSpec],
    ) -> Result<Option<Record>, StoreError> {
        self.fetch_record(sql::select_by_id(&self.schema, def, id, includes)).await
    }

    async fn create(&self, def: &ResourceDef, doc: Record) -> Result<Record, StoreError> {
        self.fetch_record(sql::insert(&self.schema, def, doc))
            .await?
            .ok_or_else(|| StoreError::Unavailable("insert returned no row".into()))
    }

    async fn update_by_id(
        &self,
        def: &ResourceDef,
        id: Uuid,
        changes: Record,
    ) -> Result<Option<Record>, StoreError> {
        self.fetch_record(sql::update(&self.schema, def, id, changes)).await
    }

    async fn delete_by_id(&self, def: &ResourceDef, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.execute(sql::delete(&self.schema, def, id)).await? > 0)
    }

    async fn delete_many(&self, def: &ResourceDef, filter: &Filter) -> Result<u64, StoreError> {
        self.execute(sql::delete_many(&self.schema, def, filter)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create the schema if missing, then one table per resource with its indexes.
pub async fn ensure_tables(pool: &PgPool, schema: &str, defs: &[&ResourceDef]) -> Result<(), StoreError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", sql::quoted(schema)))
        .execute(pool)
        .await?;
    for def in defs {
        for ddl in sql::create_table(schema, def) {
            sqlx::query(&ddl).execute(pool).await?;
        }
        tracing::debug!(table = def.table, schema, "table ready");
    }
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = split_db_name(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)?;
    let mut conn = match opts.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            // No admin access: the pool connect that follows reports the real problem.
            tracing::debug!(error = %e, "cannot reach admin database");
            return Ok(());
        }
    };
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn split_db_name(url: &str) -> Result<(String, String), StoreError> {
    let (head, query) = match url.split_once('?') {
        Some((head, query)) => (head, format!("?{}", query)),
        None => (url, String::new()),
    };
    let path_start = head
        .rfind('/')
        .ok_or_else(|| StoreError::Unavailable("DATABASE_URL has no database path".into()))?
        + 1;
    let db_name = head.get(path_start..).unwrap_or("").trim();
    let base = head.get(..path_start).unwrap_or(head);
    Ok((format!("{}postgres{}", base, query), db_name.to_string()))
}
