//! Backing store capability. Handlers stay resource-agnostic by going through
//! [`ResourceStore`] with a [`ResourceDef`] describing the collection.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_tables, PgStore};

use crate::error::StoreError;
use crate::model::{IncludeSpec, Record, ResourceDef};
use crate::query::{Filter, QuerySpec, SortKey};
use async_trait::async_trait;
use uuid::Uuid;

/// A read against one collection. Empty `sort` means insertion order; `limit: None`
/// returns every match.
#[derive(Clone, Debug, Default)]
pub struct FindQuery {
    pub filter: Filter,
    pub projection: Vec<String>,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
    pub includes: Vec<IncludeSpec>,
}

impl FindQuery {
    pub fn all(filter: Filter) -> Self {
        FindQuery {
            filter,
            ..Default::default()
        }
    }

    pub fn from_spec(spec: &QuerySpec, includes: &[IncludeSpec]) -> Self {
        FindQuery {
            filter: spec.filter.clone(),
            projection: spec.projection.clone(),
            sort: spec.sort.clone(),
            skip: spec.skip,
            limit: Some(spec.limit),
            includes: includes.to_vec(),
        }
    }
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn find(&self, def: &ResourceDef, query: &FindQuery) -> Result<Vec<Record>, StoreError>;

    async fn count(&self, def: &ResourceDef, filter: &Filter) -> Result<u64, StoreError>;

    async fn find_by_id(
        &self,
        def: &ResourceDef,
        id: Uuid,
        includes: &[IncludeSpec],
    ) -> Result<Option<Record>, StoreError>;

    /// Insert a new record; the store assigns `id` and `createdAt`.
    async fn create(&self, def: &ResourceDef, doc: Record) -> Result<Record, StoreError>;

    /// Merge `changes` into the record. `None` when no record has this id.
    async fn update_by_id(
        &self,
        def: &ResourceDef,
        id: Uuid,
        changes: Record,
    ) -> Result<Option<Record>, StoreError>;

    /// `false` when no record has this id.
    async fn delete_by_id(&self, def: &ResourceDef, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_many(&self, def: &ResourceDef, filter: &Filter) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
