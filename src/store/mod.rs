//! Storage collaborator contract consumed by the actions, plus two implementations.

mod memory;
mod postgres;
mod record;

pub use memory::{MemoryScope, MemoryStore};
pub use postgres::{data_schema, PgScope, PgStore};
pub use record::{Pagination, Record, RecordSet, Related};

use crate::config::ModelDef;
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One AND-combined filter on a column.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    In(String, Vec<Value>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// Offset window of a paginated read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

/// Everything a read needs: filters, order chain, projection, relations and window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchQuery {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
    /// `None` returns every column.
    pub columns: Option<Vec<String>>,
    pub with_related: Vec<String>,
    pub page: Option<PageWindow>,
}

impl FetchQuery {
    pub fn where_eq(predicates: &Map<String, Value>) -> Self {
        FetchQuery {
            predicates: predicates
                .iter()
                .map(|(k, v)| Predicate::Eq(k.clone(), v.clone()))
                .collect(),
            ..Default::default()
        }
    }
}

/// Backing data store. Every operation runs inside a scope obtained from `begin`;
/// a scope is shared by reference and finished by exactly one `commit` or `rollback`.
#[async_trait]
pub trait Store: Send + Sync {
    type Scope: Send + Sync;

    /// Model registered under `name`, if any.
    fn model(&self, name: &str) -> Option<&ModelDef>;

    async fn begin(&self) -> Result<Self::Scope, StoreError>;

    async fn commit(&self, scope: Self::Scope) -> Result<(), StoreError>;

    async fn rollback(&self, scope: Self::Scope) -> Result<(), StoreError>;

    /// First matching row; `StoreError::EmptyResult` when nothing matches.
    async fn fetch(&self, scope: &Self::Scope, model: &str, query: &FetchQuery) -> Result<Record, StoreError>;

    /// All matching rows, or one window of them when `query.page` is set.
    async fn fetch_all(&self, scope: &Self::Scope, model: &str, query: &FetchQuery) -> Result<RecordSet, StoreError>;

    async fn insert(&self, scope: &Self::Scope, model: &str, data: &Map<String, Value>) -> Result<Record, StoreError>;

    /// Write `data` onto an existing record, addressed by its id attribute.
    async fn save(
        &self,
        scope: &Self::Scope,
        model: &str,
        record: &Record,
        data: &Map<String, Value>,
    ) -> Result<Record, StoreError>;

    /// Delete matching rows; `StoreError::NoRowsDeleted` when none matched.
    async fn destroy(&self, scope: &Self::Scope, model: &str, predicates: &[Predicate]) -> Result<u64, StoreError>;

    /// Link `other` to `record` through the association `relation`.
    async fn attach(
        &self,
        scope: &Self::Scope,
        model: &str,
        record: &Record,
        relation: &str,
        other: &Record,
    ) -> Result<(), StoreError>;
}

pub(crate) fn model_def<'a, S: Store + ?Sized>(store: &'a S, name: &str) -> Result<&'a ModelDef, StoreError> {
    store.model(name).ok_or_else(|| StoreError::UnknownModel(name.to_string()))
}
