//! PostgreSQL store. Every scope is one database transaction.

use super::{model_def, FetchQuery, PageWindow, Pagination, Predicate, Record, RecordSet, Related, Store};
use crate::config::{AssociationType, ModelDef, ModelRegistry};
use crate::error::StoreError;
use crate::sql::{self, PgBindValue, QueryBuf};
use crate::value::value_eq;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgRow, PgTypeInfo, PgTypeKind, Postgres};
use sqlx::Transaction;
use tokio::sync::Mutex;

/// Env var naming the schema that holds the registered tables.
pub const SCHEMA_ENV: &str = "RESOURCE_ACTIONS_SCHEMA";
const DEFAULT_SCHEMA: &str = "public";

/// Data schema from env, falling back to `public`.
pub fn data_schema() -> String {
    std::env::var(SCHEMA_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
}

type Row = Map<String, Value>;

pub struct PgScope {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

pub struct PgStore {
    pool: PgPool,
    registry: ModelRegistry,
    schema: String,
}

fn push_unique(values: &mut Vec<Value>, v: &Value) {
    if !v.is_null() && !values.iter().any(|seen| value_eq(seen, v)) {
        values.push(v.clone());
    }
}

fn cell<'r>(row: &'r Row, column: &str) -> &'r Value {
    row.get(column).unwrap_or(&Value::Null)
}

impl PgStore {
    pub fn new(pool: PgPool, registry: ModelRegistry) -> Self {
        PgStore {
            pool,
            registry,
            schema: data_schema(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    async fn rows(&self, scope: &PgScope, q: &QueryBuf) -> Result<Vec<Row>, StoreError> {
        let mut guard = scope.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| StoreError::Backend("transaction already finished".into()))?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    async fn execute(&self, scope: &PgScope, q: &QueryBuf) -> Result<u64, StoreError> {
        let mut guard = scope.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| StoreError::Backend("transaction already finished".into()))?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        Ok(query.execute(&mut **tx).await?.rows_affected())
    }

    async fn one(&self, scope: &PgScope, q: &QueryBuf) -> Result<Row, StoreError> {
        self.rows(scope, q).await?.into_iter().next().ok_or(StoreError::EmptyResult)
    }

    /// Batch-load each named relation for all `records`: one query per hop.
    async fn load_relations(
        &self,
        scope: &PgScope,
        def: &ModelDef,
        records: &mut [Record],
        names: &[String],
    ) -> Result<(), StoreError> {
        for name in names {
            let assoc = def.association(name).ok_or_else(|| StoreError::UnknownAssociation {
                model: def.name.clone(),
                association: name.clone(),
            })?;
            let target = model_def(self, &assoc.target_model)?;

            let mut ours = Vec::new();
            for record in records.iter() {
                push_unique(&mut ours, record.get(&assoc.our_key).unwrap_or(&Value::Null));
            }

            // (our key value, target key value) pairs.
            let links: Vec<(Value, Value)> = match &assoc.through {
                None => ours.iter().map(|v| (v.clone(), v.clone())).collect(),
                Some(through) => {
                    let join = model_def(self, &through.model)?;
                    let query = FetchQuery {
                        predicates: vec![Predicate::In(through.our_side.clone(), ours.clone())],
                        ..Default::default()
                    };
                    self.rows(scope, &sql::select(join, &self.schema, &query, None))
                        .await?
                        .iter()
                        .map(|r| (cell(r, &through.our_side).clone(), cell(r, &through.their_side).clone()))
                        .collect()
                }
            };
            let mut keys = Vec::new();
            for (_, key) in &links {
                push_unique(&mut keys, key);
            }
            let query = FetchQuery {
                predicates: vec![Predicate::In(assoc.their_key.clone(), keys)],
                ..Default::default()
            };
            let targets = self.rows(scope, &sql::select(target, &self.schema, &query, None)).await?;

            for record in records.iter_mut() {
                let our = record.get(&assoc.our_key).cloned().unwrap_or(Value::Null);
                let matched: Vec<Record> = if our.is_null() {
                    Vec::new()
                } else {
                    links
                        .iter()
                        .filter(|(o, _)| value_eq(o, &our))
                        .flat_map(|(_, key)| {
                            targets
                                .iter()
                                .filter(move |t| value_eq(cell(t, &assoc.their_key), key))
                        })
                        .map(|t| Record::new(t.clone()))
                        .collect()
                };
                let related = match assoc.type_ {
                    AssociationType::ToOne => Related::One(matched.into_iter().next().map(Box::new)),
                    AssociationType::ToMany => Related::Many(matched),
                };
                record.relations.insert(name.clone(), related);
            }
        }
        Ok(())
    }

    async fn select(&self, scope: &PgScope, def: &ModelDef, query: &FetchQuery) -> Result<Vec<Record>, StoreError> {
        // Relation keys must be read even when the caller projects them away.
        let columns = query.columns.as_ref().map(|cols| {
            let mut wide = cols.clone();
            wide.push(def.id_attribute.clone());
            for name in &query.with_related {
                if let Some(assoc) = def.association(name) {
                    wide.push(assoc.our_key.clone());
                }
            }
            wide.sort();
            wide.dedup();
            wide
        });
        let q = sql::select(def, &self.schema, query, columns.as_deref());
        let mut records: Vec<Record> = self.rows(scope, &q).await?.into_iter().map(Record::new).collect();
        self.load_relations(scope, def, &mut records, &query.with_related).await?;
        if let Some(cols) = &query.columns {
            for record in &mut records {
                record.project(cols);
            }
        }
        Ok(records)
    }

    async fn update_by_id(&self, scope: &PgScope, def: &ModelDef, id: &Value, data: &Row) -> Result<Row, StoreError> {
        self.one(scope, &sql::update(def, &self.schema, id, data)).await
    }
}

fn id_of<'r>(def: &ModelDef, record: &'r Record) -> Result<&'r Value, StoreError> {
    record
        .get(&def.id_attribute)
        .filter(|v| !v.is_null())
        .ok_or_else(|| StoreError::Backend(format!("{} record has no \"{}\"", def.name, def.id_attribute)))
}

#[async_trait]
impl Store for PgStore {
    type Scope = PgScope;

    fn model(&self, name: &str) -> Option<&ModelDef> {
        self.registry.model(name)
    }

    async fn begin(&self) -> Result<PgScope, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgScope {
            tx: Mutex::new(Some(tx)),
        })
    }

    async fn commit(&self, scope: PgScope) -> Result<(), StoreError> {
        if let Some(tx) = scope.tx.into_inner() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&self, scope: PgScope) -> Result<(), StoreError> {
        if let Some(tx) = scope.tx.into_inner() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn fetch(&self, scope: &PgScope, model: &str, query: &FetchQuery) -> Result<Record, StoreError> {
        let def = model_def(self, model)?;
        let first = FetchQuery {
            page: Some(PageWindow { offset: 0, limit: 1 }),
            ..query.clone()
        };
        self.select(scope, def, &first)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::EmptyResult)
    }

    async fn fetch_all(&self, scope: &PgScope, model: &str, query: &FetchQuery) -> Result<RecordSet, StoreError> {
        let def = model_def(self, model)?;
        let records = self.select(scope, def, query).await?;
        let pagination = match query.page {
            Some(page) => {
                let counted = self.one(scope, &sql::count(def, &self.schema, &query.predicates)).await?;
                Some(Pagination {
                    skip: page.offset,
                    limit: page.limit,
                    row_count: cell(&counted, "row_count").as_u64().unwrap_or(0),
                })
            }
            None => None,
        };
        Ok(RecordSet { records, pagination })
    }

    async fn insert(&self, scope: &PgScope, model: &str, data: &Row) -> Result<Record, StoreError> {
        let def = model_def(self, model)?;
        let row = self.one(scope, &sql::insert(def, &self.schema, data)).await?;
        Ok(Record::new(row))
    }

    async fn save(&self, scope: &PgScope, model: &str, record: &Record, data: &Row) -> Result<Record, StoreError> {
        let def = model_def(self, model)?;
        let id = id_of(def, record)?;
        Ok(Record::new(self.update_by_id(scope, def, id, data).await?))
    }

    async fn destroy(&self, scope: &PgScope, model: &str, predicates: &[Predicate]) -> Result<u64, StoreError> {
        let def = model_def(self, model)?;
        match self.execute(scope, &sql::delete(def, &self.schema, predicates)).await? {
            0 => Err(StoreError::NoRowsDeleted),
            n => Ok(n),
        }
    }

    async fn attach(
        &self,
        scope: &PgScope,
        model: &str,
        record: &Record,
        relation: &str,
        other: &Record,
    ) -> Result<(), StoreError> {
        let def = model_def(self, model)?;
        let assoc = def.association(relation).ok_or_else(|| StoreError::UnknownAssociation {
            model: def.name.clone(),
            association: relation.to_string(),
        })?;
        let target = model_def(self, &assoc.target_model)?;
        let missing = |side: &str, column: &str| StoreError::Backend(format!("{} record has no \"{}\"", side, column));
        let ours = record
            .get(&assoc.our_key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| missing(&def.name, &assoc.our_key))?;
        let theirs = other
            .get(&assoc.their_key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| missing(&target.name, &assoc.their_key))?;

        if let Some(through) = &assoc.through {
            let join = model_def(self, &through.model)?;
            let mut link = Row::new();
            link.insert(through.our_side.clone(), ours.clone());
            link.insert(through.their_side.clone(), theirs.clone());
            self.one(scope, &sql::insert(join, &self.schema, &link)).await?;
            return Ok(());
        }

        // Direct associations: the side not keyed by its own id holds the foreign key.
        let mut change = Row::new();
        if assoc.our_key == def.id_attribute {
            change.insert(assoc.their_key.clone(), ours.clone());
            self.update_by_id(scope, target, id_of(target, other)?, &change).await?;
        } else {
            change.insert(assoc.our_key.clone(), theirs.clone());
            self.update_by_id(scope, def, id_of(def, record)?, &change).await?;
        }
        Ok(())
    }
}

/// Later columns overwrite earlier ones of the same name, so text reads replace `*`.
fn row_to_map(row: &PgRow) -> Row {
    use sqlx::{Column as _, Row as _};
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name, col.type_info()));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str, ty: &PgTypeInfo) -> Value {
    use sqlx::{Row as _, TypeInfo as _, ValueRef as _};
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    if row.try_get_raw(name).map_or(true, |raw| raw.is_null()) {
        return Value::Null;
    }
    // Enum labels travel as text even in binary format.
    if matches!(ty.kind(), PgTypeKind::Enum(_)) {
        if let Ok(label) = row.try_get_unchecked::<String, _>(name) {
            return Value::String(label);
        }
    }
    tracing::warn!(
        column = %name,
        pg_type = %ty.name(),
        "column type cannot be decoded; declare it in the model's columns to read it as text"
    );
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_falls_back_to_public() {
        if std::env::var(SCHEMA_ENV).is_err() {
            assert_eq!(data_schema(), "public");
        }
    }
}
