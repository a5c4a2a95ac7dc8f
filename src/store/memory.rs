//! Transactional in-memory store. A scope reads a private copy of every table and logs
//! its writes; commit replays that log onto the tables as they are at commit time, so
//! scopes committed in between are kept. Rollback drops copy and log.

use super::{model_def, Direction, FetchQuery, Pagination, Predicate, Record, RecordSet, Related, Store};
use crate::config::{AssociationType, ModelDef, ModelRegistry};
use crate::error::StoreError;
use crate::value::{compare_values, value_eq, value_in};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

type Row = Map<String, Value>;

#[derive(Clone, Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
}

/// One change made inside a scope.
#[derive(Clone, Debug)]
enum Write {
    Insert {
        model: String,
        row: Row,
    },
    Update {
        model: String,
        id_attribute: String,
        id: Value,
        changes: Row,
    },
    Delete {
        model: String,
        id_attribute: String,
        ids: Vec<Value>,
    },
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn cell<'r>(row: &'r Row, column: &str) -> &'r Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn matches(row: &Row, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| match p {
        Predicate::Eq(col, v) => value_eq(cell(row, col), v),
        Predicate::In(col, vs) => value_in(cell(row, col), vs),
    })
}

/// `data` plus a fresh updated timestamp when the model keeps one.
fn touched(def: &ModelDef, data: &Row) -> Row {
    let mut changes = data.clone();
    if let Some(updated) = &def.updated_at {
        changes.insert(updated.clone(), now());
    }
    changes
}

impl Tables {
    fn table(&self, model: &str) -> &[Row] {
        self.rows.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, model: &str, row: Row) {
        self.rows.entry(model.to_string()).or_default().push(row);
    }

    fn update_row(&mut self, model: &str, id_attribute: &str, id: &Value, changes: &Row) -> Option<Row> {
        let row = self
            .rows
            .get_mut(model)?
            .iter_mut()
            .find(|r| value_eq(cell(r, id_attribute), id))?;
        for (k, v) in changes {
            row.insert(k.clone(), v.clone());
        }
        Some(row.clone())
    }

    fn delete_rows(&mut self, model: &str, id_attribute: &str, ids: &[Value]) -> u64 {
        let Some(rows) = self.rows.get_mut(model) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|r| !value_in(cell(r, id_attribute), ids));
        (before - rows.len()) as u64
    }

    /// Rows touched by a write that no longer exist are skipped.
    fn replay(&mut self, write: &Write) {
        match write {
            Write::Insert { model, row } => self.push(model, row.clone()),
            Write::Update {
                model,
                id_attribute,
                id,
                changes,
            } => {
                self.update_row(model, id_attribute, id, changes);
            }
            Write::Delete {
                model,
                id_attribute,
                ids,
            } => {
                self.delete_rows(model, id_attribute, ids);
            }
        }
    }

    fn load_related(&self, registry: &ModelRegistry, def: &ModelDef, row: &Row, name: &str) -> Result<Related, StoreError> {
        let assoc = def.association(name).ok_or_else(|| StoreError::UnknownAssociation {
            model: def.name.clone(),
            association: name.to_string(),
        })?;
        if registry.model(&assoc.target_model).is_none() {
            return Err(StoreError::UnknownModel(assoc.target_model.clone()));
        }
        let ours = cell(row, &assoc.our_key);
        let keys: Vec<Value> = if ours.is_null() {
            Vec::new()
        } else {
            match &assoc.through {
                None => vec![ours.clone()],
                Some(through) => self
                    .table(&through.model)
                    .iter()
                    .filter(|j| value_eq(cell(j, &through.our_side), ours))
                    .map(|j| cell(j, &through.their_side).clone())
                    .filter(|v| !v.is_null())
                    .collect(),
            }
        };
        let mut targets = self
            .table(&assoc.target_model)
            .iter()
            .filter(|r| value_in(cell(r, &assoc.their_key), &keys))
            .map(|r| Record::new(r.clone()));
        Ok(match assoc.type_ {
            AssociationType::ToOne => Related::One(targets.next().map(Box::new)),
            AssociationType::ToMany => Related::Many(targets.collect()),
        })
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    tables: Tables,
    log: Vec<Write>,
}

impl ScopeState {
    fn insert(&mut self, model: &str, row: Row) {
        self.tables.push(model, row.clone());
        self.log.push(Write::Insert {
            model: model.to_string(),
            row,
        });
    }

    fn update(&mut self, def: &ModelDef, id: &Value, data: &Row) -> Option<Row> {
        let changes = touched(def, data);
        let row = self.tables.update_row(&def.name, &def.id_attribute, id, &changes)?;
        self.log.push(Write::Update {
            model: def.name.clone(),
            id_attribute: def.id_attribute.clone(),
            id: id.clone(),
            changes,
        });
        Some(row)
    }

    fn delete(&mut self, def: &ModelDef, predicates: &[Predicate]) -> u64 {
        let ids: Vec<Value> = self
            .tables
            .table(&def.name)
            .iter()
            .filter(|r| matches(r, predicates))
            .map(|r| cell(r, &def.id_attribute).clone())
            .collect();
        if ids.is_empty() {
            return 0;
        }
        let removed = self.tables.delete_rows(&def.name, &def.id_attribute, &ids);
        self.log.push(Write::Delete {
            model: def.name.clone(),
            id_attribute: def.id_attribute.clone(),
            ids,
        });
        removed
    }
}

pub struct MemoryScope {
    state: Mutex<ScopeState>,
}

pub struct MemoryStore {
    registry: ModelRegistry,
    committed: RwLock<Tables>,
    /// Next id per model, shared by every scope.
    next_ids: Mutex<HashMap<String, i64>>,
}

impl MemoryStore {
    pub fn new(registry: ModelRegistry) -> Self {
        MemoryStore {
            registry,
            committed: RwLock::new(Tables::default()),
            next_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Insert committed rows directly, assigning ids and timestamps like `insert`.
    pub async fn seed(&self, model: &str, rows: Vec<Value>) -> Result<(), StoreError> {
        let def = model_def(self, model)?;
        for row in rows {
            let Value::Object(data) = row else {
                return Err(StoreError::Backend(format!("seed rows for {} must be objects", model)));
            };
            let row = self.new_row(def, &data).await;
            self.committed.write().await.push(&def.name, row);
        }
        Ok(())
    }

    /// Committed rows of a model, in insertion order.
    pub async fn rows(&self, model: &str) -> Vec<Row> {
        self.committed.read().await.table(model).to_vec()
    }

    /// `data` with an id (taken from the shared counter unless given) and creation timestamps.
    async fn new_row(&self, def: &ModelDef, data: &Row) -> Row {
        let mut row = data.clone();
        {
            let mut ids = self.next_ids.lock().await;
            let next = ids.entry(def.name.clone()).or_insert(1);
            match row.get(&def.id_attribute) {
                None | Some(Value::Null) => {
                    row.insert(def.id_attribute.clone(), Value::from(*next));
                    *next += 1;
                }
                Some(id) => {
                    if let Some(n) = id.as_i64() {
                        *next = (*next).max(n + 1);
                    }
                }
            }
        }
        let stamp = now();
        for column in [&def.created_at, &def.updated_at].into_iter().flatten() {
            row.entry(column.clone()).or_insert_with(|| stamp.clone());
        }
        row
    }

    fn select(&self, tables: &Tables, def: &ModelDef, query: &FetchQuery) -> Result<(Vec<Record>, u64), StoreError> {
        let mut rows: Vec<&Row> = tables
            .table(&def.name)
            .iter()
            .filter(|r| matches(r, &query.predicates))
            .collect();
        rows.sort_by(|a, b| {
            query
                .order_by
                .iter()
                .map(|o| {
                    let ord = compare_values(cell(a, &o.column), cell(b, &o.column));
                    match o.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        let row_count = rows.len() as u64;
        if let Some(page) = query.page {
            rows = rows
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect();
        }

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Record::new(row.clone());
            for name in &query.with_related {
                let related = tables.load_related(&self.registry, def, row, name)?;
                record.relations.insert(name.clone(), related);
            }
            if let Some(columns) = &query.columns {
                record.project(columns);
            }
            records.push(record);
        }
        Ok((records, row_count))
    }
}

fn id_of<'r>(def: &ModelDef, record: &'r Record) -> Result<&'r Value, StoreError> {
    record
        .get(&def.id_attribute)
        .filter(|v| !v.is_null())
        .ok_or_else(|| StoreError::Backend(format!("{} record has no \"{}\"", def.name, def.id_attribute)))
}

#[async_trait]
impl Store for MemoryStore {
    type Scope = MemoryScope;

    fn model(&self, name: &str) -> Option<&ModelDef> {
        self.registry.model(name)
    }

    async fn begin(&self) -> Result<MemoryScope, StoreError> {
        let tables = self.committed.read().await.clone();
        Ok(MemoryScope {
            state: Mutex::new(ScopeState {
                tables,
                log: Vec::new(),
            }),
        })
    }

    async fn commit(&self, scope: MemoryScope) -> Result<(), StoreError> {
        let state = scope.state.into_inner();
        let mut committed = self.committed.write().await;
        for write in &state.log {
            committed.replay(write);
        }
        Ok(())
    }

    async fn rollback(&self, scope: MemoryScope) -> Result<(), StoreError> {
        drop(scope);
        Ok(())
    }

    async fn fetch(&self, scope: &MemoryScope, model: &str, query: &FetchQuery) -> Result<Record, StoreError> {
        let def = model_def(self, model)?;
        let state = scope.state.lock().await;
        let (records, _) = self.select(&state.tables, def, query)?;
        records.into_iter().next().ok_or(StoreError::EmptyResult)
    }

    async fn fetch_all(&self, scope: &MemoryScope, model: &str, query: &FetchQuery) -> Result<RecordSet, StoreError> {
        let def = model_def(self, model)?;
        let state = scope.state.lock().await;
        let (records, row_count) = self.select(&state.tables, def, query)?;
        Ok(RecordSet {
            records,
            pagination: query.page.map(|page| Pagination {
                skip: page.offset,
                limit: page.limit,
                row_count,
            }),
        })
    }

    async fn insert(&self, scope: &MemoryScope, model: &str, data: &Row) -> Result<Record, StoreError> {
        let def = model_def(self, model)?;
        let row = self.new_row(def, data).await;
        scope.state.lock().await.insert(&def.name, row.clone());
        Ok(Record::new(row))
    }

    async fn save(&self, scope: &MemoryScope, model: &str, record: &Record, data: &Row) -> Result<Record, StoreError> {
        let def = model_def(self, model)?;
        let id = id_of(def, record)?;
        let mut state = scope.state.lock().await;
        let row = state.update(def, id, data).ok_or(StoreError::EmptyResult)?;
        Ok(Record::new(row))
    }

    async fn destroy(&self, scope: &MemoryScope, model: &str, predicates: &[Predicate]) -> Result<u64, StoreError> {
        let def = model_def(self, model)?;
        match scope.state.lock().await.delete(def, predicates) {
            0 => Err(StoreError::NoRowsDeleted),
            removed => Ok(removed),
        }
    }

    async fn attach(
        &self,
        scope: &MemoryScope,
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
            let link = self.new_row(join, &link).await;
            scope.state.lock().await.insert(&join.name, link);
            return Ok(());
        }

        // Direct associations: the side not keyed by its own id holds the foreign key.
        let mut change = Row::new();
        let mut state = scope.state.lock().await;
        if assoc.our_key == def.id_attribute {
            change.insert(assoc.their_key.clone(), ours.clone());
            state.update(target, id_of(target, other)?, &change).ok_or(StoreError::EmptyResult)?;
        } else {
            change.insert(assoc.our_key.clone(), theirs.clone());
            state.update(def, id_of(def, record)?, &change).ok_or(StoreError::EmptyResult)?;
        }
        Ok(())
    }
}
