//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE for a registered model.

use crate::config::ModelDef;
use crate::store::{FetchQuery, Predicate};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Placeholder for a value of `column`, cast to the column's declared type so a text
    /// parameter binds to uuid, timestamp, numeric or enum columns.
    fn push_param(&mut self, def: &ModelDef, column: &str, v: Value) -> String {
        self.params.push(v);
        match def.column_type(column) {
            Some(ty) => format!("${}::{}", self.params.len(), ty),
            None => format!("${}", self.params.len()),
        }
    }
}

/// AND-joined conditions. Null compares with IS NULL; an empty IN list matches nothing.
fn where_clause(q: &mut QueryBuf, def: &ModelDef, predicates: &[Predicate]) -> String {
    let mut parts = Vec::with_capacity(predicates.len());
    for p in predicates {
        match p {
            Predicate::Eq(col, Value::Null) => parts.push(format!("{} IS NULL", quoted(col))),
            Predicate::Eq(col, v) => {
                let ph = q.push_param(def, col, v.clone());
                parts.push(format!("{} = {}", quoted(col), ph));
            }
            Predicate::In(col, values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| q.push_param(def, col, v.clone()))
                    .collect();
                if placeholders.is_empty() {
                    parts.push("1 = 0".to_string());
                } else {
                    parts.push(format!("{} IN ({})", quoted(col), placeholders.join(", ")));
                }
            }
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn text_read(column: &str) -> String {
    format!("{}::text AS {}", quoted(column), quoted(column))
}

/// SELECT / RETURNING list. Numeric and custom enum columns are read as text; with every
/// column selected they are appended after `*`, and the later text value wins.
fn column_list(def: &ModelDef, columns: Option<&[String]>) -> String {
    let as_text = def.text_read_columns();
    match columns {
        Some(cols) if !cols.is_empty() => cols
            .iter()
            .map(|c| {
                if as_text.contains(&c.as_str()) {
                    text_read(c)
                } else {
                    quoted(c)
                }
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => std::iter::once("*".to_string())
            .chain(as_text.iter().map(|c| text_read(c)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// SELECT with filters, ORDER BY (id when none given) and optional LIMIT/OFFSET.
/// `columns` may be wider than `query.columns` so relation keys are available.
pub fn select(def: &ModelDef, schema: &str, query: &FetchQuery, columns: Option<&[String]>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &def.table_name);
    let where_clause = where_clause(&mut q, def, &query.predicates);
    let order_clause = if query.order_by.is_empty() {
        format!(" ORDER BY {}", quoted(&def.id_attribute))
    } else {
        let parts: Vec<String> = query
            .order_by
            .iter()
            .map(|o| format!("{} {}", quoted(&o.column), o.direction.as_sql()))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    };
    let window = query
        .page
        .map(|p| format!(" LIMIT {} OFFSET {}", p.limit, p.offset))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        column_list(def, columns),
        table,
        where_clause,
        order_clause,
        window
    );
    q
}

/// Total rows matching the filters, ignoring any window.
pub fn count(def: &ModelDef, schema: &str, predicates: &[Predicate]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &def.table_name);
    let where_clause = where_clause(&mut q, def, predicates);
    q.sql = format!("SELECT COUNT(*) AS {} FROM {}{}", quoted("row_count"), table, where_clause);
    q
}

/// INSERT the non-null values of `data`; configured timestamp columns default to NOW().
pub fn insert(def: &ModelDef, schema: &str, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &def.table_name);
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for (k, v) in data {
        if v.is_null() {
            continue;
        }
        cols.push(quoted(k));
        values.push(q.push_param(def, k, v.clone()));
    }
    for stamp in [&def.created_at, &def.updated_at].into_iter().flatten() {
        if !data.get(stamp).is_some_and(|v| !v.is_null()) {
            cols.push(quoted(stamp));
            values.push("NOW()".to_string());
        }
    }
    let returning = column_list(def, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            values.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET the columns present in `data` (never the id itself) and touch the
/// updated timestamp. With nothing to set it degrades to a SELECT of the row.
pub fn update(def: &ModelDef, schema: &str, id: &Value, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &def.table_name);
    let pk = quoted(&def.id_attribute);
    let mut sets = Vec::new();
    for (k, v) in data {
        if *k == def.id_attribute {
            continue;
        }
        let rhs = if v.is_null() {
            "NULL".to_string()
        } else {
            q.push_param(def, k, v.clone())
        };
        sets.push(format!("{} = {}", quoted(k), rhs));
    }
    if let Some(updated) = &def.updated_at {
        if !data.contains_key(updated) {
            sets.push(format!("{} = NOW()", quoted(updated)));
        }
    }
    let id_ph = q.push_param(def, &def.id_attribute, id.clone());
    let returning = column_list(def, None);
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {} = {}", returning, table, pk, id_ph)
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            table,
            sets.join(", "),
            pk,
            id_ph,
            returning
        )
    };
    q
}

/// DELETE every row matching the filters.
pub fn delete(def: &ModelDef, schema: &str, predicates: &[Predicate]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &def.table_name);
    let where_clause = where_clause(&mut q, def, predicates);
    q.sql = format!("DELETE FROM {}{}", table, where_clause);
    q
}
