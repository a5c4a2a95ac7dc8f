//! Resolved model registry: config validated and flattened for runtime use.

use std::collections::HashMap;

use crate::config::types::AssociationType;

/// Join model linking both sides of a many-to-many association.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThroughDef {
    pub model: String,
    /// Join column holding our key.
    pub our_side: String,
    /// Join column holding the target's key.
    pub their_side: String,
}

/// One association of a model. Name is the key used by `relations` and `loadDirect`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationDef {
    pub name: String,
    pub type_: AssociationType,
    /// Our column used in the join.
    pub our_key: String,
    pub target_model: String,
    /// Target column matched against our key (or against the join's `their_side`).
    pub their_key: String,
    pub through: Option<ThroughDef>,
}

#[derive(Clone, Debug)]
pub struct ModelDef {
    pub name: String,
    pub table_name: String,
    pub id_attribute: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub associations: Vec<AssociationDef>,
    /// Declared Postgres column types, lowercased.
    pub column_types: HashMap<String, String>,
}

impl ModelDef {
    pub fn association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn column_type(&self, column: &str) -> Option<&str> {
        self.column_types.get(column).map(String::as_str)
    }

    /// Columns Postgres returns in a form sqlx cannot decode generically; read them as text.
    pub fn text_read_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self
            .column_types
            .iter()
            .filter(|(_, ty)| ty.as_str() == "numeric" || ty.starts_with("numeric(") || ty.contains('.'))
            .map(|(name, _)| name.as_str())
            .collect();
        columns.sort_unstable();
        columns
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    pub models: HashMap<String, ModelDef>,
}

impl ModelRegistry {
    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }
}
