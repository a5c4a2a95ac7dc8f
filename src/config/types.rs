//! Raw model registry config types matching the JSON layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssociationType {
    ToOne,
    ToMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssociationConfig {
    #[serde(rename = "type")]
    pub type_: AssociationType,
    /// `"id => Profile.user_id"` or `"id => UserRole.user_id => UserRole.role_id => Role.id"`.
    pub path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimestampsConfig {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelConfig {
    pub table_name: String,
    #[serde(default)]
    pub id_attribute: Option<String>,
    #[serde(default)]
    pub timestamps: Option<TimestampsConfig>,
    #[serde(default)]
    pub associations: BTreeMap<String, AssociationConfig>,
    /// Postgres type per column, e.g. `"uuid"`, `"timestamptz"`, `"numeric"`, `"app.status"`.
    /// Columns not listed bind as their JSON shape (strings as text).
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

/// All models in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistryConfig {
    /// When present, only these models are registered.
    #[serde(default)]
    pub models_enabled: Option<Vec<String>>,
    pub models: BTreeMap<String, ModelConfig>,
}

impl RegistryConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        match &self.models_enabled {
            Some(enabled) => enabled.iter().any(|m| m == name),
            None => self.models.contains_key(name),
        }
    }
}
