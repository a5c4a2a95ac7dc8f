//! Load registry config from JSON and resolve it into a `ModelRegistry`.

use crate::config::resolved::{AssociationDef, ModelDef, ModelRegistry, ThroughDef};
use crate::config::types::RegistryConfig;
use crate::config::validator::{parse_path, validate, ParsedPath};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Build resolved registry from config (validates first).
pub fn resolve(config: &RegistryConfig) -> Result<ModelRegistry, ConfigError> {
    validate(config)?;

    let mut models = HashMap::new();
    for (name, model) in &config.models {
        if !config.is_enabled(name) {
            continue;
        }
        let mut associations = Vec::with_capacity(model.associations.len());
        for (assoc_name, assoc) in &model.associations {
            let parsed = parse_path(&assoc.path).ok_or_else(|| ConfigError::InvalidAssociationPath {
                model: name.clone(),
                association: assoc_name.clone(),
                path: assoc.path.clone(),
            })?;
            let spec = match parsed {
                ParsedPath::Direct {
                    our_key,
                    target,
                    their_key,
                } => AssociationDef {
                    name: assoc_name.clone(),
                    type_: assoc.type_,
                    our_key,
                    target_model: target,
                    their_key,
                    through: None,
                },
                ParsedPath::Through {
                    our_key,
                    join,
                    our_side,
                    their_side,
                    target,
                    their_key,
                } => AssociationDef {
                    name: assoc_name.clone(),
                    type_: assoc.type_,
                    our_key,
                    target_model: target,
                    their_key,
                    through: Some(ThroughDef {
                        model: join,
                        our_side,
                        their_side,
                    }),
                },
            };
            associations.push(spec);
        }

        let timestamps = model.timestamps.clone().unwrap_or_default();
        models.insert(
            name.clone(),
            ModelDef {
                name: name.clone(),
                table_name: model.table_name.clone(),
                id_attribute: model
                    .id_attribute
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ID_ATTRIBUTE.to_string()),
                created_at: timestamps.created,
                updated_at: timestamps.updated,
                associations,
                column_types: model
                    .columns
                    .iter()
                    .map(|(column, ty)| (column.clone(), ty.trim().to_lowercase()))
                    .collect(),
            },
        );
    }

    Ok(ModelRegistry { models })
}

/// Parse registry config from a JSON string.
pub fn from_json_str(json: &str) -> Result<RegistryConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read registry config from a JSON file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<RegistryConfig, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading model registry config");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    from_json_str(&raw)
}
