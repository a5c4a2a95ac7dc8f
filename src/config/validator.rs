//! Config validation: association paths and referential integrity.

use crate::config::RegistryConfig;
use crate::error::ConfigError;

/// Association path split into its hops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedPath {
    /// `our_key => Target.their_key`
    Direct {
        our_key: String,
        target: String,
        their_key: String,
    },
    /// `our_key => Join.our_side => Join.their_side => Target.their_key`
    Through {
        our_key: String,
        join: String,
        our_side: String,
        their_side: String,
        target: String,
        their_key: String,
    },
}

impl ParsedPath {
    pub fn target(&self) -> &str {
        match self {
            ParsedPath::Direct { target, .. } | ParsedPath::Through { target, .. } => target,
        }
    }
}

fn model_column(segment: &str) -> Option<(String, String)> {
    let (model, column) = segment.split_once('.')?;
    let (model, column) = (model.trim(), column.trim());
    if model.is_empty() || column.is_empty() || column.contains('.') {
        return None;
    }
    Some((model.to_string(), column.to_string()))
}

/// Parse an association path; `None` when the path has an unsupported shape.
pub fn parse_path(path: &str) -> Option<ParsedPath> {
    let segments: Vec<&str> = path.split("=>").map(str::trim).collect();
    let our_key = segments.first().filter(|s| !s.is_empty() && !s.contains('.'))?;
    match segments.as_slice() {
        [_, target] => {
            let (target, their_key) = model_column(target)?;
            Some(ParsedPath::Direct {
                our_key: our_key.to_string(),
                target,
                their_key,
            })
        }
        [_, join_a, join_b, target] => {
            let (join, our_side) = model_column(join_a)?;
            let (join_again, their_side) = model_column(join_b)?;
            if join != join_again {
                return None;
            }
            let (target, their_key) = model_column(target)?;
            Some(ParsedPath::Through {
                our_key: our_key.to_string(),
                join,
                our_side,
                their_side,
                target,
                their_key,
            })
        }
        _ => None,
    }
}

/// Type names are inlined into SQL casts: letters, digits, `_`, `.`, spaces, `(`, `)`, `,`, `[]`.
fn is_type_name(ty: &str) -> bool {
    let ty = ty.trim();
    !ty.is_empty()
        && ty.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && ty
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ' ' | '(' | ')' | ',' | '[' | ']'))
}

pub fn validate(config: &RegistryConfig) -> Result<(), ConfigError> {
    if let Some(enabled) = &config.models_enabled {
        for name in enabled {
            if !config.models.contains_key(name) {
                return Err(ConfigError::MissingReference {
                    kind: "model",
                    id: name.clone(),
                });
            }
        }
    }

    for (name, model) in &config.models {
        if !config.is_enabled(name) {
            continue;
        }
        if model.table_name.trim().is_empty() {
            return Err(ConfigError::Validation(format!("model {} has an empty tableName", name)));
        }
        for (column, ty) in &model.columns {
            if !is_type_name(ty) {
                return Err(ConfigError::Validation(format!(
                    "model {} column {} has an invalid type {:?}",
                    name, column, ty
                )));
            }
        }
        for (assoc_name, assoc) in &model.associations {
            let parsed = parse_path(&assoc.path).ok_or_else(|| ConfigError::InvalidAssociationPath {
                model: name.clone(),
                association: assoc_name.clone(),
                path: assoc.path.clone(),
            })?;
            let mut referenced = vec![parsed.target()];
            if let ParsedPath::Through { join, .. } = &parsed {
                referenced.push(join);
            }
            for model_ref in referenced {
                if !config.is_enabled(model_ref) {
                    return Err(ConfigError::MissingReference {
                        kind: "model",
                        id: model_ref.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}
