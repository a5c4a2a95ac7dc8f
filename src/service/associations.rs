//! Merge of `relations` and `loadDirect` into one fetch set, and flattening afterwards.

use crate::case::to_snake_case;
use crate::store::{Record, Related};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parsed `"association:attribute"` tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadDirect {
    /// Distinct association names, in request order.
    pub associations: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

impl LoadDirect {
    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }
}

/// Malformed tokens (no colon, empty side) are ignored. A repeated association keeps the last attribute.
pub fn parse_load_direct(tokens: Option<&[String]>) -> LoadDirect {
    let mut parsed = LoadDirect::default();
    for token in tokens.unwrap_or_default() {
        let Some((assoc, attr)) = token.split_once(':') else {
            continue;
        };
        let (assoc, attr) = (assoc.trim(), attr.trim());
        if assoc.is_empty() || attr.is_empty() {
            continue;
        }
        if !parsed.associations.iter().any(|a| a == assoc) {
            parsed.associations.push(assoc.to_string());
        }
        parsed.attributes.insert(assoc.to_string(), attr.to_string());
    }
    parsed
}

/// Distinct union of explicit relations and load-direct associations.
pub fn fetch_set(relations: Option<&[String]>, load_direct: &LoadDirect) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in relations.unwrap_or_default().iter().chain(&load_direct.associations) {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

/// Copy each load-direct attribute onto the base record under the snake-cased association
/// name, then drop relations that were only fetched for flattening.
pub fn apply_load_direct(record: &mut Record, load_direct: &LoadDirect, relations: Option<&[String]>) {
    if load_direct.is_empty() {
        return;
    }
    for (assoc, attr) in &load_direct.attributes {
        let value = match record.related(assoc) {
            Some(Related::One(Some(one))) => one.get(attr).cloned().unwrap_or(Value::Null),
            Some(Related::One(None)) | None => Value::Null,
            Some(Related::Many(many)) => Value::Array(
                many.iter()
                    .map(|r| r.get(attr).cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
        };
        record.attributes.insert(to_snake_case(assoc), value);
    }
    let keep = relations.unwrap_or_default();
    record.relations.retain(|name, _| keep.contains(name));
}
