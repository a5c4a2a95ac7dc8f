//! Field whitelisting, required-field checks, lookup keys and write payloads.

use crate::error::MissingFields;
use crate::resource::FieldSpec;
use serde_json::{Map, Value};

type Fields = Map<String, Value>;

/// A field counts as provided when its key exists and its value is not null.
pub fn is_present(fields: &Fields, name: &str) -> bool {
    fields.get(name).is_some_and(|v| !v.is_null())
}

/// Restrict `raw` to declared field names. Without declarations everything passes.
pub fn prepare_field_data(specs: Option<&[FieldSpec]>, raw: &Fields) -> Fields {
    match specs {
        None => raw.clone(),
        Some(specs) => specs
            .iter()
            .filter_map(|f| raw.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect(),
    }
}

/// Every `required` field present, and at least one `requiredOr` field when any are declared.
pub fn check_required_fields(specs: Option<&[FieldSpec]>, fields: &Fields) -> Result<(), MissingFields> {
    let Some(specs) = specs else {
        return Ok(());
    };
    let missing_required: Vec<String> = specs
        .iter()
        .filter(|f| f.required && !is_present(fields, &f.name))
        .map(|f| f.name.clone())
        .collect();
    let required_or: Vec<&FieldSpec> = specs.iter().filter(|f| f.required_or).collect();
    let or_satisfied = required_or.is_empty() || required_or.iter().any(|f| is_present(fields, &f.name));

    let missing = MissingFields {
        required: missing_required,
        required_or: if or_satisfied {
            Vec::new()
        } else {
            required_or.iter().map(|f| f.name.clone()).collect()
        },
    };
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

fn lookup_spec(specs: Option<&[FieldSpec]>) -> Option<&FieldSpec> {
    specs?.iter().find(|f| f.lookup_field)
}

/// `{lookupField: value}` when the lookup field is declared and provided.
pub fn get_lookup_field_data(specs: Option<&[FieldSpec]>, fields: &Fields) -> Option<Fields> {
    let spec = lookup_spec(specs)?;
    let value = fields.get(&spec.name).filter(|v| !v.is_null())?;
    let mut data = Map::new();
    data.insert(spec.name.clone(), value.clone());
    Some(data)
}

/// Fetched attributes overlaid with input fields; input wins.
pub fn merge_fields(fetched: &Fields, input: &Fields) -> Fields {
    let mut merged = fetched.clone();
    for (k, v) in input {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Insert payload: provided fields, with declared defaults filling the gaps.
pub fn create_data(specs: Option<&[FieldSpec]>, fields: &Fields) -> Fields {
    let mut data = fields.clone();
    for f in specs.unwrap_or_default() {
        if let Some(default) = &f.default_value {
            if !data.contains_key(&f.name) {
                data.insert(f.name.clone(), default.clone());
            }
        }
    }
    data
}

/// Upsert payload: like `create_data` but without the lookup field, which only addresses the row.
pub fn upsert_data(specs: Option<&[FieldSpec]>, fields: &Fields) -> Fields {
    without_lookup(specs, create_data(specs, fields))
}

/// Update payload: provided fields only, never the lookup field.
pub fn update_data(specs: Option<&[FieldSpec]>, fields: &Fields) -> Fields {
    without_lookup(specs, fields.clone())
}

fn without_lookup(specs: Option<&[FieldSpec]>, mut data: Fields) -> Fields {
    if let Some(lookup) = lookup_spec(specs) {
        data.remove(&lookup.name);
    }
    data
}
