//! Declarative resource specs: model, fields, authorization and column sets.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Name of the column set used when the input names none (or an unknown one).
pub const DEFAULT_COLUMN_SET: &str = "default";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    /// Descriptive only; never enforced.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub required_or: bool,
    #[serde(default)]
    pub lookup_field: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        FieldSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn type_name(mut self, type_: impl Into<String>) -> Self {
        self.type_ = Some(type_.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn required_or(mut self) -> Self {
        self.required_or = true;
        self
    }

    pub fn lookup_field(mut self) -> Self {
        self.lookup_field = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthSpec {
    /// `"field"` or `"field => claim"`; any one matching rule authorizes.
    #[serde(default)]
    pub owner_creds: Vec<String>,
}

/// Either one fixed column list or named sets selectable per call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnsToReturn {
    List(Vec<String>),
    Sets(BTreeMap<String, Vec<String>>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawResourceSpec {
    model_name: String,
    #[serde(default)]
    fields: Option<Vec<FieldSpec>>,
    #[serde(default)]
    auth: Option<AuthSpec>,
    #[serde(default)]
    default_order_by: Option<String>,
    #[serde(default)]
    columns_to_return: Option<ColumnsToReturn>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_to_return: Option<ColumnsToReturn>,
}

impl<'de> Deserialize<'de> for ResourceSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawResourceSpec::deserialize(deserializer)?;
        let spec = ResourceSpec {
            model_name: raw.model_name,
            fields: raw.fields,
            auth: raw.auth,
            default_order_by: raw.default_order_by,
            columns_to_return: raw.columns_to_return,
        };
        spec.validate().map_err(serde::de::Error::custom)?;
        Ok(spec)
    }
}

impl ResourceSpec {
    pub fn new(model_name: impl Into<String>) -> Self {
        ResourceSpec {
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.get_or_insert_with(Vec::new).push(field);
        self
    }

    pub fn owner_creds<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth = Some(AuthSpec {
            owner_creds: rules.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn default_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.default_order_by = Some(order_by.into());
        self
    }

    pub fn columns_to_return(mut self, columns: ColumnsToReturn) -> Self {
        self.columns_to_return = Some(columns);
        self
    }

    pub fn field_specs(&self) -> Option<&[FieldSpec]> {
        self.fields.as_deref()
    }

    /// Field names must be unique and at most one field may be the lookup field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(fields) = &self.fields else {
            return Ok(());
        };
        let mut seen = HashSet::new();
        for f in fields {
            if !seen.insert(f.name.as_str()) {
                return Err(ConfigError::DuplicateField(f.name.clone()));
            }
        }
        let lookups: Vec<String> = fields
            .iter()
            .filter(|f| f.lookup_field)
            .map(|f| f.name.clone())
            .collect();
        if lookups.len() > 1 {
            return Err(ConfigError::MultipleLookupFields(lookups));
        }
        Ok(())
    }
}

/// Spec of a composite action linking a main resource to an associated one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssociationSpec {
    #[serde(default)]
    pub main: Option<ResourceSpec>,
    #[serde(default)]
    pub association: Option<ResourceSpec>,
    #[serde(default)]
    pub association_name: Option<String>,
}

impl AssociationSpec {
    pub fn new(main: ResourceSpec, association: ResourceSpec, association_name: impl Into<String>) -> Self {
        AssociationSpec {
            main: Some(main),
            association: Some(association),
            association_name: Some(association_name.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_recognized_keys() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "modelName": "Project",
            "fields": [
                { "name": "id", "type": "Number", "required": true, "lookupField": true },
                { "name": "is_live", "type": "Boolean", "defaultValue": false }
            ],
            "auth": { "ownerCreds": ["profile_id => profile_ids"] },
            "defaultOrderBy": "-updated_at",
            "columnsToReturn": { "default": ["id"], "list": ["id", "name"] }
        }))
        .unwrap();

        assert_eq!(spec.model_name, "Project");
        let fields = spec.field_specs().unwrap();
        assert!(fields[0].lookup_field && fields[0].required);
        assert_eq!(fields[1].default_value, Some(json!(false)));
        assert!(matches!(spec.columns_to_return, Some(ColumnsToReturn::Sets(ref s)) if s.len() == 2));
    }

    #[test]
    fn rejects_unknown_keys_and_broken_invariants() {
        let unknown = serde_json::from_value::<ResourceSpec>(json!({ "modelName": "User", "filter": {} }));
        assert!(unknown.is_err());

        let duplicate = ResourceSpec::new("User")
            .field(FieldSpec::new("id"))
            .field(FieldSpec::new("id"));
        assert!(matches!(duplicate.validate(), Err(ConfigError::DuplicateField(name)) if name == "id"));

        let two_lookups = serde_json::from_value::<ResourceSpec>(json!({
            "modelName": "User",
            "fields": [
                { "name": "id", "lookupField": true },
                { "name": "slug", "lookupField": true }
            ]
        }));
        assert!(two_lookups.is_err());
    }

    #[test]
    fn column_list_form() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "modelName": "User",
            "columnsToReturn": ["id", "username"]
        }))
        .unwrap();
        assert_eq!(
            spec.columns_to_return,
            Some(ColumnsToReturn::List(vec!["id".into(), "username".into()]))
        );
    }
}
