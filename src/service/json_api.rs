//! JSON:API rendering of read results: primary resources, relationship linkage and a
//! de-duplicated `included` list of the loaded related records.

use crate::config::ModelDef;
use crate::store::{Pagination, Record, RecordSet, Related};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Shape of a read action's result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Output {
    /// Records as stored: flat attributes plus nested `relations`.
    #[default]
    Native,
    JsonApi,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub type_: String,
    /// Absent when the id column was projected away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Relationship {
    pub data: Linkage,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    One(Option<Identifier>),
    Many(Vec<Identifier>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Resource),
    Many(Vec<Resource>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub pagination: Pagination,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Model lookup used to type related records.
pub type Models<'a, 'm> = &'a dyn Fn(&str) -> Option<&'m ModelDef>;

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

struct Renderer<'a, 'm> {
    models: Models<'a, 'm>,
    included: Vec<Resource>,
    seen: HashSet<Identifier>,
}

impl<'a, 'm> Renderer<'a, 'm> {
    fn new(models: Models<'a, 'm>) -> Self {
        Renderer {
            models,
            included: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn resource(&mut self, type_: &str, id_attribute: &str, def: Option<&ModelDef>, record: &Record) -> Resource {
        let id = record.get(id_attribute).and_then(id_string);
        let mut attributes = record.attributes.clone();
        attributes.remove(id_attribute);

        let mut relationships = BTreeMap::new();
        for (name, related) in &record.relations {
            let target_type = def
                .and_then(|d| d.association(name))
                .map_or(name.as_str(), |a| a.target_model.as_str());
            let target = (self.models)(target_type);
            let target_id = target.map_or("id", |t| t.id_attribute.as_str());
            let data = match related {
                Related::One(one) => Linkage::One(
                    one.as_deref()
                        .and_then(|r| self.link(target_type, target_id, target, r)),
                ),
                Related::Many(many) => Linkage::Many(
                    many.iter()
                        .filter_map(|r| self.link(target_type, target_id, target, r))
                        .collect(),
                ),
            };
            relationships.insert(name.clone(), Relationship { data });
        }

        Resource {
            type_: type_.to_string(),
            id,
            attributes,
            relationships,
        }
    }

    /// Identifier of a related record, adding it to `included` the first time it is seen.
    /// Related records without an id cannot be linked and are left out.
    fn link(&mut self, type_: &str, id_attribute: &str, def: Option<&ModelDef>, record: &Record) -> Option<Identifier> {
        let resource = self.resource(type_, id_attribute, def, record);
        let identifier = Identifier {
            type_: resource.type_.clone(),
            id: resource.id.clone()?,
        };
        if self.seen.insert(identifier.clone()) {
            self.included.push(resource);
        }
        Some(identifier)
    }

    fn primary(&mut self, def: &ModelDef, record: &Record) -> Resource {
        self.resource(&def.name, &def.id_attribute, Some(def), record)
    }
}

/// Document for a single record.
pub fn single(models: Models<'_, '_>, def: &ModelDef, record: &Record) -> Document {
    let mut renderer = Renderer::new(models);
    let data = PrimaryData::One(renderer.primary(def, record));
    Document {
        data,
        included: renderer.included,
        meta: None,
    }
}

/// Document for a record set; paginated reads carry their window in `meta`.
pub fn collection(models: Models<'_, '_>, def: &ModelDef, set: &RecordSet) -> Document {
    let mut renderer = Renderer::new(models);
    let data = PrimaryData::Many(set.iter().map(|r| renderer.primary(def, r)).collect());
    Document {
        data,
        included: renderer.included,
        meta: set.pagination.map(|pagination| Meta { pagination }),
    }
}
