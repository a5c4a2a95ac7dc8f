//! Normalized records returned by a store.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Related record(s) loaded for one association.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Related {
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Related::One(one) => one.iter().map(|r| r.as_ref()).collect(),
            Related::Many(many) => many.iter().collect(),
        }
    }

    /// `attribute` of every related record (absent values read as null).
    pub fn pluck(&self, attribute: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .map(|r| r.get(attribute).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

const RELATIONS_KEY: &str = "relations";

/// Serializes flat: the attributes, then any loaded relations under `"relations"`.
/// Loaded relations shadow an attribute of that name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub attributes: Map<String, Value>,
    pub relations: BTreeMap<String, Related>,
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nested = !self.relations.is_empty();
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in &self.attributes {
            if nested && k == RELATIONS_KEY {
                continue;
            }
            map.serialize_entry(k, v)?;
        }
        if nested {
            map.serialize_entry(RELATIONS_KEY, &self.relations)?;
        }
        map.end()
    }
}

impl Record {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Record {
            attributes,
            relations: BTreeMap::new(),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Append `other` to the named relation, creating a to-many relation if absent.
    pub fn push_related(&mut self, name: &str, other: Record) {
        match self.relations.get_mut(name) {
            Some(Related::Many(many)) => many.push(other),
            Some(Related::One(one)) => *one = Some(Box::new(other)),
            None => {
                self.relations.insert(name.to_string(), Related::Many(vec![other]));
            }
        }
    }

    /// Keep only the listed attributes.
    pub fn project(&mut self, columns: &[String]) {
        self.attributes.retain(|k, _| columns.iter().any(|c| c == k));
    }
}

impl From<Map<String, Value>> for Record {
    fn from(attributes: Map<String, Value>) -> Self {
        Record::new(attributes)
    }
}

/// Window metadata of a paginated read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub skip: u64,
    pub limit: u64,
    pub row_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RecordSet {
    pub records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        RecordSet {
            records,
            pagination: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
