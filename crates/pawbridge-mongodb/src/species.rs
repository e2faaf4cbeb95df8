//! Client input and species resolution.
//!
//! Clients send field values in two wire formats: a plain value (`"petName": "Rex"`)
//! or the legacy metadata-wrapped form (`"petName": { "val": "Rex", "fieldLabel": ... }`).
//! Both are folded into [`PropValue`] once, at the boundary; nothing past this module
//! looks at raw JSON shapes.

use crate::model::ModelRegistry;
use crate::schema::SchemaStore;
use crate::Result;
use pawbridge_common::PetDataError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One client-supplied field value
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Bare value
    Plain(Value),
    /// `{ "val": ..., <metadata> }`
    Wrapped { val: Value, meta: Map<String, Value> },
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut map) => match map.remove("val") {
                Some(val) => PropValue::Wrapped { val, meta: map },
                None => PropValue::Plain(Value::Object(map)),
            },
            other => PropValue::Plain(other),
        }
    }
}

impl PropValue {
    /// The carried value, whichever format it arrived in
    pub fn value(&self) -> &Value {
        match self {
            PropValue::Plain(value) => value,
            PropValue::Wrapped { val, .. } => val,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value().as_str()
    }

    /// Metadata keys sent alongside the value (never includes `val`)
    pub fn metadata(&self) -> Map<String, Value> {
        match self {
            PropValue::Wrapped { meta, .. } => meta.clone(),
            PropValue::Plain(Value::Object(map)) => map.clone(),
            PropValue::Plain(_) => Map::new(),
        }
    }

    /// Read the value as a list of field names; a single string counts as one name
    pub fn as_name_list(&self) -> Vec<String> {
        match self.value() {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Value::String(s) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// A bag of client-supplied fields
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Props {
    entries: BTreeMap<String, PropValue>,
}

impl From<Map<String, Value>> for Props {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            entries: map
                .into_iter()
                .map(|(key, value)| (key, PropValue::from(value)))
                .collect(),
        }
    }
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a JSON object; anything else is a validation error
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from(map)),
            other => Err(PetDataError::Validation(format!(
                "Expected an object of fields, got {}",
                other
            ))),
        }
    }

    /// Builder-style insert of a plain or wrapped value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), PropValue::from(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain JSON view, with wrapped values reduced to their `val`
    pub fn to_plain_map(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), value.value().clone()))
            .collect()
    }
}

/// The ways a request can name its species
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesInput<'a> {
    /// `"species": "dog"`
    Plain(&'a str),
    /// `"species": { "val": "dog" }`
    Wrapped(&'a str),
    /// `"species": { "defaultVal": "dog" }`, only meaningful for model input
    ModelDefault(&'a str),
}

impl<'a> SpeciesInput<'a> {
    /// Read the species of a record query or record write
    pub fn from_query(props: &'a Props) -> Option<Self> {
        match props.get("species")? {
            PropValue::Plain(Value::String(s)) => Some(SpeciesInput::Plain(s)),
            PropValue::Wrapped {
                val: Value::String(s),
                ..
            } => Some(SpeciesInput::Wrapped(s)),
            _ => None,
        }
    }

    /// Read the species of a model request: `val` first, then `defaultVal`
    pub fn from_model(props: &'a Props) -> Option<Self> {
        if let Some(found) = Self::from_query(props) {
            return Some(found);
        }
        let default_val = match props.get("species")? {
            PropValue::Wrapped { meta, .. } => meta.get("defaultVal"),
            PropValue::Plain(Value::Object(map)) => map.get("defaultVal"),
            PropValue::Plain(_) => None,
        };
        default_val
            .and_then(Value::as_str)
            .map(SpeciesInput::ModelDefault)
    }

    /// Lowercased species name
    pub fn name(&self) -> String {
        match self {
            SpeciesInput::Plain(s) | SpeciesInput::Wrapped(s) | SpeciesInput::ModelDefault(s) => {
                s.to_lowercase()
            }
        }
    }
}

/// Decides which configured species a request refers to
pub struct SpeciesResolver<'a> {
    schemas: &'a SchemaStore,
    models: &'a ModelRegistry,
}

impl<'a> SpeciesResolver<'a> {
    pub fn new(schemas: &'a SchemaStore, models: &'a ModelRegistry) -> Self {
        Self { schemas, models }
    }

    /// Species of a record request, if it names a species with a schema
    pub fn resolve_from_query(&self, props: &Props) -> Option<String> {
        let species = SpeciesInput::from_query(props)?.name();
        self.schemas.contains(&species).then_some(species)
    }

    /// Species of a model request, if it names a species with a current model
    pub fn resolve_from_model_input(&self, props: &Props) -> Option<String> {
        let species = SpeciesInput::from_model(props)?.name();
        self.models.contains(&species).then_some(species)
    }
}
