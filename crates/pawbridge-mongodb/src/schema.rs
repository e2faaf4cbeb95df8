//! Species schemas: which fields a record of each species may carry, and their types.
//!
//! Loaded once from `data/schema.json` (`species -> field -> { "valType": ... }`) and
//! read-only afterwards. The set of valid species is exactly the set of schema keys.

use crate::Result;
use pawbridge_common::PetDataError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Declared value type of a schema or model field.
///
/// Unknown type names are kept verbatim in [`ValueType::Other`] so models written back to
/// storage or the local cache carry the name they were read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    String,
    Number,
    Float,
    Location,
    Date,
    Boolean,
    ImageArray,
    Other(String),
}

impl ValueType {
    /// Types stored as a floating-point number
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Number | ValueType::Float | ValueType::Location)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ValueType::String => "String",
            ValueType::Number => "Number",
            ValueType::Float => "Float",
            ValueType::Location => "Location",
            ValueType::Date => "Date",
            ValueType::Boolean => "Boolean",
            ValueType::ImageArray => "[Image]",
            ValueType::Other(name) => name,
        }
    }
}

impl From<String> for ValueType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "String" => ValueType::String,
            "Number" => ValueType::Number,
            "Float" => ValueType::Float,
            "Location" => ValueType::Location,
            "Date" => ValueType::Date,
            "Boolean" => ValueType::Boolean,
            "[Image]" | "Image-array" => ValueType::ImageArray,
            _ => ValueType::Other(name),
        }
    }
}

impl From<ValueType> for String {
    fn from(val_type: ValueType) -> Self {
        match val_type {
            ValueType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// One declared field of a species schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "valType", alias = "type")]
    pub val_type: ValueType,
    /// Validation hints carried alongside the type
    #[serde(flatten)]
    pub hints: Map<String, Value>,
}

impl FieldSchema {
    pub fn new(val_type: ValueType) -> Self {
        Self {
            val_type,
            hints: Map::new(),
        }
    }
}

/// Field schema of one species
pub type SpeciesSchema = BTreeMap<String, FieldSchema>;

/// All species schemas, keyed by lowercase species name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaStore {
    species: BTreeMap<String, SpeciesSchema>,
}

impl SchemaStore {
    pub fn new(species: BTreeMap<String, SpeciesSchema>) -> Self {
        Self {
            species: species
                .into_iter()
                .map(|(name, schema)| (name.to_lowercase(), schema))
                .collect(),
        }
    }

    /// Parse the schema file contents
    pub fn from_json(raw: &str) -> Result<Self> {
        let species: BTreeMap<String, SpeciesSchema> = serde_json::from_str(raw)
            .map_err(|e| PetDataError::Deserialization(format!("Invalid schema file: {}", e)))?;
        Ok(Self::new(species))
    }

    /// Load the schema file; an unreadable or invalid file yields an empty store
    pub fn load(path: &Path) -> Self {
        let loaded = std::fs::read_to_string(path)
            .map_err(PetDataError::from)
            .and_then(|raw| Self::from_json(&raw));

        match loaded {
            Ok(store) => {
                tracing::debug!(path = %path.display(), species = store.len(), "Loaded species schemas");
                store
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Could not load species schemas");
                Self::default()
            }
        }
    }

    pub fn contains(&self, species: &str) -> bool {
        self.species.contains_key(species)
    }

    /// Species names in their fixed (sorted) iteration order
    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.species.keys().map(String::as_str)
    }

    pub fn schema(&self, species: &str) -> Option<&SpeciesSchema> {
        self.species.get(species)
    }

    pub fn field(&self, species: &str, field: &str) -> Option<&FieldSchema> {
        self.species.get(species).and_then(|schema| schema.get(field))
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}
