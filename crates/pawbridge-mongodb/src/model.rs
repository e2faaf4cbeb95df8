//! Species models: the editable form definition (labels, defaults, examples) of a species.
//!
//! A model is stored as one document per version in the species' model collection, each
//! stamped with a `timestamp`; the most recent one is the current model.

use crate::conversion::{bson_to_json, json_to_bson};
use crate::schema::ValueType;
use crate::species::Props;
use crate::Result;
use bson::{Bson, Document as BsonDocument};
use pawbridge_common::PetDataError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Keys added by storage that never belong to the in-memory model
pub const BOOKKEEPING_FIELDS: &[&str] = &["__v", "_id", "timestamp"];

/// Field carrying the version stamp of a stored model
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Metadata describing one field of a species model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_val: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_bool"
    )]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_type: Option<ValueType>,
    /// Any other metadata the form definition carries (`note`, `key`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accepts `true`, `"true"`, `"yes"`, `"required"` and friends
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|flag| match flag {
        Flag::Bool(b) => b,
        Flag::Text(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "required" | "1"
        ),
    }))
}

impl FieldMeta {
    pub fn labelled(label: &str, val_type: ValueType) -> Self {
        Self {
            field_label: Some(label.to_string()),
            val_type: Some(val_type),
            ..Default::default()
        }
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn from_json_map(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| PetDataError::Deserialization(format!("Invalid field metadata: {}", e)))
    }

    /// This metadata with `val` set to `value` (the annotated wire shape)
    pub fn annotate(&self, value: Value) -> Value {
        let mut map = self.to_json_map();
        map.insert("val".to_string(), value);
        Value::Object(map)
    }
}

/// Current model of one species: field name -> metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesModel {
    fields: BTreeMap<String, FieldMeta>,
}

impl SpeciesModel {
    pub fn new(fields: BTreeMap<String, FieldMeta>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldMeta)> {
        self.fields.iter().map(|(name, meta)| (name.as_str(), meta))
    }

    pub fn insert(&mut self, name: impl Into<String>, meta: FieldMeta) {
        self.fields.insert(name.into(), meta);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overlay client metadata onto the current fields.
    ///
    /// Only fields already in the model are kept; for each, the client's metadata
    /// (minus any `val`) replaces the matching keys.
    pub fn merged_with(&self, input: &Props) -> Result<SpeciesModel> {
        let mut fields = BTreeMap::new();
        for (name, current) in &self.fields {
            let mut map = current.to_json_map();
            if let Some(update) = input.get(name) {
                for (key, value) in update.metadata() {
                    if key != "val" {
                        map.insert(key, value);
                    }
                }
            }
            fields.insert(name.clone(), FieldMeta::from_json_map(map)?);
        }
        Ok(SpeciesModel { fields })
    }

    /// Storage form: one sub-document per field plus the version stamp
    pub fn to_document(&self, timestamp: bson::DateTime) -> BsonDocument {
        let mut doc: BsonDocument = self
            .fields
            .iter()
            .map(|(name, meta)| (name.clone(), json_to_bson(&Value::Object(meta.to_json_map()))))
            .collect();
        doc.insert(TIMESTAMP_FIELD, timestamp);
        doc
    }

    /// Read a stored model, dropping the storage bookkeeping fields
    pub fn from_document(doc: &BsonDocument) -> Result<SpeciesModel> {
        let mut fields = BTreeMap::new();
        for (name, value) in doc {
            if BOOKKEEPING_FIELDS.contains(&name.as_str()) {
                continue;
            }
            match value {
                Bson::Document(_) => {
                    let meta = match bson_to_json(value) {
                        Value::Object(map) => FieldMeta::from_json_map(map)?,
                        _ => FieldMeta::default(),
                    };
                    fields.insert(name.clone(), meta);
                }
                other => {
                    tracing::warn!(field = %name, value = %other, "Skipping non-document model field");
                }
            }
        }
        Ok(SpeciesModel { fields })
    }
}

/// The current model of every species, keyed by species name.
///
/// Serializes to the shape of the local models file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRegistry {
    models: BTreeMap<String, SpeciesModel>,
}

impl ModelRegistry {
    pub fn from_json(raw: &str) -> Result<Self> {
        let models: BTreeMap<String, SpeciesModel> = serde_json::from_str(raw)
            .map_err(|e| PetDataError::Deserialization(format!("Invalid models file: {}", e)))?;
        Ok(Self {
            models: models
                .into_iter()
                .map(|(species, model)| (species.to_lowercase(), model))
                .collect(),
        })
    }

    pub fn get(&self, species: &str) -> Option<&SpeciesModel> {
        self.models.get(species)
    }

    pub fn set(&mut self, species: impl Into<String>, model: SpeciesModel) {
        self.models.insert(species.into(), model);
    }

    pub fn contains(&self, species: &str) -> bool {
        self.models.contains_key(species)
    }

    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
