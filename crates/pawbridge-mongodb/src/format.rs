//! Shaping stored records for clients

use crate::conversion::bson_to_json;
use crate::model::{FieldMeta, ModelRegistry};
use bson::Document as BsonDocument;
use serde_json::{Map, Value};

/// Client-facing identifier key
pub const PET_ID: &str = "petId";

/// A record in its client wire shape
pub type FormattedRecord = Map<String, Value>;

/// Wire shape of read results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputShape {
    /// Each field is its model metadata plus `val`
    #[default]
    Annotated,
    /// Each field is its bare value
    Flattened,
}

/// Turns stored records into [`FormattedRecord`]s using the current species models
pub struct OutputFormatter<'a> {
    models: &'a ModelRegistry,
}

impl<'a> OutputFormatter<'a> {
    pub fn new(models: &'a ModelRegistry) -> Self {
        Self { models }
    }

    /// Format one stored record.
    ///
    /// Only fields declared by the species model are emitted. The species comes from the
    /// record when it names one with a model, else `species`.
    pub fn format(&self, species: &str, record: &BsonDocument, shape: OutputShape) -> FormattedRecord {
        let mut out = Map::new();
        if record.is_empty() {
            return out;
        }

        let species = record
            .get_str("species")
            .ok()
            .map(str::to_lowercase)
            .filter(|s| self.models.contains(s))
            .unwrap_or_else(|| species.to_string());

        let Some(model) = self.models.get(&species) else {
            tracing::warn!(species = %species, "No model to format record with");
            return out;
        };

        for (field, meta) in model.fields() {
            if field == PET_ID {
                continue;
            }
            if let Some(value) = record.get(field) {
                let value = bson_to_json(value);
                let entry = match shape {
                    OutputShape::Annotated => meta.annotate(value),
                    OutputShape::Flattened => value,
                };
                out.insert(field.to_string(), entry);
            }
        }

        if let Some(id) = record.get("_id") {
            let id = bson_to_json(id);
            let entry = match shape {
                OutputShape::Annotated => model
                    .field(PET_ID)
                    .cloned()
                    .unwrap_or_default()
                    .annotate(id),
                OutputShape::Flattened => id,
            };
            out.insert(PET_ID.to_string(), entry);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpeciesModel;
    use crate::schema::ValueType;
    use bson::{doc, oid::ObjectId};
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let mut dog = SpeciesModel::default();
        dog.insert("species", FieldMeta::labelled("Species", ValueType::String));
        dog.insert("petName", FieldMeta::labelled("Name", ValueType::String));
        dog.insert("petId", FieldMeta::labelled("Pet ID", ValueType::String));
        let mut registry = ModelRegistry::default();
        registry.set("dog", dog);
        registry
    }

    #[test]
    fn test_annotated_shape() {
        let models = registry();
        let id = ObjectId::new();
        let record = doc! { "_id": id, "species": "dog", "petName": "Rex", "secret": "x" };

        let out = OutputFormatter::new(&models).format("dog", &record, OutputShape::Annotated);
        assert_eq!(out["petName"], json!({ "fieldLabel": "Name", "valType": "String", "val": "Rex" }));
        assert_eq!(out["petId"]["val"], json!(id.to_hex()));
        assert_eq!(out["petId"]["fieldLabel"], json!("Pet ID"));
        assert!(out.get("secret").is_none());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_flattened_shape() {
        let models = registry();
        let id = ObjectId::new();
        let record = doc! { "_id": id, "species": "dog", "petName": "Rex" };

        let out = OutputFormatter::new(&models).format("dog", &record, OutputShape::Flattened);
        assert_eq!(
            Value::Object(out),
            json!({ "species": "dog", "petName": "Rex", "petId": id.to_hex() })
        );
    }

    #[test]
    fn test_empty_record_formats_empty() {
        let models = registry();
        let out = OutputFormatter::new(&models).format("dog", &doc! {}, OutputShape::Annotated);
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_species_formats_empty() {
        let models = registry();
        let out = OutputFormatter::new(&models).format(
            "cat",
            &doc! { "_id": 1, "species": "cat", "petName": "Tom" },
            OutputShape::Flattened,
        );
        assert!(out.is_empty());
    }
}
