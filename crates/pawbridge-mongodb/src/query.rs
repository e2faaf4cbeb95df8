//! Query construction.
//!
//! [`QueryBuilder`] turns untrusted search input into a typed filter for one species;
//! [`FindQuery`] carries that filter, with sort and paging, to a [`crate::RecordStore`].

use crate::conversion::{json_map_to_document, json_to_bson};
use crate::sanitize::coerce;
use crate::schema::{SchemaStore, ValueType};
use crate::species::{PropValue, Props};
use crate::validation::{validate_client_filter, ObjectIdParser};
use crate::Result;
use bson::{doc, Bson, Document as BsonDocument, Regex as BsonRegex};
use once_cell::sync::Lazy;
use pawbridge_common::PetDataError;
use regex::Regex;
use serde_json::Value;

/// Keys that identify a single record; the first one present wins
pub const ID_KEYS: &[&str] = &["petId", "hashId", "_id"];

/// Field names whose pattern is anchored at the start
pub const MATCH_START_FOR: &str = "matchStartFor";
/// Field names whose pattern is anchored at the end
pub const MATCH_END_FOR: &str = "matchEndFor";
/// Field names matched case-insensitively
pub const IGNORE_CASE_FOR: &str = "ignoreCaseFor";

static WORD_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").unwrap());

/// Query builder for find operations
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    collection_name: String,
    filter: BsonDocument,
    sort: Option<BsonDocument>,
    skip: Option<u64>,
    limit: Option<i64>,
}

impl FindQuery {
    /// Create a new query over a collection
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            filter: BsonDocument::new(),
            sort: None,
            skip: None,
            limit: None,
        }
    }

    /// Most recent document by `field`
    pub fn latest(collection_name: impl Into<String>, field: &str) -> Self {
        Self::new(collection_name).sort(doc! { field: -1 }).limit(1)
    }

    /// Set the filter document
    pub fn filter(mut self, filter: BsonDocument) -> Self {
        self.filter = filter;
        self
    }

    /// Set the sort order
    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the number of documents to skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the maximum number of documents to return
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn get_filter(&self) -> &BsonDocument {
        &self.filter
    }

    pub fn get_sort(&self) -> Option<&BsonDocument> {
        self.sort.as_ref()
    }

    pub fn get_skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn get_limit(&self) -> Option<i64> {
        self.limit
    }
}

/// A typed record filter together with the species it was built for
#[derive(Debug, Clone, PartialEq)]
pub struct AnimalQuery {
    species: Option<String>,
    filter: BsonDocument,
}

impl AnimalQuery {
    /// `None` means the request named no known species and must not reach storage
    pub fn species(&self) -> Option<&str> {
        self.species.as_deref()
    }

    pub fn filter(&self) -> &BsonDocument {
        &self.filter
    }

    pub fn into_filter(self) -> BsonDocument {
        self.filter
    }

    /// True when the filter is a bare `_id` lookup
    pub fn is_id_lookup(&self) -> bool {
        self.filter.len() == 1 && self.filter.contains_key("_id")
    }
}

/// Escape `raw` and wrap it in the requested anchors
pub fn literal_regex(raw: &str, anchor_start: bool, anchor_end: bool, ignore_case: bool) -> BsonRegex {
    BsonRegex {
        pattern: format!(
            "{}{}{}",
            if anchor_start { "^" } else { "" },
            regex::escape(raw),
            if anchor_end { "$" } else { "" }
        ),
        options: if ignore_case { "i".to_string() } else { String::new() },
    }
}

/// `_id` filter value for a client-supplied identifier
pub fn id_value(value: &Value) -> Bson {
    match value {
        Value::String(s) => ObjectIdParser::id_to_bson(s),
        other => json_to_bson(other),
    }
}

fn searchable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Schema-driven translator from search input to a record filter
pub struct QueryBuilder<'a> {
    schemas: &'a SchemaStore,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schemas: &'a SchemaStore) -> Self {
        Self { schemas }
    }

    /// Build the filter for `props`, already resolved to `species`.
    ///
    /// An id key turns the filter into exactly `{ _id: <id> }`. Otherwise the filter is
    /// the species plus every schema field in `props`: strings as escaped regular
    /// expressions, other types as their coerced value.
    pub fn build(&self, species: Option<&str>, props: &Props) -> AnimalQuery {
        let species = species.map(str::to_string);

        for key in ID_KEYS {
            if let Some(id) = props.get(key) {
                return AnimalQuery {
                    species,
                    filter: doc! { "_id": id_value(id.value()) },
                };
            }
        }

        let mut filter = BsonDocument::new();
        let Some(name) = species.as_deref() else {
            return AnimalQuery { species, filter };
        };
        filter.insert("species", name);

        let list = |key: &str| {
            props
                .get(key)
                .map(PropValue::as_name_list)
                .unwrap_or_default()
        };
        let match_start = list(MATCH_START_FOR);
        let match_end = list(MATCH_END_FOR);
        let ignore_case = list(IGNORE_CASE_FOR);

        for (field, prop) in props.iter() {
            if field == "species" {
                continue;
            }
            let Some(schema) = self.schemas.field(name, field) else {
                continue;
            };

            if schema.val_type == ValueType::String {
                if let Some(text) = searchable_text(prop.value()) {
                    let has = |names: &[String]| names.iter().any(|n| n == field);
                    let regex = literal_regex(
                        &text,
                        has(&match_start),
                        has(&match_end),
                        has(&ignore_case),
                    );
                    filter.insert(field, Bson::RegularExpression(regex));
                }
            } else if let Some(value) = coerce(&schema.val_type, prop.value()) {
                filter.insert(field, value);
            }
        }

        AnimalQuery { species, filter }
    }
}

/// Filter used by `remove`: an exact id when one is well formed, else a name match,
/// else the raw props. Always scoped to `species`.
pub fn removal_filter(species: &str, props: &Props) -> Result<BsonDocument> {
    let pet_id = props.get("petId");
    let pet_name = props.get("petName");

    let mut filter = if pet_id.is_some() || pet_name.is_some() {
        match (pet_id.and_then(PropValue::as_str), pet_name) {
            (Some(id), _) if WORD_ID.is_match(id) => doc! { "_id": ObjectIdParser::id_to_bson(id) },
            (_, Some(name)) => doc! { "petName": json_to_bson(name.value()) },
            _ => {
                return Err(PetDataError::Validation(
                    "petId is malformed and no petName was given".to_string(),
                ))
            }
        }
    } else {
        let raw = json_map_to_document(&props.to_plain_map());
        validate_client_filter(&raw)?;
        raw
    };

    filter.insert("species", species);
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use bson::oid::ObjectId;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn schemas() -> SchemaStore {
        let mut dog = BTreeMap::new();
        dog.insert("petName".to_string(), FieldSchema::new(ValueType::String));
        dog.insert("color".to_string(), FieldSchema::new(ValueType::String));
        dog.insert("weight".to_string(), FieldSchema::new(ValueType::Float));
        dog.insert("neutered".to_string(), FieldSchema::new(ValueType::Boolean));
        let mut species = BTreeMap::new();
        species.insert("dog".to_string(), dog);
        SchemaStore::new(species)
    }

    fn props(value: Value) -> Props {
        Props::from_json(value).unwrap()
    }

    #[test]
    fn test_find_query_new() {
        let q = FindQuery::new("pets_test");
        assert_eq!(q.collection_name(), "pets_test");
        assert!(q.get_filter().is_empty());
        assert!(q.get_sort().is_none());
        assert!(q.get_skip().is_none());
        assert!(q.get_limit().is_none());
    }

    #[test]
    fn test_find_query_latest() {
        let q = FindQuery::latest("pets_model_dog_test", "timestamp");
        assert_eq!(q.get_sort(), Some(&doc! { "timestamp": -1 }));
        assert_eq!(q.get_limit(), Some(1));
    }

    #[test]
    fn test_find_query_chaining() {
        let filter = doc! { "species": "dog" };
        let q = FindQuery::new("pets_test")
            .filter(filter.clone())
            .sort(doc! { "petName": 1 })
            .skip(5)
            .limit(10);
        assert_eq!(q.get_filter(), &filter);
        assert_eq!(q.get_skip(), Some(5));
        assert_eq!(q.get_limit(), Some(10));
    }

    #[test]
    fn test_id_keys_short_circuit() {
        let store = schemas();
        let builder = QueryBuilder::new(&store);
        let hex = "507f1f77bcf86cd799439011";

        for key in ID_KEYS {
            let q = builder.build(
                Some("dog"),
                &props(json!({ "species": "dog", "petName": "Rex", "weight": 3, *key: hex })),
            );
            assert_eq!(q.filter(), &doc! { "_id": ObjectId::parse_str(hex).unwrap() });
            assert!(q.is_id_lookup());
            assert_eq!(q.species(), Some("dog"));
        }

        let q = builder.build(Some("dog"), &props(json!({ "hashId": { "val": "legacy7" } })));
        assert_eq!(q.filter(), &doc! { "_id": "legacy7" });
    }

    #[test]
    fn test_string_fields_become_literal_regex() {
        let store = schemas();
        let q = QueryBuilder::new(&store).build(
            Some("dog"),
            &props(json!({
                "species": "dog",
                "petName": "Rex",
                "color": "Brown",
                "matchStartFor": ["petName"],
                "matchEndFor": ["petName", "color"],
                "ignoreCaseFor": ["color"]
            })),
        );

        assert_eq!(q.filter().get_str("species").unwrap(), "dog");
        assert_eq!(
            q.filter().get("petName"),
            Some(&Bson::RegularExpression(BsonRegex {
                pattern: "^Rex$".to_string(),
                options: String::new(),
            }))
        );
        assert_eq!(
            q.filter().get("color"),
            Some(&Bson::RegularExpression(BsonRegex {
                pattern: "Brown$".to_string(),
                options: "i".to_string(),
            }))
        );
        assert!(!q.filter().contains_key("matchStartFor"));
    }

    #[test]
    fn test_regex_escapes_special_characters() {
        let raw = r".*+?^$()[]{}|\";
        let regex = literal_regex(raw, false, false, false);
        let compiled = Regex::new(&regex.pattern).unwrap();
        assert!(compiled.is_match(raw));
        assert!(compiled.is_match(&format!("before {} after", raw)));
        assert!(!compiled.is_match("anything else"));

        let anchored = Regex::new(&literal_regex("a.b", true, true, false).pattern).unwrap();
        assert!(anchored.is_match("a.b"));
        assert!(!anchored.is_match("axb"));
        assert!(!anchored.is_match("a.bc"));
    }

    #[test]
    fn test_non_string_fields_are_coerced_and_unknown_dropped() {
        let store = schemas();
        let q = QueryBuilder::new(&store).build(
            Some("dog"),
            &props(json!({ "weight": "12.5", "neutered": true, "owner": "Sam" })),
        );
        assert_eq!(q.filter(), &doc! { "species": "dog", "neutered": true, "weight": 12.5 });
    }

    #[test]
    fn test_unresolved_species_builds_empty_query() {
        let store = schemas();
        let q = QueryBuilder::new(&store).build(None, &props(json!({ "petName": "Rex" })));
        assert_eq!(q.species(), None);
        assert!(q.filter().is_empty());
    }

    #[test]
    fn test_removal_filter_prefers_well_formed_id() {
        let hex = "507f1f77bcf86cd799439011";
        let filter = removal_filter("dog", &props(json!({ "petId": hex, "petName": "Rex" }))).unwrap();
        assert_eq!(
            filter,
            doc! { "_id": ObjectId::parse_str(hex).unwrap(), "species": "dog" }
        );

        let filter = removal_filter("dog", &props(json!({ "petId": "not an id!", "petName": "Rex" }))).unwrap();
        assert_eq!(filter, doc! { "petName": "Rex", "species": "dog" });
    }

    #[test]
    fn test_removal_filter_passes_raw_props_through() {
        let filter = removal_filter(
            "dog",
            &props(json!({ "species": { "val": "DOG" }, "color": "brown" })),
        )
        .unwrap();
        assert_eq!(filter, doc! { "color": "brown", "species": "dog" });
    }

    #[test]
    fn test_removal_filter_rejects_operators() {
        assert!(removal_filter("dog", &props(json!({ "$where": "true" }))).is_err());
        assert!(removal_filter("dog", &props(json!({ "petId": "???" }))).is_err());
    }
}
