//! Input validation for MongoDB operations
//!
//! Client input reaches storage in two places where it is not rebuilt from the species
//! schema: the pass-through filter of `remove` and `_id` lookups. This module guards
//! both, plus the collection names derived from species keys.
//!
//! # Security Features
//! - Collection name validation (prevents system collection access)
//! - Field name validation (prevents operator injection)
//! - ObjectId parsing only where the field is known to hold an ObjectId
//! - Query screening for JavaScript-executing operators

use crate::Result;
use bson::{oid::ObjectId, Bson};
use pawbridge_common::PetDataError;

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Validated collection name that prevents injection attacks
///
/// # Security Guarantees
/// - Not empty
/// - Maximum 120 characters
/// - No null bytes
/// - No "system." prefix (system collections)
/// - No $ characters (special operators)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    /// Creates a new validated collection name
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(PetDataError::Validation(
                "Collection name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return Err(PetDataError::Validation(format!(
                "Collection name exceeds maximum length of {} characters: '{}'",
                MAX_COLLECTION_NAME_LENGTH, name
            )));
        }

        if name.contains('\0') {
            return Err(PetDataError::Validation(
                "Collection name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with("system.") {
            return Err(PetDataError::Validation(format!(
                "Collection name cannot start with 'system.' (reserved): '{}'",
                name
            )));
        }

        if name.contains('$') {
            return Err(PetDataError::Validation(format!(
                "Collection name cannot contain '$' character: '{}'",
                name
            )));
        }

        if name.contains("..") || name.contains("//") {
            tracing::warn!(collection = %name, "Collection name contains suspicious pattern");
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    /// Returns the validated collection name as a string slice
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Validated field name for client-supplied filter keys
///
/// # Security Guarantees
/// - Not empty
/// - Maximum 1024 characters
/// - No null bytes
/// - No $ prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFieldName {
    name: String,
}

impl ValidatedFieldName {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(PetDataError::Validation(
                "Field name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_FIELD_NAME_LENGTH {
            return Err(PetDataError::Validation(format!(
                "Field name exceeds maximum length of {} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }

        if name.contains('\0') {
            return Err(PetDataError::Validation(
                "Field name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with('$') {
            return Err(PetDataError::Validation(format!(
                "Field name cannot start with '$' (reserved for operators): '{}'",
                name
            )));
        }

        Ok(ValidatedFieldName {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

/// Type-hinted ObjectId parser
///
/// A string only becomes an ObjectId when it has the ObjectId shape *and* the caller
/// states that the field holds ObjectIds. Without the hint the string is left alone.
pub struct ObjectIdParser;

impl ObjectIdParser {
    /// Checks if a string should be converted to ObjectId based on type hint
    pub fn should_convert_to_objectid(value: &str, type_name: Option<&str>) -> bool {
        if !Self::is_valid_objectid_format(value) {
            return false;
        }

        match type_name {
            Some(name) => Self::is_objectid_type(name),
            None => false,
        }
    }

    /// Checks if a string has valid ObjectId format (24 hex characters)
    pub fn is_valid_objectid_format(value: &str) -> bool {
        value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit())
    }

    fn is_objectid_type(type_name: &str) -> bool {
        matches!(type_name, "ObjectId" | "BsonObjectId" | "MongoObjectId")
    }

    /// Convert a record identifier for an `_id` filter
    pub fn id_to_bson(value: &str) -> Bson {
        if Self::should_convert_to_objectid(value, Some("ObjectId")) {
            if let Ok(oid) = ObjectId::parse_str(value) {
                return Bson::ObjectId(oid);
            }
        }
        Bson::String(value.to_string())
    }
}

/// Dangerous MongoDB operators that should be blocked
const DANGEROUS_OPERATORS: &[&str] = &[
    "$where",       // JavaScript execution
    "$function",    // JavaScript execution
    "$accumulator", // Custom JavaScript in aggregation
];

/// Validates a MongoDB query document for dangerous operators
///
/// # Errors
/// Returns ValidationError if dangerous operators are detected
pub fn validate_query(query: &Bson) -> Result<()> {
    match query {
        Bson::Document(doc) => {
            for (key, value) in doc.iter() {
                if DANGEROUS_OPERATORS.contains(&key.as_str()) {
                    return Err(PetDataError::Validation(format!(
                        "Dangerous operator '{}' is not allowed for security reasons",
                        key
                    )));
                }

                validate_query(value)?;
            }
            Ok(())
        }
        Bson::Array(arr) => {
            for item in arr {
                validate_query(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Validates a client-built filter: every key, at any depth, must be a plain field name,
/// so client filters only ever match by value
pub fn validate_client_filter(filter: &bson::Document) -> Result<()> {
    let filter = Bson::Document(filter.clone());
    validate_query(&filter)?;
    validate_client_keys(&filter)
}

fn validate_client_keys(value: &Bson) -> Result<()> {
    match value {
        Bson::Document(doc) => {
            for (key, value) in doc {
                ValidatedFieldName::new(key)?;
                validate_client_keys(value)?;
            }
            Ok(())
        }
        Bson::Array(items) => items.iter().try_for_each(validate_client_keys),
        _ => Ok(()),
    }
}
