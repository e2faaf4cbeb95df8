//! Error types for pawbridge

use thiserror::Error;

/// Result type alias for pawbridge operations
pub type Result<T> = std::result::Result<T, PetDataError>;

/// Unified error type for all pawbridge operations
#[derive(Error, Debug, Clone)]
pub enum PetDataError {
    /// The request did not name a configured species
    #[error("Must use valid species")]
    Species,

    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable model could be built while opening the session; aborts startup
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// Local file access (schema and models files)
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PetDataError {
    /// HTTP-style status attached to the error for the serving layer
    pub fn status(&self) -> u16 {
        match self {
            PetDataError::Species => 404,
            PetDataError::MongoDB(_) | PetDataError::Database(_) => 404,
            PetDataError::Validation(_) | PetDataError::Query(_) => 400,
            PetDataError::Connection(_) => 503,
            PetDataError::Serialization(_)
            | PetDataError::Deserialization(_)
            | PetDataError::Bootstrap(_)
            | PetDataError::Io(_)
            | PetDataError::Internal(_) => 500,
        }
    }

    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PetDataError::Connection(_))
    }

    /// Returns true if the error came from the storage round-trip itself
    pub fn is_storage(&self) -> bool {
        matches!(self, PetDataError::MongoDB(_) | PetDataError::Database(_))
    }
}

impl From<serde_json::Error> for PetDataError {
    fn from(err: serde_json::Error) -> Self {
        PetDataError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for PetDataError {
    fn from(err: std::io::Error) -> Self {
        PetDataError::Io(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for PetDataError {
    fn from(err: mongodb::error::Error) -> Self {
        PetDataError::MongoDB(err.to_string())
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for PetDataError {
    fn from(err: bson::ser::Error) -> Self {
        PetDataError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for PetDataError {
    fn from(err: bson::de::Error) -> Self {
        PetDataError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}
