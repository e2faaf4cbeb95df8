//! MongoDB data access for pet adoption records
//!
//! Records of every species share one collection; each species also keeps a versioned
//! model (its editable form definition) in a collection of its own.
//!
//! # Features
//! - One lazily opened connection; operations issued before it opens are queued and
//!   replayed in order
//! - Schema-driven query building and input sanitizing per species
//! - Two wire formats for input (plain and `{ val }`-wrapped values) and two output shapes
//! - Model bootstrap from storage with a local file fallback and mirror
//! - Bounded exponential retry when opening the connection

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod connection;
pub mod conversion;
pub mod database;
pub mod format;
pub mod manager;
pub mod memory;
pub mod model;
pub mod options;
pub mod query;
pub mod repository;
pub mod retry;
pub mod sanitize;
pub mod schema;
pub mod session;
pub mod species;
pub mod store;
pub mod validation;

pub use config::{CollectionNames, Environment, Identity, StoreConfig};
pub use connection::{Connection, MongoConnector, PoolConfig};
pub use database::PetDatabase;
pub use format::{FormattedRecord, OutputShape};
pub use manager::{ConnectionManager, ConnectionState};
pub use memory::{MemoryConnector, MemoryStore};
pub use model::{FieldMeta, ModelRegistry, SpeciesModel};
pub use options::{DebugLevel, QueryOptions};
pub use pawbridge_common::{PetDataError, Result};
pub use repository::RemoveOutcome;
pub use retry::RetryPolicy;
pub use schema::{FieldSchema, SchemaStore, ValueType};
pub use species::{PropValue, Props};
pub use store::{Connector, MongoStore, RecordStore};
pub use validation::{
    validate_client_filter, validate_query, ObjectIdParser, ValidatedCollectionName,
    ValidatedFieldName,
};
