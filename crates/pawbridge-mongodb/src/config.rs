//! Store configuration: connection identity, environment, file locations and policies
//!
//! Every identity field is resolved independently: an environment variable with the
//! field's own name wins, then the local `mongodb.config` JSON file, then a placeholder.

use crate::connection::PoolConfig;
use crate::retry::RetryPolicy;
use crate::validation::ValidatedCollectionName;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the identity file, relative to the working directory
pub const IDENTITY_FILE: &str = "mongodb.config";
/// Default location of the species schema file
pub const SCHEMA_FILE: &str = "data/schema.json";
/// Default location of the cached models file
pub const MODELS_FILE: &str = "data/models.json";

/// Credentials and address of the storage endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: String,
    pub database: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            username: "username".to_string(),
            password: "password".to_string(),
            host: "example.com".to_string(),
            port: "port".to_string(),
            database: "no_database_provided".to_string(),
        }
    }
}

/// Contents of the identity file. Missing keys fall through to the placeholders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityFile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "domain")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }

    Ok(Option::<Port>::deserialize(deserializer)?.map(|port| match port {
        Port::Number(n) => n.to_string(),
        Port::Text(s) => s,
    }))
}

impl Identity {
    /// Resolve from the process environment and the identity file at `path`
    pub fn resolve(path: &Path) -> Self {
        Self::resolve_with(|key| std::env::var(key).ok(), Self::read_file(path))
    }

    /// Resolve with an explicit variable lookup
    pub fn resolve_with<F>(lookup: F, file: Option<IdentityFile>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        let fallback = Identity::default();
        let pick = |key: &str, from_file: Option<String>, placeholder: String| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .or(from_file)
                .unwrap_or(placeholder)
        };

        Self {
            username: pick("username", file.username, fallback.username),
            password: pick("password", file.password, fallback.password),
            host: pick("host", file.host, fallback.host),
            port: pick("port", file.port, fallback.port),
            database: pick("database", file.database, fallback.database),
        }
    }

    /// Read the identity file, logging and ignoring any failure
    pub fn read_file(path: &Path) -> Option<IdentityFile> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Could not read identity file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Identity file is not valid JSON");
                None
            }
        }
    }

    /// Connection URI: `mongodb://<username>:<password>@<host>:<port>/<database>`
    pub fn uri(&self) -> String {
        format!(
            "mongodb://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.database
        )
    }

    /// Same as [`Identity::uri`] with the password masked, for logs
    pub fn redacted_uri(&self) -> String {
        format!(
            "mongodb://{}:****@{}:{}/{}",
            urlencoding::encode(&self.username),
            self.host,
            self.port,
            self.database
        )
    }
}

/// Deployment environment, which selects the storage names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    /// Parse a loose environment name; anything unrecognized is production
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" | "test" => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    fn suffix(&self) -> &'static str {
        match self {
            Environment::Development => "test",
            Environment::Production => "production",
        }
    }
}

/// Collection names derived from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionNames {
    environment: Environment,
}

impl CollectionNames {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Collection shared by the records of every species
    pub fn records(&self) -> &'static str {
        match self.environment {
            Environment::Development => "pets_test",
            Environment::Production => "pets_production",
        }
    }

    /// Append-only model history for one species
    pub fn model(&self, species: &str) -> Result<ValidatedCollectionName> {
        ValidatedCollectionName::new(&format!(
            "pets_model_{}_{}",
            species,
            self.environment.suffix()
        ))
    }
}

/// Configuration of a [`crate::PetDatabase`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub identity: Identity,
    pub environment: Environment,
    /// Species schema file (species -> field -> type)
    pub schema_path: PathBuf,
    /// Local mirror of the current models
    pub models_path: PathBuf,
    /// Ignore stored models at startup and reseed them from the local file
    pub force_local_models: bool,
    /// Backoff applied when opening the connection fails
    pub retry: RetryPolicy,
    pub pool: PoolConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            identity: Identity::default(),
            environment: Environment::default(),
            schema_path: PathBuf::from(SCHEMA_FILE),
            models_path: PathBuf::from(MODELS_FILE),
            force_local_models: false,
            retry: RetryPolicy::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Loads configuration from the environment and the local identity file.
    pub fn from_env() -> Self {
        Self {
            identity: Identity::resolve(Path::new(IDENTITY_FILE)),
            ..Self::default()
        }
        .with_env_overrides()
    }

    /// Applies `PAWBRIDGE_*` environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PAWBRIDGE_ENV") {
            self.environment = Environment::parse(&v);
        }
        if let Ok(v) = std::env::var("PAWBRIDGE_RETRY_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.retry.initial_delay = Duration::from_millis(ms);
                self.retry.max_delay = self.retry.max_delay.max(self.retry.initial_delay);
            }
        }
        if let Ok(v) = std::env::var("PAWBRIDGE_FORCE_LOCAL_MODELS") {
            self.force_local_models = matches!(v.trim(), "1" | "true" | "yes");
        }
        self
    }

    pub fn collection_names(&self) -> CollectionNames {
        CollectionNames::new(self.environment)
    }
}
