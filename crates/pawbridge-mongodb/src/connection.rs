//! MongoDB connection with pool configuration and health checking

use crate::store::{Connector, MongoStore, RecordStore};
use crate::Result;
use async_trait::async_trait;
use bson::{doc, Document as BsonDocument};
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database,
};
use pawbridge_common::PetDataError;
use std::sync::Arc;
use std::time::Duration;

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            // Operations are drained one at a time, so a small pool is plenty
            min_pool_size: Some(1),
            max_pool_size: Some(5),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("pawbridge".to_string()),
        }
    }
}

/// An open MongoDB client bound to the database named in the URI
pub struct Connection {
    client: Client,
    database: Database,
    database_name: String,
}

impl Connection {
    /// Create a new MongoDB connection with default pool settings
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, PoolConfig::default()).await
    }

    /// Create a new MongoDB connection with custom pool configuration
    pub async fn with_config(connection_string: &str, config: PoolConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(connection_string).await?;

        if let Some(min) = config.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = config.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = config.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = config.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = config.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = config.app_name {
            client_options.app_name = Some(app);
        }

        // Set stable API version for compatibility
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;

        let database = client.default_database().ok_or_else(|| {
            PetDataError::Connection("No default database specified in connection string".to_string())
        })?;

        let database_name = database.name().to_string();

        Ok(Self {
            client,
            database,
            database_name,
        })
    }

    /// Get a reference to the database
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the database name
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Get a reference to the client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get a collection by name (returns untyped BsonDocument collection)
    pub fn get_collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }

    /// Check if the connection is healthy by pinging the server
    pub async fn ping(&self) -> Result<bool> {
        match self.database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => Ok(true),
            Err(e) => Err(PetDataError::Connection(format!("Ping failed: {}", e))),
        }
    }
}

/// Opens [`MongoStore`]s; a connection counts as open once the server answers a ping
#[derive(Debug, Clone, Default)]
pub struct MongoConnector {
    pool: PoolConfig,
}

impl MongoConnector {
    pub fn new(pool: PoolConfig) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn RecordStore>> {
        let connection = Connection::with_config(uri, self.pool.clone()).await?;
        connection.ping().await?;
        tracing::info!(database = %connection.database_name(), "MongoDB connection open");
        Ok(Arc::new(MongoStore::new(connection)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_pool_size, Some(1));
        assert_eq!(config.max_pool_size, Some(5));
        assert_eq!(config.app_name, Some("pawbridge".to_string()));
    }

    #[test]
    fn test_custom_pool_config() {
        let config = PoolConfig {
            max_pool_size: Some(50),
            connect_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        assert_eq!(config.min_pool_size, Some(1));
        assert_eq!(config.max_pool_size, Some(50));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_uri() {
        let result = MongoConnector::default().connect("not-a-uri").await;
        assert!(result.is_err());
    }
}
