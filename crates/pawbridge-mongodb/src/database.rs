//! Public handle over the pet records store

use crate::config::StoreConfig;
use crate::connection::MongoConnector;
use crate::format::FormattedRecord;
use crate::manager::{ConnectionManager, ConnectionState, Job};
use crate::model::SpeciesModel;
use crate::options::QueryOptions;
use crate::repository::{AnimalRepository, ModelRepository, RemoveOutcome};
use crate::schema::SchemaStore;
use crate::session::{Session, StoreContext};
use crate::species::Props;
use crate::store::Connector;
use crate::Result;
use futures::FutureExt;
use pawbridge_common::PetDataError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Handle to the pet records store.
///
/// Cheap to clone; every clone shares one connection. The connection opens on the first
/// call, and calls made before it is open wait in order.
///
/// ```no_run
/// use pawbridge_mongodb::{PetDatabase, Props, QueryOptions, StoreConfig};
///
/// # async fn run() -> pawbridge_mongodb::Result<()> {
/// let db = PetDatabase::mongodb(StoreConfig::from_env());
/// let saved = db
///     .save_animal(Props::new().with("species", "dog").with("petName", "Rex"), QueryOptions::default())
///     .await?;
/// println!("{}", saved["petId"]["val"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PetDatabase {
    manager: ConnectionManager,
}

impl PetDatabase {
    /// Load the schema file named by `config` and connect through `connector`
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>) -> Self {
        let schemas = SchemaStore::load(&config.schema_path);
        Self::with_schemas(config, schemas, connector)
    }

    /// Connect to MongoDB with the identity and pool settings in `config`
    pub fn mongodb(config: StoreConfig) -> Self {
        let connector = Arc::new(MongoConnector::new(config.pool.clone()));
        Self::new(config, connector)
    }

    /// Use already loaded schemas
    pub fn with_schemas(config: StoreConfig, schemas: SchemaStore, connector: Arc<dyn Connector>) -> Self {
        tracing::debug!(species = schemas.len(), environment = ?config.environment, "Creating pet database handle");
        let context = Arc::new(StoreContext::new(config, schemas));
        Self {
            manager: ConnectionManager::new(connector, context),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Current model of `species`, once the connection has opened
    pub fn current_model(&self, species: &str) -> Option<SpeciesModel> {
        self.manager.context().current_model(species)
    }

    pub fn schemas(&self) -> &SchemaStore {
        self.manager.context().schemas()
    }

    /// Queue `operation` and wait for its result
    async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Session) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |session: Result<Session>| {
            async move {
                let result = match session {
                    Ok(session) => operation(session).await,
                    Err(e) => Err(e),
                };
                let _ = tx.send(result);
            }
            .boxed()
        });
        self.manager.execute(job);

        rx.await
            .map_err(|_| PetDataError::Internal("Operation ended without a result".to_string()))?
    }

    /// Resolves once the connection is open and models are loaded
    pub async fn ready(&self) -> Result<()> {
        self.run(|_| async { Ok(()) }).await
    }

    /// All records matching `props`
    pub async fn find_animals(&self, props: Props, options: QueryOptions) -> Result<Vec<FormattedRecord>> {
        self.run(move |session| async move { AnimalRepository::new(session).find(&props, options).await })
            .await
    }

    /// First record matching `props`; empty when nothing matches
    pub async fn find_animal(&self, props: Props, options: QueryOptions) -> Result<FormattedRecord> {
        self.run(move |session| async move { AnimalRepository::new(session).find_one(&props, options).await })
            .await
    }

    /// Create or update a record
    pub async fn save_animal(&self, props: Props, options: QueryOptions) -> Result<FormattedRecord> {
        self.run(move |session| async move { AnimalRepository::new(session).save(&props, options).await })
            .await
    }

    /// Delete matching records; see [`RemoveOutcome`] for the reported outcome
    pub async fn remove_animal(&self, props: Props, options: QueryOptions) -> Result<RemoveOutcome> {
        self.run(move |session| async move { AnimalRepository::new(session).remove(&props, options).await })
            .await
    }

    /// Latest model of a species
    pub async fn find_model(&self, props: Props, options: QueryOptions) -> Result<SpeciesModel> {
        self.run(move |session| async move { ModelRepository::new(session).find(&props, options).await })
            .await
    }

    /// Store a new model version for a species
    pub async fn save_model(&self, props: Props, options: QueryOptions) -> Result<SpeciesModel> {
        self.run(move |session| async move { ModelRepository::new(session).save(&props, options).await })
            .await
    }
}
