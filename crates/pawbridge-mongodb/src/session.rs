//! State shared by every operation of one database handle

use crate::cache::ModelCache;
use crate::config::{CollectionNames, StoreConfig};
use crate::model::{ModelRegistry, SpeciesModel};
use crate::schema::SchemaStore;
use crate::store::RecordStore;
use parking_lot::RwLock;
use std::sync::Arc;

/// Configuration, schemas and the current models
pub struct StoreContext {
    config: StoreConfig,
    schemas: SchemaStore,
    models: RwLock<ModelRegistry>,
    cache: ModelCache,
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("environment", &self.config.environment)
            .field("species", &self.schemas.species().collect::<Vec<_>>())
            .field("models", &self.models.read().len())
            .field("cache", &self.cache.path())
            .finish()
    }
}

impl StoreContext {
    pub fn new(config: StoreConfig, schemas: SchemaStore) -> Self {
        let cache = ModelCache::new(config.models_path.clone());
        Self {
            config,
            schemas,
            models: RwLock::new(ModelRegistry::default()),
            cache,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schemas(&self) -> &SchemaStore {
        &self.schemas
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn collection_names(&self) -> CollectionNames {
        self.config.collection_names()
    }

    /// Copy of the current models
    pub fn models(&self) -> ModelRegistry {
        self.models.read().clone()
    }

    pub fn current_model(&self, species: &str) -> Option<SpeciesModel> {
        self.models.read().get(species).cloned()
    }

    /// Replace the current model of `species`
    pub fn set_current_model(&self, species: &str, model: SpeciesModel) {
        self.models.write().set(species, model);
    }

    /// Run `f` with the current models borrowed
    pub fn with_models<R>(&self, f: impl FnOnce(&ModelRegistry) -> R) -> R {
        f(&self.models.read())
    }
}

/// What a queued operation runs against once the connection is open
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn RecordStore>,
    context: Arc<StoreContext>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(store: Arc<dyn RecordStore>, context: Arc<StoreContext>) -> Self {
        Self { store, context }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn context(&self) -> &StoreContext {
        &self.context
    }
}
