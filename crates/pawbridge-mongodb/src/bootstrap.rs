//! Loading the current model of every species when a session opens

use crate::model::{ModelRegistry, SpeciesModel, TIMESTAMP_FIELD};
use crate::session::StoreContext;
use crate::store::RecordStore;
use crate::Result;
use pawbridge_common::PetDataError;

/// Where the current model of a species came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    /// Latest stored document
    Stored,
    /// Local models file, written back to storage as a new version
    Seeded,
}

/// Resolve the current model of `species`.
///
/// The latest stored version wins unless there is none, the lookup fails, the stored
/// document cannot be read as a model, or `force_local` is set. In those cases the model
/// is taken from `local`, stamped, and stored as a new version. Missing local data or a failed insert is a
/// [`PetDataError::Bootstrap`].
pub async fn load_current_model(
    store: &dyn RecordStore,
    context: &StoreContext,
    species: &str,
    local: &ModelRegistry,
    force_local: bool,
) -> Result<(SpeciesModel, ModelSource)> {
    let collection = context.collection_names().model(species)?;

    if !force_local {
        match store.find_latest(collection.as_str(), TIMESTAMP_FIELD).await {
            Ok(Some(document)) => match SpeciesModel::from_document(&document) {
                Ok(model) => {
                    tracing::debug!(species = %species, collection = %collection, "Using stored model");
                    return Ok((model, ModelSource::Stored));
                }
                Err(e) => {
                    tracing::warn!(species = %species, collection = %collection, error = %e, "Stored model unreadable, seeding from local data");
                }
            },
            Ok(None) => {
                tracing::info!(species = %species, collection = %collection, "No stored model, seeding from local data");
            }
            Err(e) => {
                tracing::warn!(species = %species, collection = %collection, error = %e, "Model lookup failed, seeding from local data");
            }
        }
    }

    let model = local.get(species).cloned().ok_or_else(|| {
        PetDataError::Bootstrap(format!("No local model available for species '{}'", species))
    })?;

    store
        .insert(collection.as_str(), model.to_document(bson::DateTime::now()))
        .await
        .map_err(|e| {
            PetDataError::Bootstrap(format!("Could not store seeded model for '{}': {}", species, e))
        })?;

    tracing::info!(species = %species, fields = model.len(), "Seeded model from local data");
    Ok((model, ModelSource::Seeded))
}

/// Load the current model of every configured species, one species at a time in name
/// order, then mirror them to the local cache.
pub async fn bootstrap_models(store: &dyn RecordStore, context: &StoreContext) -> Result<()> {
    let local = context.cache().load().await;
    let force_local = context.config().force_local_models;
    let species: Vec<String> = context.schemas().species().map(str::to_string).collect();

    for name in &species {
        let (model, source) = load_current_model(store, context, name, &local, force_local).await?;
        tracing::debug!(species = %name, source = ?source, "Model ready");
        context.set_current_model(name, model);
    }

    context.cache().persist(&context.models()).await;
    tracing::info!(species = species.len(), "Model bootstrap complete");
    Ok(())
}
