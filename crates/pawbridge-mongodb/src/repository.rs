//! Record and model operations, run against an open [`Session`]

use crate::bootstrap::{load_current_model, ModelSource};
use crate::format::{FormattedRecord, OutputFormatter};
use crate::model::SpeciesModel;
use crate::options::{DebugLevel, QueryOptions};
use crate::query::{removal_filter, FindQuery, QueryBuilder};
use crate::sanitize::InputSanitizer;
use crate::session::Session;
use crate::species::{Props, SpeciesResolver};
use crate::Result;
use bson::Document as BsonDocument;
use pawbridge_common::PetDataError;
use serde::Serialize;

/// Result of a remove.
///
/// Nothing deleted reports `success`, anything deleted reports `failure`. Existing clients
/// depend on this mapping, so it is kept as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoveOutcome {
    Success,
    Failure,
}

impl RemoveOutcome {
    pub fn from_deleted_count(deleted: u64) -> Self {
        if deleted == 0 {
            RemoveOutcome::Success
        } else {
            RemoveOutcome::Failure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoveOutcome::Success => "success",
            RemoveOutcome::Failure => "failure",
        }
    }
}

impl std::fmt::Display for RemoveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn log_filter(options: &QueryOptions, operation: &str, species: &str, filter: &BsonDocument) {
    if options.debug.at_least(DebugLevel::High) {
        tracing::debug!(operation, species = %species, filter = %filter, "Built filter");
    } else if options.debug.at_least(DebugLevel::Low) {
        tracing::debug!(operation, species = %species, "Running operation");
    }
}

fn log_storage_error(operation: &str, species: &str, e: PetDataError) -> PetDataError {
    tracing::error!(operation, species = %species, error = %e, "Storage call failed");
    e
}

/// Operations on animal records
pub struct AnimalRepository {
    session: Session,
}

impl AnimalRepository {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    fn resolve(&self, props: &Props) -> Option<String> {
        let context = self.session.context();
        context.with_models(|models| {
            SpeciesResolver::new(context.schemas(), models).resolve_from_query(props)
        })
    }

    fn format(&self, species: &str, record: &BsonDocument, options: &QueryOptions) -> FormattedRecord {
        self.session
            .context()
            .with_models(|models| OutputFormatter::new(models).format(species, record, options.shape))
    }

    fn records_collection(&self) -> &'static str {
        self.session.context().collection_names().records()
    }

    /// Every record matching `props`
    pub async fn find(&self, props: &Props, options: QueryOptions) -> Result<Vec<FormattedRecord>> {
        let query = QueryBuilder::new(self.session.context().schemas())
            .build(self.resolve(props).as_deref(), props);
        let species = query.species().ok_or(PetDataError::Species)?.to_string();
        log_filter(&options, "find_animals", &species, query.filter());

        let found = self
            .session
            .store()
            .find(FindQuery::new(self.records_collection()).filter(query.into_filter()))
            .await
            .map_err(|e| log_storage_error("find_animals", &species, e))?;

        if options.debug.at_least(DebugLevel::Med) {
            tracing::debug!(species = %species, count = found.len(), "Found records");
        }
        Ok(found
            .iter()
            .map(|record| self.format(&species, record, &options))
            .collect())
    }

    /// First record matching `props`, or an empty record
    pub async fn find_one(&self, props: &Props, options: QueryOptions) -> Result<FormattedRecord> {
        let query = QueryBuilder::new(self.session.context().schemas())
            .build(self.resolve(props).as_deref(), props);
        let species = query.species().ok_or(PetDataError::Species)?.to_string();
        log_filter(&options, "find_animal", &species, query.filter());

        let found = self
            .session
            .store()
            .find_one(self.records_collection(), query.into_filter())
            .await
            .map_err(|e| log_storage_error("find_animal", &species, e))?;

        Ok(found
            .map(|record| self.format(&species, &record, &options))
            .unwrap_or_default())
    }

    /// Create or update the record matching `props` and return it as stored
    pub async fn save(&self, props: &Props, options: QueryOptions) -> Result<FormattedRecord> {
        let context = self.session.context();
        let query = QueryBuilder::new(context.schemas()).build(self.resolve(props).as_deref(), props);
        let species = query.species().ok_or(PetDataError::Species)?.to_string();

        let update = InputSanitizer::new(context.schemas()).sanitize(&species, props);
        log_filter(&options, "save_animal", &species, query.filter());
        if options.debug.at_least(DebugLevel::Tmi) {
            tracing::debug!(species = %species, update = %update, "Sanitized update");
        }

        let saved = self
            .session
            .store()
            .upsert_returning(self.records_collection(), query.into_filter(), update)
            .await
            .map_err(|e| log_storage_error("save_animal", &species, e))?;

        Ok(self.format(&species, &saved, &options))
    }

    /// Delete the records matching `props`
    pub async fn remove(&self, props: &Props, options: QueryOptions) -> Result<RemoveOutcome> {
        let species = self.resolve(props).ok_or(PetDataError::Species)?;
        let filter = removal_filter(&species, props)?;
        log_filter(&options, "remove_animal", &species, &filter);

        let deleted = self
            .session
            .store()
            .delete_many(self.records_collection(), filter)
            .await
            .map_err(|e| log_storage_error("remove_animal", &species, e))?;

        let outcome = RemoveOutcome::from_deleted_count(deleted);
        if options.debug.at_least(DebugLevel::Low) {
            tracing::debug!(species = %species, deleted, outcome = %outcome, "Removed records");
        }
        Ok(outcome)
    }
}

/// Operations on species models
pub struct ModelRepository {
    session: Session,
}

impl ModelRepository {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    fn resolve(&self, props: &Props) -> Result<String> {
        let context = self.session.context();
        context
            .with_models(|models| {
                SpeciesResolver::new(context.schemas(), models).resolve_from_model_input(props)
            })
            .ok_or(PetDataError::Species)
    }

    /// Latest stored model of the species in `props`, seeding one from local data when
    /// storage has none
    pub async fn find(&self, props: &Props, options: QueryOptions) -> Result<SpeciesModel> {
        let context = self.session.context();
        let species = self.resolve(props)?;

        let mut local = context.cache().load().await;
        if !local.contains(&species) {
            if let Some(current) = context.current_model(&species) {
                local.set(species.clone(), current);
            }
        }

        let (model, source) =
            load_current_model(self.session.store(), context, &species, &local, false).await?;
        context.set_current_model(&species, model.clone());
        if source == ModelSource::Seeded {
            context.cache().persist(&context.models()).await;
        }

        if options.debug.at_least(DebugLevel::Low) {
            tracing::debug!(species = %species, source = ?source, fields = model.len(), "Found model");
        }
        Ok(model)
    }

    /// Store a new version of the species model with the metadata in `props` merged in.
    ///
    /// The in-memory model and the cache only change once the insert succeeded.
    pub async fn save(&self, props: &Props, options: QueryOptions) -> Result<SpeciesModel> {
        let context = self.session.context();
        let species = self.resolve(props)?;
        let current = context.current_model(&species).ok_or(PetDataError::Species)?;
        let merged = current.merged_with(props)?;
        let collection = context.collection_names().model(&species)?;

        self.session
            .store()
            .insert(collection.as_str(), merged.to_document(bson::DateTime::now()))
            .await
            .map_err(|e| log_storage_error("save_model", &species, e))?;

        context.set_current_model(&species, merged.clone());
        context.cache().persist(&context.models()).await;

        if options.debug.at_least(DebugLevel::Low) {
            tracing::debug!(species = %species, collection = %collection, "Saved model");
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_outcome_mapping() {
        assert_eq!(RemoveOutcome::from_deleted_count(0), RemoveOutcome::Success);
        assert_eq!(RemoveOutcome::from_deleted_count(1), RemoveOutcome::Failure);
        assert_eq!(RemoveOutcome::from_deleted_count(17), RemoveOutcome::Failure);
    }

    #[test]
    fn test_remove_outcome_wire_form() {
        assert_eq!(RemoveOutcome::Success.to_string(), "success");
        assert_eq!(
            serde_json::to_value(RemoveOutcome::Failure).unwrap(),
            serde_json::json!("failure")
        );
    }
}
