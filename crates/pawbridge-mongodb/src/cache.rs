//! Local mirror of the current models

use crate::model::ModelRegistry;
use crate::Result;
use std::path::{Path, PathBuf};

/// JSON file holding the last known model of every species.
///
/// Reads and writes are best-effort: failures are logged and never surface to callers.
#[derive(Debug, Clone)]
pub struct ModelCache {
    path: PathBuf,
}

impl ModelCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached models; an unreadable file yields an empty registry
    pub async fn load(&self) -> ModelRegistry {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not read models cache");
                return ModelRegistry::default();
            }
        };
        match ModelRegistry::from_json(&raw) {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring malformed models cache");
                ModelRegistry::default()
            }
        }
    }

    /// Overwrite the cache with `models`
    pub async fn write(&self, models: &ModelRegistry) -> Result<()> {
        let raw = serde_json::to_string_pretty(models)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    /// [`ModelCache::write`], logging instead of failing
    pub async fn persist(&self, models: &ModelRegistry) {
        match self.write(models).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), species = models.len(), "Models cache written")
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Could not write models cache")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, SpeciesModel};
    use crate::schema::ValueType;

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path().join("data").join("models.json"));

        let mut dog = SpeciesModel::default();
        dog.insert("petName", FieldMeta::labelled("Name", ValueType::String));
        let mut models = ModelRegistry::default();
        models.set("dog", dog);

        cache.write(&models).await.unwrap();
        assert_eq!(cache.load().await, models);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path().join("absent.json"));
        assert!(cache.load().await.is_empty());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(ModelCache::new(path).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_swallows_errors() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be overwritten as a file
        let cache = ModelCache::new(dir.path());
        cache.persist(&ModelRegistry::default()).await;
        assert!(cache.write(&ModelRegistry::default()).await.is_err());
    }
}
