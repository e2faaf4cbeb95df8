//! Shared fixtures: a two-species schema, matching local models, and an in-memory store

#![allow(dead_code)]

use pawbridge_mongodb::{
    Environment, MemoryConnector, MemoryStore, PetDatabase, RetryPolicy, StoreConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub fn schema_json() -> Value {
    json!({
        "dog": {
            "species": { "valType": "String" },
            "petName": { "valType": "String" },
            "color": { "valType": "String" },
            "weight": { "valType": "Float" },
            "intakeDate": { "valType": "Date" }
        },
        "cat": {
            "species": { "valType": "String" },
            "petName": { "valType": "String" },
            "age": { "valType": "Number" }
        }
    })
}

pub fn models_json() -> Value {
    json!({
        "dog": {
            "petId": { "fieldLabel": "Pet ID", "valType": "String" },
            "species": { "fieldLabel": "Species", "defaultVal": "dog", "valType": "String" },
            "petName": { "fieldLabel": "Name", "example": "Rex", "valType": "String", "required": true },
            "color": { "fieldLabel": "Color", "valType": "String" },
            "weight": { "fieldLabel": "Weight (lbs)", "valType": "Float" },
            "intakeDate": { "fieldLabel": "Intake date", "valType": "Date" }
        },
        "cat": {
            "petId": { "fieldLabel": "Pet ID", "valType": "String" },
            "species": { "fieldLabel": "Species", "defaultVal": "cat", "valType": "String" },
            "petName": { "fieldLabel": "Name", "valType": "String" },
            "age": { "fieldLabel": "Age", "valType": "Number" }
        }
    })
}

pub struct Fixture {
    pub db: PetDatabase,
    pub store: Arc<MemoryStore>,
    pub connector: Arc<MemoryConnector>,
    pub dir: TempDir,
}

impl Fixture {
    pub fn models_path(&self) -> std::path::PathBuf {
        self.dir.path().join("data").join("models.json")
    }
}

pub struct FixtureBuilder {
    models: Value,
    gate: Option<Arc<Notify>>,
    failures: u32,
    retry: RetryPolicy,
    force_local: bool,
    store: Arc<MemoryStore>,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            models: models_json(),
            gate: None,
            failures: 0,
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            force_local: false,
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl FixtureBuilder {
    pub fn models(mut self, models: Value) -> Self {
        self.models = models;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing(mut self, failures: u32, retry: RetryPolicy) -> Self {
        self.failures = failures;
        self.retry = retry;
        self
    }

    pub fn force_local(mut self) -> Self {
        self.force_local = true;
        self
    }

    pub fn store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> Fixture {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("schema.json"), schema_json().to_string()).unwrap();
        std::fs::write(data.join("models.json"), self.models.to_string()).unwrap();

        let config = StoreConfig {
            environment: Environment::Development,
            schema_path: data.join("schema.json"),
            models_path: data.join("models.json"),
            force_local_models: self.force_local,
            retry: self.retry,
            ..StoreConfig::default()
        };

        let mut connector = MemoryConnector::new(self.store.clone()).failing(self.failures);
        if let Some(gate) = self.gate {
            connector = connector.gated(gate);
        }
        let connector = Arc::new(connector);
        let db = PetDatabase::new(config, connector.clone());

        Fixture {
            db,
            store: self.store,
            connector,
            dir,
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("pawbridge_mongodb=debug")
        .try_init();
}

pub fn fixture() -> Fixture {
    FixtureBuilder::default().build()
}

pub fn props(value: Value) -> pawbridge_mongodb::Props {
    pawbridge_mongodb::Props::from_json(value).unwrap()
}
