//! Model bootstrap, lookup and versioning

mod common;

use common::{fixture, models_json, props, FixtureBuilder};
use pawbridge_mongodb::{
    ConnectionState, FieldMeta, MemoryStore, ModelRegistry, PetDataError, QueryOptions,
    SpeciesModel, ValueType,
};
use serde_json::json;
use std::sync::Arc;

fn local_model(species: &str) -> SpeciesModel {
    serde_json::from_value(models_json()[species].clone()).unwrap()
}

#[tokio::test]
async fn bootstrap_seeds_every_species_from_local_data() {
    let f = fixture();
    f.db.ready().await.unwrap();

    assert_eq!(f.db.state(), ConnectionState::Connected);
    assert_eq!(f.db.current_model("dog"), Some(local_model("dog")));
    assert_eq!(f.db.current_model("cat"), Some(local_model("cat")));

    for collection in ["pets_model_cat_test", "pets_model_dog_test"] {
        let stored = f.store.documents(collection);
        assert_eq!(stored.len(), 1);
        assert!(stored[0].get_datetime("timestamp").is_ok());
    }
}

#[tokio::test]
async fn bootstrap_prefers_stored_model() {
    let store = Arc::new(MemoryStore::new());
    let mut stored = local_model("dog");
    stored.insert("petName", FieldMeta::labelled("Stored name", ValueType::String));
    store.seed("pets_model_dog_test", stored.to_document(bson::DateTime::now()));

    let f = FixtureBuilder::default().store(store).build();
    f.db.ready().await.unwrap();

    assert_eq!(f.db.current_model("dog"), Some(stored));
    assert_eq!(f.store.documents("pets_model_dog_test").len(), 1);
}

#[tokio::test]
async fn unreadable_stored_model_falls_back_to_local() {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        "pets_model_dog_test",
        bson::doc! { "petName": { "fieldLabel": 42 }, "timestamp": bson::DateTime::now() },
    );

    let f = FixtureBuilder::default().store(store).build();
    f.db.ready().await.unwrap();

    assert_eq!(f.db.state(), ConnectionState::Connected);
    assert_eq!(f.db.current_model("dog"), Some(local_model("dog")));
    assert_eq!(f.store.documents("pets_model_dog_test").len(), 2);

    let found = f
        .db
        .find_model(props(json!({ "species": "dog" })), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(found, local_model("dog"));
}

#[tokio::test]
async fn unknown_val_type_survives_seed_and_cache() {
    let mut models = models_json();
    models["dog"]["photos"] = json!({ "fieldLabel": "Photos", "valType": "Hologram" });
    let f = FixtureBuilder::default().models(models).build();
    f.db.ready().await.unwrap();

    let stored = f.store.documents("pets_model_dog_test");
    assert_eq!(
        stored[0].get_document("photos").unwrap().get_str("valType").unwrap(),
        "Hologram"
    );

    let cached: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(f.models_path()).unwrap()).unwrap();
    assert_eq!(cached["dog"]["photos"]["valType"], json!("Hologram"));
}

#[tokio::test]
async fn force_local_reseeds_even_with_stored_model() {
    let store = Arc::new(MemoryStore::new());
    let mut stored = local_model("dog");
    stored.insert("petName", FieldMeta::labelled("Stored name", ValueType::String));
    store.seed("pets_model_dog_test", stored.to_document(bson::DateTime::now()));

    let f = FixtureBuilder::default().store(store).force_local().build();
    f.db.ready().await.unwrap();

    assert_eq!(f.db.current_model("dog"), Some(local_model("dog")));
    assert_eq!(f.store.documents("pets_model_dog_test").len(), 2);
}

#[tokio::test]
async fn bootstrap_without_local_model_is_fatal() {
    let f = FixtureBuilder::default()
        .models(json!({ "dog": models_json()["dog"].clone() }))
        .build();

    let err = f.db.ready().await.unwrap_err();
    assert!(matches!(err, PetDataError::Bootstrap(_)));
    assert_eq!(f.db.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn bootstrap_mirrors_models_to_cache() {
    let f = fixture();
    f.db.ready().await.unwrap();

    let cached = ModelRegistry::from_json(&std::fs::read_to_string(f.models_path()).unwrap()).unwrap();
    assert_eq!(cached.get("cat"), Some(&local_model("cat")));
    assert_eq!(cached.get("dog"), Some(&local_model("dog")));
}

#[tokio::test]
async fn find_model_falls_back_to_local_cache() {
    let f = fixture();
    f.db.ready().await.unwrap();
    f.store.clear("pets_model_cat_test");

    let model = f
        .db
        .find_model(props(json!({ "species": "cat" })), QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(model, local_model("cat"));
    assert_eq!(f.db.current_model("cat"), Some(model.clone()));

    let stored = f.store.documents("pets_model_cat_test");
    assert_eq!(stored.len(), 1);
    assert!(stored[0].get_datetime("timestamp").is_ok());
    assert_eq!(SpeciesModel::from_document(&stored[0]).unwrap(), model);
}

#[tokio::test]
async fn find_model_returns_latest_stored_version() {
    let f = fixture();
    f.db.ready().await.unwrap();

    let mut newer = local_model("cat");
    newer.insert("age", FieldMeta::labelled("Age (years)", ValueType::Number));
    f.store.seed(
        "pets_model_cat_test",
        newer.to_document(bson::DateTime::from_millis(bson::DateTime::now().timestamp_millis() + 60_000)),
    );

    let model = f
        .db
        .find_model(props(json!({ "species": { "val": "cat" } })), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(model, newer);
    assert_eq!(f.store.documents("pets_model_cat_test").len(), 2);
}

#[tokio::test]
async fn save_model_then_find_model_round_trips() {
    let f = fixture();

    let saved = f
        .db
        .save_model(
            props(json!({
                "species": { "val": "dog", "fieldLabel": "Species" },
                "petName": { "val": "ignored", "fieldLabel": "Pet name", "example": "Fido" },
                "microchip": { "fieldLabel": "not a model field" }
            })),
            QueryOptions::default(),
        )
        .await
        .unwrap();

    let name = saved.field("petName").unwrap();
    assert_eq!(name.field_label.as_deref(), Some("Pet name"));
    assert_eq!(name.example, Some(json!("Fido")));
    assert_eq!(name.required, Some(true));
    assert!(saved.field("microchip").is_none());

    let found = f
        .db
        .find_model(props(json!({ "species": { "defaultVal": "dog" } })), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(found, saved);
    assert_eq!(f.db.current_model("dog"), Some(saved.clone()));
    assert_eq!(f.store.documents("pets_model_dog_test").len(), 2);

    let cached = ModelRegistry::from_json(&std::fs::read_to_string(f.models_path()).unwrap()).unwrap();
    assert_eq!(cached.get("dog"), Some(&saved));
}

#[tokio::test]
async fn saved_model_shapes_later_reads() {
    let f = fixture();
    f.db.save_model(
        props(json!({ "species": "cat", "petName": { "fieldLabel": "Cat name" } })),
        QueryOptions::default(),
    )
    .await
    .unwrap();

    let record = f
        .db
        .save_animal(props(json!({ "species": "cat", "petName": "Tom" })), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(record["petName"]["fieldLabel"], json!("Cat name"));
    assert_eq!(record["petName"]["val"], json!("Tom"));
}
