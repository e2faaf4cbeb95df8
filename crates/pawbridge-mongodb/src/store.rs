//! Storage seam
//!
//! Repositories talk to storage only through [`RecordStore`]; a [`Connector`] opens one.
//! [`MongoStore`] is the production backend, [`crate::memory::MemoryStore`] the in-process one.

use crate::connection::Connection;
use crate::query::FindQuery;
use crate::Result;
use async_trait::async_trait;
use bson::{doc, Bson, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use pawbridge_common::PetDataError;
use std::sync::Arc;

/// Document storage addressed by collection name
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// All documents matching the query, honoring its sort, skip and limit
    async fn find(&self, query: FindQuery) -> Result<Vec<BsonDocument>>;

    /// First document matching `filter`
    async fn find_one(&self, collection: &str, filter: BsonDocument) -> Result<Option<BsonDocument>>;

    /// Document with the greatest value of `field`
    async fn find_latest(&self, collection: &str, field: &str) -> Result<Option<BsonDocument>> {
        let docs = self.find(FindQuery::latest(collection, field)).await?;
        Ok(docs.into_iter().next())
    }

    /// `$set` `update` on the first match of `filter`, inserting when nothing matches,
    /// and return the document as it is after the write
    async fn upsert_returning(
        &self,
        collection: &str,
        filter: BsonDocument,
        update: BsonDocument,
    ) -> Result<BsonDocument>;

    /// Insert a document and return its `_id`
    async fn insert(&self, collection: &str, document: BsonDocument) -> Result<Bson>;

    /// Delete every match of `filter`; returns the number deleted
    async fn delete_many(&self, collection: &str, filter: BsonDocument) -> Result<u64>;
}

/// Opens a [`RecordStore`] from a connection URI
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn RecordStore>>;
}

fn database_error(e: mongodb::error::Error) -> PetDataError {
    PetDataError::Database(e.to_string())
}

/// [`RecordStore`] over the official MongoDB driver
pub struct MongoStore {
    connection: Connection,
}

impl MongoStore {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn find(&self, query: FindQuery) -> Result<Vec<BsonDocument>> {
        let collection = self.connection.get_collection(query.collection_name());

        let mut action = collection.find(query.get_filter().clone());
        if let Some(sort) = query.get_sort() {
            action = action.sort(sort.clone());
        }
        if let Some(skip) = query.get_skip() {
            action = action.skip(skip);
        }
        if let Some(limit) = query.get_limit() {
            action = action.limit(limit);
        }

        let cursor = action.await.map_err(database_error)?;
        cursor.try_collect().await.map_err(database_error)
    }

    async fn find_one(&self, collection: &str, filter: BsonDocument) -> Result<Option<BsonDocument>> {
        self.connection
            .get_collection(collection)
            .find_one(filter)
            .await
            .map_err(database_error)
    }

    async fn upsert_returning(
        &self,
        collection: &str,
        filter: BsonDocument,
        update: BsonDocument,
    ) -> Result<BsonDocument> {
        self.connection
            .get_collection(collection)
            .find_one_and_update(filter, doc! { "$set": update })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(database_error)?
            .ok_or_else(|| PetDataError::Database("Upsert returned no document".to_string()))
    }

    async fn insert(&self, collection: &str, document: BsonDocument) -> Result<Bson> {
        let result = self
            .connection
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(database_error)?;
        Ok(result.inserted_id)
    }

    async fn delete_many(&self, collection: &str, filter: BsonDocument) -> Result<u64> {
        let result = self
            .connection
            .get_collection(collection)
            .delete_many(filter)
            .await
            .map_err(database_error)?;
        Ok(result.deleted_count)
    }
}
