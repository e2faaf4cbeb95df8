//! In-process storage backend
//!
//! Evaluates the filters this crate builds (equality and regular expressions), honors
//! sort and limit, and counts every storage call so callers can assert that an operation
//! never reached storage.

use crate::query::FindQuery;
use crate::store::{Connector, RecordStore};
use crate::Result;
use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use parking_lot::Mutex;
use pawbridge_common::PetDataError;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Notify;

/// [`RecordStore`] kept in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<BsonDocument>>>,
    calls: AtomicUsize,
    fail_finds: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storage calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Make every `find`/`find_one` fail until switched back
    pub fn set_fail_finds(&self, fail: bool) {
        self.fail_finds.store(fail, AtomicOrdering::SeqCst);
    }

    /// Snapshot of a collection in insertion order
    pub fn documents(&self, collection: &str) -> Vec<BsonDocument> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Add a document without counting a call
    pub fn seed(&self, collection: &str, mut document: BsonDocument) {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Drop a whole collection without counting a call
    pub fn clear(&self, collection: &str) {
        self.collections.lock().remove(collection);
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn check_finds(&self) -> Result<()> {
        if self.fail_finds.load(AtomicOrdering::SeqCst) {
            return Err(PetDataError::Database("Simulated find failure".to_string()));
        }
        Ok(())
    }
}

fn regex_matches(pattern: &bson::Regex, value: Option<&Bson>) -> bool {
    let Some(Bson::String(text)) = value else {
        return false;
    };
    let source = if pattern.options.contains('i') {
        format!("(?i){}", pattern.pattern)
    } else {
        pattern.pattern.clone()
    };
    Regex::new(&source).map(|re| re.is_match(text)).unwrap_or(false)
}

/// True when `document` satisfies every condition of `filter`
pub fn matches_filter(document: &BsonDocument, filter: &BsonDocument) -> bool {
    filter.iter().all(|(key, condition)| match condition {
        Bson::RegularExpression(pattern) => regex_matches(pattern, document.get(key)),
        expected => document.get(key) == Some(expected),
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(d) => Some(*d),
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(Bson::DateTime(x)), Some(Bson::DateTime(y))) => x.cmp(y),
        (Some(Bson::String(x)), Some(Bson::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => match (as_f64(x), as_f64(y)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn direction(value: &Bson) -> Ordering {
    match as_f64(value) {
        Some(d) if d < 0.0 => Ordering::Less,
        _ => Ordering::Greater,
    }
}

/// Sort by every key of `sort`; ties fall back to insertion order in the first key's direction
fn sort_documents(documents: Vec<BsonDocument>, sort: &BsonDocument) -> Vec<BsonDocument> {
    let descending_ties = sort
        .iter()
        .next()
        .map(|(_, d)| direction(d) == Ordering::Less)
        .unwrap_or(false);

    let mut indexed: Vec<(usize, BsonDocument)> = documents.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| {
        for (key, dir) in sort {
            let ord = compare_values(a.get(key), b.get(key));
            let ord = if direction(dir) == Ordering::Less { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        if descending_ties {
            ib.cmp(ia)
        } else {
            ia.cmp(ib)
        }
    });
    indexed.into_iter().map(|(_, doc)| doc).collect()
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find(&self, query: FindQuery) -> Result<Vec<BsonDocument>> {
        self.record_call();
        self.check_finds()?;

        let mut found: Vec<BsonDocument> = self
            .documents(query.collection_name())
            .into_iter()
            .filter(|doc| matches_filter(doc, query.get_filter()))
            .collect();
        if let Some(sort) = query.get_sort() {
            found = sort_documents(found, sort);
        }
        let skip = query.get_skip().unwrap_or(0) as usize;
        let found = found.into_iter().skip(skip);
        Ok(match query.get_limit() {
            Some(limit) if limit > 0 => found.take(limit as usize).collect(),
            _ => found.collect(),
        })
    }

    async fn find_one(&self, collection: &str, filter: BsonDocument) -> Result<Option<BsonDocument>> {
        self.record_call();
        self.check_finds()?;
        Ok(self
            .documents(collection)
            .into_iter()
            .find(|doc| matches_filter(doc, &filter)))
    }

    async fn upsert_returning(
        &self,
        collection: &str,
        filter: BsonDocument,
        update: BsonDocument,
    ) -> Result<BsonDocument> {
        self.record_call();
        let mut collections = self.collections.lock();
        let documents = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = documents.iter_mut().find(|doc| matches_filter(doc, &filter)) {
            for (key, value) in update {
                existing.insert(key, value);
            }
            return Ok(existing.clone());
        }

        let mut created = BsonDocument::new();
        created.insert("_id", filter.get("_id").cloned().unwrap_or_else(|| ObjectId::new().into()));
        for (key, value) in &filter {
            if key != "_id" && !matches!(value, Bson::RegularExpression(_)) {
                created.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in update {
            created.insert(key, value);
        }
        documents.push(created.clone());
        Ok(created)
    }

    async fn insert(&self, collection: &str, mut document: BsonDocument) -> Result<Bson> {
        self.record_call();
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn delete_many(&self, collection: &str, filter: BsonDocument) -> Result<u64> {
        self.record_call();
        let mut collections = self.collections.lock();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|doc| !matches_filter(doc, &filter));
        Ok((before - documents.len()) as u64)
    }
}

/// [`Connector`] handing out a shared [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    gate: Option<Arc<Notify>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            gate: None,
            failures_left: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        }
    }

    /// Hold every connect attempt until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Fail the first `attempts` connects with a retryable error
    pub fn failing(self, attempts: u32) -> Self {
        self.failures_left.store(attempts, AtomicOrdering::SeqCst);
        self
    }

    /// Connect attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _uri: &str) -> Result<Arc<dyn RecordStore>> {
        self.attempts.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let failing = self
            .failures_left
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PetDataError::Connection("Simulated connect failure".to_string()));
        }
        Ok(self.store.clone())
    }
}
