//! In-memory store backend for unit tests
//!
//! Records call shapes (batch sizes, filters, upsert flags) so tests can
//! assert windowing and call counts without a live MongoDB. Filter matching
//! covers the subset the gateway emits: top-level equality and `$in` on an
//! identifier set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{Bson, Document};
use tokio::sync::Mutex;

use crate::db::backend::{Backend, UpdateSummary};
use crate::types::{GatehouseError, Result};

#[derive(Default)]
pub(crate) struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<Document>>>,
    /// (collection, batch size) per insert_many call
    pub insert_calls: Mutex<Vec<(String, usize)>>,
    /// Filter per find/all_ids call
    pub find_calls: Mutex<Vec<Document>>,
    /// (collection, upsert flag) per update_one call
    pub update_calls: Mutex<Vec<(String, bool)>>,
    pub dropped: Mutex<Vec<String>>,
    /// (collection, keys, unique) per create_index call
    pub indexes: Mutex<Vec<(String, Document, bool)>>,
    /// When set, insert calls fail with a storage error
    pub fail_inserts: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn docs(&self, collection: &str) -> Vec<Document> {
        self.data
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn ids(&self, collection: &str) -> Vec<String> {
        self.docs(collection)
            .await
            .iter()
            .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
            .collect()
    }

    fn check_fail(&self) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(GatehouseError::Storage(
                "insert rejected by test backend".into(),
            ));
        }
        Ok(())
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| match expected {
        Bson::Document(spec) if spec.contains_key("$in") => match spec.get_array("$in") {
            Ok(candidates) => doc
                .get(key)
                .map(|value| candidates.contains(value))
                .unwrap_or(false),
            Err(_) => false,
        },
        other => doc.get(key) == Some(other),
    })
}

fn apply_projection(doc: &Document, projection: &Document) -> Document {
    let mut out = Document::new();
    for (key, _) in projection.iter() {
        if let Some(value) = doc.get(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()> {
        self.check_fail()?;
        let mut data = self.data.lock().await;
        let docs = data.entry(collection.to_string()).or_default();

        if let Some(id) = doc.get("_id") {
            if docs.iter().any(|d| d.get("_id") == Some(id)) {
                return Err(GatehouseError::Duplicate(format!("duplicate key: {id}")));
            }
        }
        docs.push(doc);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, batch: Vec<Document>) -> Result<()> {
        self.check_fail()?;
        self.insert_calls
            .lock()
            .await
            .push((collection.to_string(), batch.len()));

        let mut data = self.data.lock().await;
        data.entry(collection.to_string()).or_default().extend(batch);
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        self.find_calls.lock().await.push(filter.clone());

        let data = self.data.lock().await;
        let mut out: Vec<Document> = data
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches_filter(d, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(projection) = projection {
            out = out.iter().map(|d| apply_projection(d, &projection)).collect();
        }
        if let Some(limit) = limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        let mut found = self.find(collection, filter, None, Some(1)).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateSummary> {
        self.update_calls
            .lock()
            .await
            .push((collection.to_string(), upsert));

        let mut data = self.data.lock().await;
        let docs = data.entry(collection.to_string()).or_default();
        let set = update.get_document("$set").cloned().unwrap_or_default();

        if let Some(doc) = docs.iter_mut().find(|d| matches_filter(d, &filter)) {
            for (key, value) in set {
                doc.insert(key, value);
            }
            Ok(UpdateSummary {
                matched: 1,
                modified: 1,
                upserted: false,
            })
        } else if upsert {
            let mut doc = Document::new();
            if let Ok(id) = filter.get_str("_id") {
                doc.insert("_id", id);
            }
            for (key, value) in set {
                doc.insert(key, value);
            }
            docs.push(doc);
            Ok(UpdateSummary {
                matched: 0,
                modified: 0,
                upserted: true,
            })
        } else {
            Ok(UpdateSummary::default())
        }
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        let mut data = self.data.lock().await;
        let docs = data.entry(collection.to_string()).or_default();
        let before = docs.len();
        if let Some(position) = docs.iter().position(|d| matches_filter(d, &filter)) {
            docs.remove(position);
        }
        Ok((before - docs.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        let data = self.data.lock().await;
        Ok(data
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches_filter(d, &filter)).count())
            .unwrap_or(0) as u64)
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.dropped.lock().await.push(collection.to_string());
        self.data.lock().await.remove(collection);
        Ok(())
    }

    async fn create_index(&self, collection: &str, keys: Document, unique: bool) -> Result<()> {
        self.indexes
            .lock()
            .await
            .push((collection.to_string(), keys, unique));
        Ok(())
    }

    async fn all_ids(&self, collection: &str, filter: Document) -> Result<Vec<String>> {
        let docs = self
            .find(collection, filter, Some(bson::doc! { "_id": 1 }), None)
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
            .collect())
    }
}
