//! Store boundary trait and its MongoDB implementation
//!
//! The trait carries the raw per-collection operations the Gateway builds
//! on. Implementations are constructed from a pooled client handle; the
//! in-memory test backend lives in `db::testing`.

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};

use crate::types::{GatehouseError, Result};

/// Matched/modified counts from an update
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateSummary {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

/// Raw document-store operations, per named collection
#[async_trait]
pub trait Backend: Send + Sync {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()>;

    /// Unordered batch insert
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<()>;

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>>;

    /// Apply an update document (operator form) to the first match
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateSummary>;

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn count(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    async fn create_index(&self, collection: &str, keys: Document, unique: bool) -> Result<()>;

    /// Identifier-only projection of the matching documents
    async fn all_ids(&self, collection: &str, filter: Document) -> Result<Vec<String>>;
}

/// MongoDB-backed store bound to one client handle and database
#[derive(Clone)]
pub struct MongoBackend {
    client: Client,
    db_name: String,
}

impl MongoBackend {
    pub fn new(client: Client, db_name: impl Into<String>) -> Self {
        Self {
            client,
            db_name: db_name.into(),
        }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client
            .database(&self.db_name)
            .collection::<Document>(name)
    }
}

/// Server error code for a unique-key violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Extract the server message when an error is a duplicate-key violation
fn duplicate_reason(err: &mongodb::error::Error) -> Option<String> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY_CODE => {
            Some(we.message.clone())
        }
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.iter().find(|e| e.code == DUPLICATE_KEY_CODE))
            .map(|e| e.message.clone()),
        _ => None,
    }
}

#[async_trait]
impl Backend for MongoBackend {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()> {
        self.collection(collection)
            .insert_one(doc)
            .await
            .map_err(|e| match duplicate_reason(&e) {
                Some(reason) => GatehouseError::Duplicate(reason),
                None => GatehouseError::Storage(format!("insert failed: {e}")),
            })?;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.collection(collection)
            .insert_many(docs)
            .ordered(false)
            .await
            .map_err(|e| match duplicate_reason(&e) {
                Some(reason) => GatehouseError::Duplicate(reason),
                None => GatehouseError::Storage(format!("bulk insert failed: {e}")),
            })?;
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(collection);
        let mut find = coll.find(filter);
        if let Some(projection) = projection {
            find = find.projection(projection);
        }
        if let Some(limit) = limit {
            find = find.limit(limit);
        }

        let cursor = find
            .await
            .map_err(|e| GatehouseError::Storage(format!("find failed: {e}")))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| GatehouseError::Storage(format!("cursor read failed: {e}")))
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| GatehouseError::Storage(format!("find failed: {e}")))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateSummary> {
        let result = self
            .collection(collection)
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(|e| GatehouseError::Storage(format!("update failed: {e}")))?;

        Ok(UpdateSummary {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        let result = self
            .collection(collection)
            .delete_one(filter)
            .await
            .map_err(|e| GatehouseError::Storage(format!("delete failed: {e}")))?;
        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| GatehouseError::Storage(format!("count failed: {e}")))
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collection(collection)
            .drop()
            .await
            .map_err(|e| GatehouseError::Storage(format!("drop failed: {e}")))
    }

    async fn create_index(&self, collection: &str, keys: Document, unique: bool) -> Result<()> {
        let options = IndexOptions::builder().unique(unique).build();
        let model = IndexModel::builder().keys(keys).options(options).build();

        self.collection(collection)
            .create_index(model)
            .await
            .map_err(|e| GatehouseError::Storage(format!("create index failed: {e}")))?;
        Ok(())
    }

    async fn all_ids(&self, collection: &str, filter: Document) -> Result<Vec<String>> {
        let docs = self
            .find(collection, filter, Some(doc! { "_id": 1 }), None)
            .await?;

        Ok(docs
            .into_iter()
            .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
            .collect())
    }
}
