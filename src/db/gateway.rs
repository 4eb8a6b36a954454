//! Prefix-bound CRUD facade over a pooled store handle
//!
//! One Gateway is bound to a store backend and an optional collection-name
//! prefix; it is cheap to construct per request once a connection exists.
//! Bulk creates run in fixed windows, strictly one window at a time, to cap
//! concurrent load on the store. Duplicate-identifier inserts are reported
//! as structured outcomes so bulk flows can continue.

use std::sync::Arc;

use bson::{doc, Bson, Document};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::db::backend::Backend;
use crate::types::{GatehouseError, Result};

/// Documents per insert window in a bulk create
pub const DEFAULT_INSERT_WINDOW: usize = 10_000;

/// How a read targets documents
#[derive(Debug, Clone)]
pub enum ReadSelector {
    /// Exactly one document by identifier
    Id(String),
    /// Filtered query
    Filter(Document),
}

/// Update target: an identifier or an explicit selector
#[derive(Debug, Clone)]
pub enum UpdateSelector {
    Id(String),
    Filter(Document),
}

/// Result-set shaping for filtered reads
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Field projection passed through to the store
    pub projection: Option<Document>,
    /// Hard cap on returned documents
    pub limit: Option<i64>,
    /// Page slice; only honored when both raw parameters parsed as numbers
    pub page: Option<PageRequest>,
}

/// A validated paging request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Build from raw query parameters.
    ///
    /// Both must be present and numeric, otherwise paging is ignored and
    /// the caller falls back to the full (or limited) result set.
    pub fn from_params(page: Option<&str>, page_size: Option<&str>) -> Option<Self> {
        let page = page?.parse().ok()?;
        let page_size = page_size?.parse().ok()?;
        Some(Self { page, page_size })
    }
}

/// Paging summary returned alongside a page slice
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageInfo {
    pub page: usize,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
    pub last_page: bool,
    pub total_rows: usize,
    pub total_pages: usize,
}

/// What a read produced
#[derive(Debug)]
pub enum ReadOutcome {
    /// Identifier lookup: the document, or None when nothing matched
    One(Option<Document>),
    /// Filtered query results
    Many(Vec<Document>),
    /// Page slice plus paging summary
    Page(Vec<Document>, PageInfo),
}

/// What a single-document create produced
#[derive(Debug)]
pub enum CreateOutcome {
    Created {
        id: String,
    },
    /// Insert hit an existing identifier; recovered, not thrown
    DuplicateId {
        error: String,
        reason: String,
    },
}

/// Per-collection CRUD access bound to one pooled connection
#[derive(Clone)]
pub struct Gateway {
    backend: Arc<dyn Backend>,
    prefix: Option<String>,
    insert_window: usize,
}

impl Gateway {
    /// Bind a backend and an optional collection-name prefix
    pub fn new(backend: Arc<dyn Backend>, prefix: Option<String>) -> Self {
        Self {
            backend,
            prefix,
            insert_window: DEFAULT_INSERT_WINDOW,
        }
    }

    /// Override the bulk-insert window size
    pub fn with_insert_window(mut self, window: usize) -> Self {
        self.insert_window = window.max(1);
        self
    }

    /// Effective collection name under the configured prefix
    pub fn scoped(&self, collection: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{collection}"),
            None => collection.to_string(),
        }
    }

    /// Insert a single document, assigning an identifier when missing
    pub async fn create(&self, collection: &str, mut doc: Document) -> Result<CreateOutcome> {
        let id = ensure_id(&mut doc);
        match self.backend.insert_one(&self.scoped(collection), doc).await {
            Ok(()) => Ok(CreateOutcome::Created { id }),
            Err(GatehouseError::Duplicate(reason)) => Ok(CreateOutcome::DuplicateId {
                error: "conflict".to_string(),
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    /// Insert documents in fixed windows, each awaited before the next.
    ///
    /// Order across windows is preserved; within a window the store may
    /// reorder (unordered batch). Returns the number of documents sent.
    pub async fn create_many(&self, collection: &str, docs: Vec<Document>) -> Result<usize> {
        let scoped = self.scoped(collection);
        let total = docs.len();

        let mut pending = docs;
        for doc in pending.iter_mut() {
            ensure_id(doc);
        }

        let mut windows = 0usize;
        while !pending.is_empty() {
            let split = pending.len().min(self.insert_window);
            let tail = pending.split_off(split);
            let window = std::mem::replace(&mut pending, tail);
            self.backend.insert_many(&scoped, window).await?;
            windows += 1;
        }

        debug!(collection = %scoped, total, windows, "bulk create complete");
        Ok(total)
    }

    /// Read by identifier or filter, optionally shaping the result set
    pub async fn read(
        &self,
        collection: &str,
        selector: ReadSelector,
        options: ReadOptions,
    ) -> Result<ReadOutcome> {
        let scoped = self.scoped(collection);
        match selector {
            ReadSelector::Id(id) => {
                let found = self.backend.find_one(&scoped, doc! { "_id": id }).await?;
                Ok(ReadOutcome::One(found))
            }
            ReadSelector::Filter(filter) => match options.page {
                Some(request) => {
                    // Paging slices the full result set
                    let docs = self
                        .backend
                        .find(&scoped, filter, options.projection, None)
                        .await?;
                    let (slice, info) = paginate(docs, request);
                    Ok(ReadOutcome::Page(slice, info))
                }
                None => {
                    let docs = self
                        .backend
                        .find(&scoped, filter, options.projection, options.limit)
                        .await?;
                    Ok(ReadOutcome::Many(docs))
                }
            },
        }
    }

    /// Merge patch fields into the matching document. Never upserts.
    ///
    /// Returns the number of documents matched (0 when nothing did).
    pub async fn update(
        &self,
        collection: &str,
        selector: UpdateSelector,
        patch: Document,
    ) -> Result<u64> {
        let summary = self
            .backend
            .update_one(
                &self.scoped(collection),
                selector_filter(selector),
                set_patch(patch),
                false,
            )
            .await?;
        Ok(summary.matched)
    }

    /// Merge-or-insert under an explicit identifier
    pub async fn upsert(&self, collection: &str, id: &str, patch: Document) -> Result<()> {
        self.backend
            .update_one(
                &self.scoped(collection),
                doc! { "_id": id },
                set_patch(patch),
                true,
            )
            .await?;
        Ok(())
    }

    pub async fn delete_one(&self, collection: &str, selector: UpdateSelector) -> Result<u64> {
        self.backend
            .delete_one(&self.scoped(collection), selector_filter(selector))
            .await
    }

    pub async fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        self.backend.count(&self.scoped(collection), filter).await
    }

    pub async fn drop(&self, collection: &str) -> Result<()> {
        self.backend.drop_collection(&self.scoped(collection)).await
    }

    pub async fn create_index(&self, collection: &str, keys: Document, unique: bool) -> Result<()> {
        self.backend
            .create_index(&self.scoped(collection), keys, unique)
            .await
    }

    /// Identifier-only projection; basis for chunked bulk operations
    pub async fn all_ids(&self, collection: &str, filter: Document) -> Result<Vec<String>> {
        self.backend.all_ids(&self.scoped(collection), filter).await
    }

    /// Fetch the documents matching an identifier set
    pub async fn fetch_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>> {
        let id_set: Vec<Bson> = ids.iter().map(|id| Bson::String(id.clone())).collect();
        self.backend
            .find(
                &self.scoped(collection),
                doc! { "_id": { "$in": id_set } },
                None,
                None,
            )
            .await
    }
}

/// Assign a time-ordered unique id when the document lacks one.
///
/// Non-string identifiers pass through untouched; only absent, null, and
/// empty-string identifiers are replaced.
fn ensure_id(doc: &mut Document) -> String {
    match doc.get("_id") {
        Some(Bson::String(id)) if !id.is_empty() => return id.clone(),
        Some(Bson::String(_)) | Some(Bson::Null) | None => {}
        Some(other) => return other.to_string(),
    }

    let id = Uuid::now_v7().to_string();
    doc.insert("_id", id.clone());
    id
}

fn selector_filter(selector: UpdateSelector) -> Document {
    match selector {
        UpdateSelector::Id(id) => doc! { "_id": id },
        UpdateSelector::Filter(filter) => filter,
    }
}

/// Wrap patch fields for a field-merge update; the identifier is immutable
fn set_patch(mut patch: Document) -> Document {
    patch.remove("_id");
    doc! { "$set": patch }
}

/// Slice out the requested page and describe the full result set
fn paginate(docs: Vec<Document>, request: PageRequest) -> (Vec<Document>, PageInfo) {
    let total_rows = docs.len();
    let start = request.page.saturating_mul(request.page_size);
    let end = start.saturating_add(request.page_size);
    let last_page = total_rows <= end;
    let total_pages = if request.page_size == 0 {
        0
    } else {
        total_rows.div_ceil(request.page_size)
    };

    let slice: Vec<Document> = docs
        .into_iter()
        .skip(start)
        .take(request.page_size)
        .collect();

    (
        slice,
        PageInfo {
            page: request.page,
            page_size: request.page_size,
            last_page,
            total_rows,
            total_pages,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::MemoryBackend;
    use std::collections::HashSet;

    fn gateway(backend: Arc<MemoryBackend>) -> Gateway {
        Gateway::new(backend, None)
    }

    fn docs_without_ids(n: usize) -> Vec<Document> {
        (0..n).map(|i| doc! { "seq": i as i64 }).collect()
    }

    #[tokio::test]
    async fn test_create_assigns_missing_id() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        let outcome = gw.create("things", doc! { "name": "widget" }).await.unwrap();
        let id = match outcome {
            CreateOutcome::Created { id } => id,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert!(!id.is_empty());

        let stored = backend.docs("things").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_str("_id").unwrap(), id);
    }

    #[tokio::test]
    async fn test_create_keeps_existing_id() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        let outcome = gw
            .create("things", doc! { "_id": "fixed", "name": "widget" })
            .await
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created { id } if id == "fixed"));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_structured_not_thrown() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.create("things", doc! { "_id": "dup" }).await.unwrap();
        let outcome = gw.create("things", doc! { "_id": "dup" }).await.unwrap();

        match outcome {
            CreateOutcome::DuplicateId { error, reason } => {
                assert_eq!(error, "conflict");
                assert!(reason.contains("dup"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(backend.docs("things").await.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_ids_unique() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.create_many("things", docs_without_ids(500)).await.unwrap();

        let ids = backend.ids("things").await;
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), 500);
        assert_eq!(unique.len(), 500);
    }

    #[tokio::test]
    async fn test_create_many_windows_sequentially() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend)).with_insert_window(10);

        let sent = gw.create_many("things", docs_without_ids(25)).await.unwrap();
        assert_eq!(sent, 25);

        let calls = backend.insert_calls.lock().await.clone();
        let sizes: Vec<usize> = calls.iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(backend.docs("things").await.len(), 25);
    }

    #[tokio::test]
    async fn test_create_many_single_window_when_small() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.create_many("things", docs_without_ids(42)).await.unwrap();

        let calls = backend.insert_calls.lock().await.clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, 42);
    }

    #[tokio::test]
    async fn test_read_by_id() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.create("things", doc! { "_id": "a", "name": "widget" })
            .await
            .unwrap();

        let found = gw
            .read("things", ReadSelector::Id("a".into()), ReadOptions::default())
            .await
            .unwrap();
        match found {
            ReadOutcome::One(Some(doc)) => assert_eq!(doc.get_str("name").unwrap(), "widget"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let missing = gw
            .read("things", ReadSelector::Id("b".into()), ReadOptions::default())
            .await
            .unwrap();
        assert!(matches!(missing, ReadOutcome::One(None)));
    }

    #[tokio::test]
    async fn test_read_with_limit() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.create_many("things", docs_without_ids(20)).await.unwrap();

        let outcome = gw
            .read(
                "things",
                ReadSelector::Filter(doc! {}),
                ReadOptions {
                    limit: Some(7),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        match outcome {
            ReadOutcome::Many(docs) => assert_eq!(docs.len(), 7),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_paged_read_slices_full_result() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        let docs: Vec<Document> = (0..25)
            .map(|i| doc! { "_id": format!("id-{i:02}"), "seq": i as i64 })
            .collect();
        gw.create_many("things", docs).await.unwrap();

        let outcome = gw
            .read(
                "things",
                ReadSelector::Filter(doc! {}),
                ReadOptions {
                    page: Some(PageRequest { page: 1, page_size: 10 }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        match outcome {
            ReadOutcome::Page(slice, info) => {
                assert_eq!(slice.len(), 10);
                assert_eq!(slice[0].get_str("_id").unwrap(), "id-10");
                assert_eq!(slice[9].get_str("_id").unwrap(), "id-19");
                assert_eq!(
                    info,
                    PageInfo {
                        page: 1,
                        page_size: 10,
                        last_page: false,
                        total_rows: 25,
                        total_pages: 3,
                    }
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_last_page_boundary() {
        let docs: Vec<Document> = (0..25).map(|i| doc! { "seq": i as i64 }).collect();

        // 25 <= (1*10)+10 is false: not the last page
        let (_, info) = paginate(docs.clone(), PageRequest { page: 1, page_size: 10 });
        assert!(!info.last_page);

        // 25 <= (2*10)+10: last page, with the 5 remaining rows
        let (slice, info) = paginate(docs, PageRequest { page: 2, page_size: 10 });
        assert!(info.last_page);
        assert_eq!(slice.len(), 5);
        assert_eq!(info.total_rows, 25);
    }

    #[test]
    fn test_page_request_requires_both_numeric_params() {
        assert_eq!(
            PageRequest::from_params(Some("1"), Some("10")),
            Some(PageRequest { page: 1, page_size: 10 })
        );
        assert_eq!(PageRequest::from_params(Some("1"), None), None);
        assert_eq!(PageRequest::from_params(None, Some("10")), None);
        assert_eq!(PageRequest::from_params(Some("one"), Some("10")), None);
        assert_eq!(PageRequest::from_params(Some("1"), Some("ten")), None);
    }

    #[tokio::test]
    async fn test_update_merges_without_upsert() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.create("things", doc! { "_id": "a", "name": "widget", "qty": 1 })
            .await
            .unwrap();

        let matched = gw
            .update(
                "things",
                UpdateSelector::Id("a".into()),
                doc! { "qty": 2 },
            )
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let stored = &backend.docs("things").await[0];
        assert_eq!(stored.get_i32("qty").unwrap(), 2);
        // untouched fields survive the merge
        assert_eq!(stored.get_str("name").unwrap(), "widget");

        // no upsert: a miss changes nothing
        let matched = gw
            .update(
                "things",
                UpdateSelector::Id("missing".into()),
                doc! { "qty": 9 },
            )
            .await
            .unwrap();
        assert_eq!(matched, 0);
        assert_eq!(backend.docs("things").await.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_inserts_on_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.upsert("things", "fresh", doc! { "qty": 4 }).await.unwrap();

        let stored = backend.docs("things").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_str("_id").unwrap(), "fresh");
        assert_eq!(stored[0].get_i32("qty").unwrap(), 4);
    }

    #[tokio::test]
    async fn test_prefix_scopes_collection_names() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = Gateway::new(Arc::clone(&backend) as Arc<dyn Backend>, Some("tenant".into()));

        gw.create("things", doc! { "_id": "a" }).await.unwrap();

        assert_eq!(gw.scoped("things"), "tenant:things");
        assert_eq!(backend.docs("tenant:things").await.len(), 1);
        assert!(backend.docs("things").await.is_empty());
    }

    #[tokio::test]
    async fn test_all_ids_projects_identifiers_only() {
        let backend = Arc::new(MemoryBackend::new());
        let gw = gateway(Arc::clone(&backend));

        gw.create_many(
            "things",
            vec![doc! { "_id": "x", "big": "payload" }, doc! { "_id": "y" }],
        )
        .await
        .unwrap();

        let mut ids = gw.all_ids("things", doc! {}).await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["x".to_string(), "y".to_string()]);
    }
}
