//! Bulk collection copy
//!
//! Streams a source collection into a target in fixed-size identifier
//! windows so peak resident memory is proportional to the window, not the
//! collection. Windows run strictly one at a time; the first failing window
//! halts the run and surfaces its error.

use bson::doc;
use tracing::{debug, info};

use crate::db::gateway::Gateway;
use crate::types::Result;

/// Identifiers per copy window
pub const DEFAULT_COPY_WINDOW: usize = 1000;

#[derive(Debug, Clone)]
pub struct CopyConfig {
    pub window: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_COPY_WINDOW,
        }
    }
}

/// Windows processed and documents copied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub windows: usize,
    pub copied: usize,
}

/// Copy every document from `source_collection` into `target_collection`.
///
/// Identifier order follows the store's natural order and is not stable
/// across calls. The window loop terminates on exhaustion of the identifier
/// list; a short final window is simply the tail.
pub async fn copy_collection(
    source: &Gateway,
    source_collection: &str,
    target: &Gateway,
    target_collection: &str,
    config: &CopyConfig,
) -> Result<CopyReport> {
    let window = config.window.max(1);
    let ids = source.all_ids(source_collection, doc! {}).await?;

    info!(
        source = %source_collection,
        target = %target_collection,
        total = ids.len(),
        window,
        "bulk copy starting"
    );

    let mut report = CopyReport::default();
    for chunk in ids.chunks(window) {
        let docs = source.fetch_by_ids(source_collection, chunk).await?;
        let copied = target.create_many(target_collection, docs).await?;
        report.windows += 1;
        report.copied += copied;
        debug!(
            window = report.windows,
            copied = report.copied,
            "copy window complete"
        );
    }

    info!(
        windows = report.windows,
        copied = report.copied,
        "bulk copy complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::MemoryBackend;
    use crate::db::{Backend, Gateway};
    use bson::Document;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn gateway(backend: &Arc<MemoryBackend>) -> Gateway {
        Gateway::new(Arc::clone(backend) as Arc<dyn Backend>, None)
    }

    async fn seed(backend: &Arc<MemoryBackend>, collection: &str, n: usize) {
        let docs: Vec<Document> = (0..n)
            .map(|i| bson::doc! { "_id": format!("doc-{i:05}"), "seq": i as i64 })
            .collect();
        gateway(backend).create_many(collection, docs).await.unwrap();
        backend.insert_calls.lock().await.clear();
        backend.find_calls.lock().await.clear();
    }

    #[tokio::test]
    async fn test_copy_windows_and_id_set() {
        let source_backend = Arc::new(MemoryBackend::new());
        let target_backend = Arc::new(MemoryBackend::new());
        seed(&source_backend, "library", 2500).await;

        let report = copy_collection(
            &gateway(&source_backend),
            "library",
            &gateway(&target_backend),
            "library",
            &CopyConfig { window: 1000 },
        )
        .await
        .unwrap();

        assert_eq!(report, CopyReport { windows: 3, copied: 2500 });

        // exactly 3 fetch-then-insert round trips: 1000, 1000, 500
        let fetches = source_backend.find_calls.lock().await.len();
        assert_eq!(fetches, 4); // one id listing plus three window fetches

        let inserts = target_backend.insert_calls.lock().await.clone();
        let sizes: Vec<usize> = inserts.iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        let source_ids: HashSet<String> =
            source_backend.ids("library").await.into_iter().collect();
        let target_ids: HashSet<String> =
            target_backend.ids("library").await.into_iter().collect();
        assert_eq!(source_ids, target_ids);
    }

    #[tokio::test]
    async fn test_copy_empty_source() {
        let source_backend = Arc::new(MemoryBackend::new());
        let target_backend = Arc::new(MemoryBackend::new());

        let report = copy_collection(
            &gateway(&source_backend),
            "library",
            &gateway(&target_backend),
            "library",
            &CopyConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report, CopyReport::default());
        assert!(target_backend.insert_calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_copy_halts_on_first_window_error() {
        let source_backend = Arc::new(MemoryBackend::new());
        let target_backend = Arc::new(MemoryBackend::new());
        seed(&source_backend, "library", 250).await;
        target_backend.fail_inserts.store(true, Ordering::SeqCst);

        let result = copy_collection(
            &gateway(&source_backend),
            "library",
            &gateway(&target_backend),
            "library",
            &CopyConfig { window: 100 },
        )
        .await;

        assert!(result.is_err());
        // fail-fast: only the first window was fetched (after the id listing)
        assert_eq!(source_backend.find_calls.lock().await.len(), 2);
        assert!(target_backend.docs("library").await.is_empty());
    }

    #[tokio::test]
    async fn test_copy_between_prefixed_namespaces() {
        let backend = Arc::new(MemoryBackend::new());
        let source = Gateway::new(Arc::clone(&backend) as Arc<dyn Backend>, Some("a".into()));
        let target = Gateway::new(Arc::clone(&backend) as Arc<dyn Backend>, Some("b".into()));

        source
            .create_many("items", vec![bson::doc! { "_id": "1" }, bson::doc! { "_id": "2" }])
            .await
            .unwrap();

        let report = copy_collection(&source, "items", &target, "items", &CopyConfig::default())
            .await
            .unwrap();

        assert_eq!(report.copied, 2);
        assert_eq!(backend.docs("b:items").await.len(), 2);
    }
}
