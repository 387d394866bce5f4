//! Single-object and folder deletion.
//!
//! A key ending in `/` deletes every object under that prefix with one batch
//! request. The batch is not atomic: a partial failure leaves the remaining
//! objects in place and nothing is rolled back.

use tracing::{info, warn};

use super::{
    BrowserResult,
    pagination::{Aggregator, ListParams},
};
use crate::models::{
    listing::{DeleteFailure, DeleteOutcome},
    object::is_folder_key,
};

#[derive(Clone)]
pub struct DeleteOrchestrator {
    source: Aggregator,
    report_failures: bool,
}

impl DeleteOrchestrator {
    pub fn new(source: Aggregator, report_failures: bool) -> Self {
        Self {
            source,
            report_failures,
        }
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> BrowserResult<DeleteOutcome> {
        if is_folder_key(key) {
            self.delete_folder(bucket, key).await
        } else {
            self.source.store().delete_object(bucket, key).await?;
            info!("deleted {}/{}", bucket, key);
            Ok(DeleteOutcome {
                deleted_count: 1,
                failures: Vec::new(),
            })
        }
    }

    /// `deleted_count` is the number of keys the batch was issued for.
    async fn delete_folder(&self, bucket: &str, prefix: &str) -> BrowserResult<DeleteOutcome> {
        let drained = self.source.drain(bucket, &ListParams::under(prefix)).await?;
        let keys: Vec<String> = drained.entries.into_iter().map(|e| e.key).collect();
        if keys.is_empty() {
            info!("folder {}/{} matched no objects", bucket, prefix);
            return Ok(DeleteOutcome::default());
        }

        let result = self.source.store().delete_objects(bucket, &keys).await?;
        for failure in &result.errors {
            warn!(
                "failed to delete {}/{} during folder delete: {}",
                bucket, failure.key, failure.message
            );
        }
        info!(
            "folder {}/{}: {} of {} keys deleted",
            bucket,
            prefix,
            result.deleted.len(),
            keys.len()
        );

        let failures = if self.report_failures {
            result
                .errors
                .into_iter()
                .map(|err| DeleteFailure {
                    key: err.key,
                    message: err.message,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(DeleteOutcome {
            deleted_count: keys.len(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn orchestrator(
        keys: &[&str],
        report_failures: bool,
    ) -> (Arc<MemoryStore>, DeleteOrchestrator) {
        let store = Arc::new(MemoryStore::with_page_size(1));
        store.seed("b", keys).await;
        let source = Aggregator::new(store.clone(), CancellationToken::new());
        (store, DeleteOrchestrator::new(source, report_failures))
    }

    #[tokio::test]
    async fn folder_delete_removes_every_descendant() {
        let (store, deleter) = orchestrator(&["a/b/c.txt", "a/d.txt", "ab.txt"], false).await;

        let outcome = deleter.delete("b", "a/").await.unwrap();
        assert_eq!(outcome.deleted_count, 2);
        assert_eq!(store.keys("b").await, vec!["ab.txt".to_string()]);
    }

    #[tokio::test]
    async fn empty_folder_prefix_is_not_an_error() {
        let (store, deleter) = orchestrator(&["x.txt"], false).await;

        let outcome = deleter.delete("b", "nothing/").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::default());
        assert_eq!(store.keys("b").await.len(), 1);
    }

    #[tokio::test]
    async fn single_delete_leaves_siblings() {
        let (store, deleter) = orchestrator(&["a/1", "a/2"], false).await;

        let outcome = deleter.delete("b", "a/1").await.unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(store.keys("b").await, vec!["a/2".to_string()]);
    }

    #[tokio::test]
    async fn missing_single_key_still_succeeds() {
        let (_store, deleter) = orchestrator(&[], false).await;
        assert_eq!(deleter.delete("b", "ghost.txt").await.unwrap().deleted_count, 1);
    }

    #[tokio::test]
    async fn partial_failures_are_reported_when_enabled() {
        let (store, deleter) = orchestrator(&["a/", "a/1", "a/2"], true).await;
        store.fail_deletes_for("a/2");

        let outcome = deleter.delete("b", "a/").await.unwrap();
        assert_eq!(outcome.deleted_count, 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].key, "a/2");
        assert_eq!(store.keys("b").await, vec!["a/2".to_string()]);
    }

    #[tokio::test]
    async fn partial_failures_are_hidden_by_default() {
        let (store, deleter) = orchestrator(&["a/1", "a/2"], false).await;
        store.fail_deletes_for("a/1");

        let outcome = deleter.delete("b", "a/").await.unwrap();
        assert_eq!(outcome.deleted_count, 2);
        assert!(outcome.failures.is_empty());
    }
}
