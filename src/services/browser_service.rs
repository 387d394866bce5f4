//! Facade the HTTP layer talks to.
//!
//! Owns one instance of every browser component, all sharing the same store
//! handle and shutdown token. Cloning is cheap: everything inside is an
//! `Arc` or a small setting.

use std::{io, sync::Arc};

use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{
    BrowserResult,
    delete::DeleteOrchestrator,
    listing::ListingView,
    pagination::Aggregator,
    search::SearchEngine,
    transfer::{SpooledUpload, TransferRelay},
    tree::TreeSynthesizer,
    validation::{ensure_bucket_name, ensure_bucket_present, ensure_key_present},
};
use crate::{
    config::BrowserSettings,
    models::{
        bucket::Bucket,
        listing::{DeleteOutcome, Download, FolderTree, ListingPage},
    },
    store::{ObjectBody, ObjectStore},
};

#[derive(Clone)]
pub struct BrowserService {
    store: Arc<dyn ObjectStore>,
    default_region: Option<String>,
    listing: ListingView,
    tree: TreeSynthesizer,
    search: SearchEngine,
    deleter: DeleteOrchestrator,
    relay: TransferRelay,
}

impl BrowserService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        settings: BrowserSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let source = Aggregator::new(store.clone(), shutdown);
        Self {
            listing: ListingView::new(source.clone()),
            tree: TreeSynthesizer::new(source.clone()),
            search: SearchEngine::new(source.clone(), settings.search_policy),
            deleter: DeleteOrchestrator::new(source, settings.report_delete_failures),
            relay: TransferRelay::new(store.clone(), settings.spool_dir),
            default_region: settings.default_region,
            store,
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub async fn list_buckets(&self) -> BrowserResult<Vec<Bucket>> {
        Ok(self.store.list_buckets().await?)
    }

    /// The region is only sent when it differs from the store's default.
    pub async fn create_bucket(&self, name: &str, region: Option<&str>) -> BrowserResult<()> {
        ensure_bucket_name(name)?;
        let region = region
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .filter(|r| Some(*r) != self.default_region.as_deref());
        self.store.create_bucket(name, region).await?;
        info!("created bucket {} (region {:?})", name, region);
        Ok(())
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: &str,
    ) -> BrowserResult<ListingPage> {
        ensure_bucket_present(bucket)?;
        self.listing.list(bucket, prefix, delimiter).await
    }

    pub async fn folder_tree(&self, bucket: &str) -> BrowserResult<FolderTree> {
        ensure_bucket_present(bucket)?;
        self.tree.build_tree(bucket).await
    }

    pub async fn search(&self, bucket: &str, query: &str) -> BrowserResult<ListingPage> {
        ensure_bucket_present(bucket)?;
        self.search.search(bucket, query).await
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> BrowserResult<DeleteOutcome> {
        ensure_bucket_present(bucket)?;
        ensure_key_present(key)?;
        self.deleter.delete(bucket, key).await
    }

    /// Write the zero-length marker for `prefix` and return its key.
    pub async fn create_folder(&self, bucket: &str, prefix: &str) -> BrowserResult<String> {
        ensure_bucket_present(bucket)?;
        ensure_key_present(prefix)?;
        let key = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        self.store
            .put_object(bucket, &key, ObjectBody::empty(), None)
            .await?;
        info!("created folder {}/{}", bucket, key);
        Ok(key)
    }

    /// Park an incoming upload body on local disk.
    pub async fn spool_upload<S>(&self, body: S) -> BrowserResult<SpooledUpload>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        self.relay.spool(body).await
    }

    pub async fn upload(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        filename: &str,
        content_type: Option<String>,
        spooled: SpooledUpload,
    ) -> BrowserResult<String> {
        ensure_bucket_present(bucket)?;
        self.relay
            .upload(bucket, prefix, filename, content_type, spooled)
            .await
    }

    pub async fn download(&self, bucket: &str, key: &str) -> BrowserResult<Download> {
        ensure_bucket_present(bucket)?;
        ensure_key_present(key)?;
        self.relay.download(bucket, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::BrowserError,
        store::{StoreError, memory::MemoryStore},
    };

    fn service(store: Arc<MemoryStore>, default_region: Option<&str>) -> BrowserService {
        let settings = BrowserSettings {
            default_region: default_region.map(str::to_string),
            ..Default::default()
        };
        BrowserService::new(store, settings, CancellationToken::new())
    }

    #[tokio::test]
    async fn create_folder_appends_slash_and_writes_marker() {
        let store = Arc::new(MemoryStore::new());
        store.seed("b", &[]).await;
        let svc = service(store.clone(), None);

        assert_eq!(svc.create_folder("b", "docs").await.unwrap(), "docs/");
        assert_eq!(svc.create_folder("b", "img/").await.unwrap(), "img/");
        assert_eq!(store.keys("b").await, vec!["docs/", "img/"]);

        let err = svc.create_folder("b", "").await.unwrap_err();
        assert!(matches!(err, BrowserError::Validation(_)));
    }

    #[tokio::test]
    async fn invalid_bucket_names_never_reach_the_store() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Some("us-east-1"));

        let err = svc.create_bucket("Bad_Name", None).await.unwrap_err();
        assert!(matches!(err, BrowserError::Validation(_)));
        assert!(svc.list_buckets().await.unwrap().is_empty());

        svc.create_bucket("good-name", Some("us-east-1")).await.unwrap();
        let err = svc.create_bucket("good-name", None).await.unwrap_err();
        assert!(matches!(
            err,
            BrowserError::Store(StoreError::BucketAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn empty_delete_key_is_rejected_before_the_store() {
        let store = Arc::new(MemoryStore::new());
        store.seed("b", &["keep"]).await;
        let svc = service(store.clone(), None);

        let err = svc.delete("b", "").await.unwrap_err();
        assert!(matches!(err, BrowserError::Validation(_)));
        assert_eq!(store.keys("b").await, vec!["keep"]);
    }

    /// Nested keys, one folder marker and a root file: tree, listing, search
    /// and delete all agree with each other.
    #[tokio::test]
    async fn browsing_scenario() {
        let store = Arc::new(MemoryStore::with_page_size(2));
        store
            .seed("b", &["a/b/c.txt", "a/d.txt", "e.txt", "docs/", "docs/readme.TXT"])
            .await;
        let svc = service(store.clone(), None);

        let tree = svc.folder_tree("b").await.unwrap();
        let paths: Vec<_> = tree.folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a/", "a/b/", "docs/"]);

        let root = svc.list_objects("b", None, "/").await.unwrap();
        assert_eq!(root.file_keys(), vec!["e.txt"]);
        assert_eq!(root.folder_keys(), vec!["a/", "docs/"]);

        let hits = svc.search("b", "txt").await.unwrap();
        assert_eq!(
            hits.file_keys(),
            vec!["a/b/c.txt", "a/d.txt", "docs/readme.TXT", "e.txt"]
        );

        let outcome = svc.delete("b", "a/").await.unwrap();
        assert_eq!(outcome.deleted_count, 2);
        let tree = svc.folder_tree("b").await.unwrap();
        assert_eq!(tree.folders.len(), 1);
    }
}
