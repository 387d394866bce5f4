//! One directory level of the browser.

use super::{
    BrowserResult,
    pagination::{Aggregator, ListParams},
};
use crate::models::listing::{FolderEntry, ListingPage};

pub const DEFAULT_DELIMITER: &str = "/";

#[derive(Clone)]
pub struct ListingView {
    source: Aggregator,
}

impl ListingView {
    pub fn new(source: Aggregator) -> Self {
        Self { source }
    }

    /// Files directly under `prefix` plus its immediate subfolders.
    ///
    /// The store does the folding on `delimiter`. The folder marker of the
    /// queried prefix itself is dropped so a folder never lists itself.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: &str,
    ) -> BrowserResult<ListingPage> {
        let params = ListParams::level(prefix, delimiter);
        let drained = self.source.drain(bucket, &params).await?;

        let files = drained
            .entries
            .into_iter()
            .filter(|entry| Some(entry.key.as_str()) != params.prefix.as_deref())
            .collect();
        let folders = drained
            .common_prefixes
            .into_iter()
            .map(FolderEntry::new)
            .collect();

        Ok(ListingPage { files, folders })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn view_over(keys: &[&str], page_size: usize) -> ListingView {
        let store = Arc::new(MemoryStore::with_page_size(page_size));
        store.seed("b", keys).await;
        ListingView::new(Aggregator::new(store, CancellationToken::new()))
    }

    #[tokio::test]
    async fn lists_one_level_under_prefix() {
        let view = view_over(&["a/b/c.txt", "a/d.txt", "e.txt"], 1000).await;

        let page = view.list("b", Some("a/"), DEFAULT_DELIMITER).await.unwrap();
        assert_eq!(page.file_keys(), vec!["a/d.txt"]);
        assert_eq!(page.folder_keys(), vec!["a/b/"]);
    }

    #[tokio::test]
    async fn root_listing_without_prefix() {
        let view = view_over(&["a/b/c.txt", "a/d.txt", "e.txt"], 1).await;

        let page = view.list("b", None, DEFAULT_DELIMITER).await.unwrap();
        assert_eq!(page.file_keys(), vec!["e.txt"]);
        assert_eq!(page.folder_keys(), vec!["a/"]);
    }

    #[tokio::test]
    async fn folder_marker_is_not_listed_inside_itself() {
        let view = view_over(&["docs/", "docs/readme.md", "docs/img/", "docs/img/x.png"], 2).await;

        let page = view.list("b", Some("docs/"), DEFAULT_DELIMITER).await.unwrap();
        assert_eq!(page.file_keys(), vec!["docs/readme.md"]);
        assert_eq!(page.folder_keys(), vec!["docs/img/"]);
    }

    #[tokio::test]
    async fn empty_delimiter_lists_flat() {
        let view = view_over(&["a/b/c.txt", "a/d.txt"], 1000).await;

        let page = view.list("b", Some(""), "").await.unwrap();
        assert_eq!(page.file_keys(), vec!["a/b/c.txt", "a/d.txt"]);
        assert!(page.folders.is_empty());
    }
}
