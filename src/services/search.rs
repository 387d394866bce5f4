//! Case-insensitive substring search over every key in a bucket.

use std::collections::BTreeSet;

use tracing::debug;

use super::{
    BrowserResult,
    pagination::{Aggregator, ListParams},
};
use crate::{
    config::SearchPolicy,
    models::{
        listing::{FolderEntry, ListingPage},
        object::ObjectEntry,
    },
};

#[derive(Clone)]
pub struct SearchEngine {
    source: Aggregator,
    policy: SearchPolicy,
}

impl SearchEngine {
    pub fn new(source: Aggregator, policy: SearchPolicy) -> Self {
        Self { source, policy }
    }

    /// Blank queries short-circuit to an empty result without a store call.
    pub async fn search(&self, bucket: &str, query: &str) -> BrowserResult<ListingPage> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(ListingPage::empty());
        }

        let drained = self.source.drain(bucket, &ListParams::all()).await?;
        let page = match_entries(drained.entries, &needle, self.policy);
        debug!(
            "search {:?} in {}: {} files, {} folders",
            needle,
            bucket,
            page.files.len(),
            page.folders.len()
        );
        Ok(page)
    }
}

/// Split matching entries into files and folders.
///
/// `needle` must already be trimmed and lower-cased. Files keep enumeration
/// order; folders are deduplicated and sorted.
pub fn match_entries(entries: Vec<ObjectEntry>, needle: &str, policy: SearchPolicy) -> ListingPage {
    let mut files = Vec::new();
    let mut folders = BTreeSet::new();

    for entry in entries {
        if !entry.key.to_lowercase().contains(needle) {
            continue;
        }

        if policy == SearchPolicy::Ancestors {
            for (idx, _) in entry.key.match_indices('/') {
                let ancestor = &entry.key[..=idx];
                if ancestor.len() < entry.key.len() && ancestor.to_lowercase().contains(needle) {
                    folders.insert(ancestor.to_string());
                }
            }
        }

        if entry.is_folder_marker() {
            folders.insert(entry.key);
        } else {
            files.push(entry);
        }
    }

    ListingPage {
        files,
        folders: folders.into_iter().map(FolderEntry::new).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn engine(keys: &[&str], policy: SearchPolicy) -> (Arc<MemoryStore>, SearchEngine) {
        let store = Arc::new(MemoryStore::with_page_size(2));
        store.seed("b", keys).await;
        let source = Aggregator::new(store.clone(), CancellationToken::new());
        (store, SearchEngine::new(source, policy))
    }

    #[tokio::test]
    async fn blank_query_makes_no_store_call() {
        let (store, engine) = engine(&["a.txt"], SearchPolicy::FolderMarkers).await;

        for query in ["", "   ", "\t\n"] {
            let page = engine.search("b", query).await.unwrap();
            assert_eq!(page, ListingPage::empty());
        }
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn matches_case_insensitively() {
        let (_store, engine) =
            engine(&["Report.txt", "image.png"], SearchPolicy::FolderMarkers).await;

        let page = engine.search("b", "  TXT ").await.unwrap();
        assert_eq!(page.file_keys(), vec!["Report.txt"]);
        assert!(page.folders.is_empty());
    }

    #[tokio::test]
    async fn folder_marker_policy_reports_only_matching_markers() {
        let keys = ["photos/", "photos/cat.jpg", "photos/2024/dog.jpg", "notes.txt"];
        let (_store, engine) = engine(&keys, SearchPolicy::FolderMarkers).await;

        let page = engine.search("b", "photo").await.unwrap();
        assert_eq!(page.folder_keys(), vec!["photos/"]);
        assert_eq!(page.file_keys(), vec!["photos/2024/dog.jpg", "photos/cat.jpg"]);
    }

    #[tokio::test]
    async fn ancestor_policy_adds_matching_ancestors() {
        let keys = ["photos/2024/dog.jpg", "archive/photos-old/x.png", "misc/y.jpg"];
        let (_store, engine) = engine(&keys, SearchPolicy::Ancestors).await;

        let page = engine.search("b", "PHOTO").await.unwrap();
        assert_eq!(page.folder_keys(), vec!["archive/photos-old/", "photos/"]);
        assert_eq!(
            page.file_keys(),
            vec!["archive/photos-old/x.png", "photos/2024/dog.jpg"]
        );
    }

    #[test]
    fn ancestor_policy_deduplicates_folders() {
        let now = chrono::Utc::now();
        let entries = ["a/x1", "a/x2", "a/"]
            .into_iter()
            .map(|key| ObjectEntry {
                key: key.into(),
                size: 0,
                last_modified: now,
                content_type: None,
            })
            .collect();

        let page = match_entries(entries, "a", SearchPolicy::Ancestors);
        assert_eq!(page.folder_keys(), vec!["a/"]);
        assert_eq!(page.file_keys(), vec!["a/x1", "a/x2"]);
    }
}
