//! Folder tree synthesis.
//!
//! Folders have no identity of their own in the store. The tree is a pure
//! function of the current key set: every `/`-terminated proper prefix of a
//! key is a folder. The whole key set is enumerated and held in memory, so
//! this is bounded by what fits in RAM for a single bucket.

use std::collections::BTreeSet;

use super::{
    BrowserResult,
    pagination::{Aggregator, ListParams},
};
use crate::models::listing::{FolderTree, VirtualFolder};

#[derive(Clone)]
pub struct TreeSynthesizer {
    source: Aggregator,
}

impl TreeSynthesizer {
    pub fn new(source: Aggregator) -> Self {
        Self { source }
    }

    /// Every folder in `bucket`, sorted by path.
    pub async fn build_tree(&self, bucket: &str) -> BrowserResult<FolderTree> {
        let drained = self.source.drain(bucket, &ListParams::all()).await?;
        let folders = synthesize_folders(drained.entries.iter().map(|e| e.key.as_str()));
        Ok(FolderTree { folders })
    }
}

/// Derive the deduplicated, sorted folder set from flat keys.
pub fn synthesize_folders<'k>(keys: impl IntoIterator<Item = &'k str>) -> Vec<VirtualFolder> {
    let mut paths = BTreeSet::new();
    for key in keys {
        for (idx, _) in key.match_indices('/') {
            paths.insert(&key[..=idx]);
        }
    }
    paths.into_iter().map(virtual_folder).collect()
}

/// Trailing slashes are not segments, so `a//` sits at depth 1 like `a/`.
fn virtual_folder(path: &str) -> VirtualFolder {
    let trimmed = path.trim_end_matches('/');
    VirtualFolder {
        path: path.to_string(),
        name: trimmed.rsplit('/').next().unwrap_or_default().to_string(),
        depth: trimmed.split('/').count(),
    }
}
