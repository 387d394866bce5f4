//! Derived, per-request views over the flat key space.

use bytes::Bytes;
use serde::{Serialize, Serializer, ser::SerializeSeq};

use super::object::ObjectEntry;

/// One directory level, or the result of a search.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Objects directly inside the requested level.
    #[serde(serialize_with = "serialize_files")]
    pub files: Vec<ObjectEntry>,

    /// Immediate subfolders, by full prefix.
    pub folders: Vec<FolderEntry>,
}

impl ListingPage {
    pub fn empty() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn file_keys(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.key.as_str()).collect()
    }

    #[cfg(test)]
    pub fn folder_keys(&self) -> Vec<&str> {
        self.folders.iter().map(|f| f.key.as_str()).collect()
    }
}

/// A synthetic folder inside a [`ListingPage`].
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    /// Full prefix, always ending with `/`.
    pub key: String,

    #[serde(rename = "type")]
    kind: &'static str,
}

impl FolderEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: "folder",
        }
    }
}

#[derive(Serialize)]
struct FileView<'a> {
    #[serde(flatten)]
    entry: &'a ObjectEntry,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn serialize_files<S: Serializer>(files: &[ObjectEntry], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(files.len()))?;
    for entry in files {
        seq.serialize_element(&FileView { entry, kind: "file" })?;
    }
    seq.end()
}

/// A folder derived from key prefixes. Never persisted.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct VirtualFolder {
    /// Full prefix, ending with `/`.
    pub path: String,

    /// Last segment of `path` once trailing slashes are stripped.
    pub name: String,

    /// Number of segments in `path` once trailing slashes are stripped;
    /// top-level folders have depth 1 and `a//` counts as `a/`.
    #[serde(rename = "level")]
    pub depth: usize,
}

/// Every folder in a bucket, sorted by path.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderTree {
    pub folders: Vec<VirtualFolder>,
}

/// Result of a single-object or folder deletion.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Number of keys a delete was issued for.
    pub deleted_count: usize,

    /// Keys the store refused to delete. Only populated when per-key
    /// reporting is enabled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DeleteFailure>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Fully buffered object body ready to be sent as an attachment.
#[derive(Clone, Debug)]
pub struct Download {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn listing_page_serializes_item_types() {
        let page = ListingPage {
            files: vec![ObjectEntry {
                key: "a/d.txt".into(),
                size: 3,
                last_modified: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
                content_type: None,
            }],
            folders: vec![FolderEntry::new("a/b/")],
        };

        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(
            value,
            json!({
                "files": [{
                    "key": "a/d.txt",
                    "size": 3,
                    "lastModified": "2025-01-02T03:04:05Z",
                    "type": "file"
                }],
                "folders": [{"key": "a/b/", "type": "folder"}]
            })
        );
    }

    #[test]
    fn delete_outcome_hides_empty_failures() {
        let value = serde_json::to_value(DeleteOutcome {
            deleted_count: 2,
            failures: Vec::new(),
        })
        .unwrap();
        assert_eq!(value, json!({"deletedCount": 2}));
    }
}
