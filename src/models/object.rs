//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single entry returned by a flat listing.
///
/// `key` is the full flat path. There is no separate name field: the display
/// name is the last `/`-delimited segment of the key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    /// Full object key (`photos/2025/img.jpg`).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,

    /// MIME type, when the store reports one in listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ObjectEntry {
    /// A zero-length key ending in `/` marks a folder that may otherwise be empty.
    pub fn is_folder_marker(&self) -> bool {
        is_folder_key(&self.key)
    }
}

/// Keys ending with the delimiter denote folders.
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with('/')
}

/// Last `/`-delimited segment of `key`; empty for folder keys.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("e.txt"), "e.txt");
        assert_eq!(file_name("a/b/"), "");
    }

    #[test]
    fn folder_keys_end_with_slash() {
        assert!(is_folder_key("a/"));
        assert!(!is_folder_key("a"));
        assert!(!is_folder_key(""));
    }
}
