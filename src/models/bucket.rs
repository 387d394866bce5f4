//! Represents a bucket as reported by the backing store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level container for objects. The browser can list and create
/// buckets but never deletes them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Bucket name (globally unique for S3).
    pub name: String,

    /// When the bucket was created.
    pub creation_date: DateTime<Utc>,
}
