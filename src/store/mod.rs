//! Object-store capability.
//!
//! The browser never talks to a concrete client directly. Every component
//! receives an `Arc<dyn ObjectStore>` at construction so that S3, the local
//! SQLite-backed store and the in-memory double are interchangeable.

pub mod local;
pub mod memory;
pub mod s3;

use std::{future::Future, io, path::PathBuf, pin::Pin};

use bytes::Bytes;
use thiserror::Error;

use crate::models::{bucket::Bucket, object::ObjectEntry};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    NoSuchBucket(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NoSuchKey { bucket: String, key: String },
    #[error("store protocol violation: {0}")]
    Protocol(String),
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Arguments of a single `listObjectsPage` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
}

/// One page of a cursor-based listing.
#[derive(Clone, Debug, Default)]
pub struct ListObjectsPage {
    pub entries: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_token: Option<String>,
}

/// Payload handed to `put_object`.
#[derive(Debug)]
pub enum ObjectBody {
    /// Small in-memory payload, e.g. a folder marker.
    Bytes(Bytes),
    /// Payload spooled to a local file that outlives the call.
    File(PathBuf),
}

impl ObjectBody {
    pub fn empty() -> Self {
        Self::Bytes(Bytes::new())
    }

    /// Read the whole payload into memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::File(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }
}

/// Object returned by `get_object`.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Per-key outcome of a batch delete.
#[derive(Clone, Debug, Default)]
pub struct BatchDeleteResult {
    pub deleted: Vec<String>,
    pub errors: Vec<BatchDeleteError>,
}

#[derive(Clone, Debug)]
pub struct BatchDeleteError {
    pub key: String,
    pub message: String,
}

/// Minimum surface the browser needs from a backing store.
pub trait ObjectStore: Send + Sync + 'static {
    fn list_buckets(&self) -> StoreFuture<'_, Vec<Bucket>>;

    /// Create a bucket, optionally pinned to `region`.
    fn create_bucket<'a>(&'a self, name: &'a str, region: Option<&'a str>) -> StoreFuture<'a, ()>;

    /// Fetch one page of keys, S3 `ListObjectsV2` style.
    fn list_objects_page<'a>(
        &'a self,
        bucket: &'a str,
        request: &'a ListObjectsRequest,
    ) -> StoreFuture<'a, ListObjectsPage>;

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: ObjectBody,
        content_type: Option<String>,
    ) -> StoreFuture<'a, ()>;

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, StoredObject>;

    /// Delete a single key. Deleting a missing key is not an error.
    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ()>;

    /// Delete many keys. Implementations chunk to their own batch limit.
    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: &'a [String],
    ) -> StoreFuture<'a, BatchDeleteResult>;
}

/// Accumulates one listing page from keys visited in ascending order.
///
/// Shared by the stores that implement listing themselves. Mirrors S3:
/// a common prefix counts once toward `max_keys`, and a page never splits a
/// common prefix, so the resume marker after a prefix skips all of its keys.
pub(crate) struct PageBuilder<'a> {
    prefix: &'a str,
    delimiter: Option<&'a str>,
    max_keys: usize,
    page: ListObjectsPage,
    last_marker: Option<String>,
}

/// Whether the builder accepts more keys.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Fill {
    Open,
    Full,
}

impl<'a> PageBuilder<'a> {
    pub(crate) fn new(request: &'a ListObjectsRequest, max_keys: usize) -> Self {
        Self {
            prefix: request.prefix.as_deref().unwrap_or(""),
            delimiter: request.delimiter.as_deref().filter(|d| !d.is_empty()),
            max_keys: max_keys.max(1),
            page: ListObjectsPage::default(),
            last_marker: None,
        }
    }

    fn len(&self) -> usize {
        self.page.entries.len() + self.page.common_prefixes.len()
    }

    /// Offer the next key in order. Keys outside the prefix are ignored.
    pub(crate) fn push(&mut self, entry: ObjectEntry) -> Fill {
        if !entry.key.starts_with(self.prefix) {
            return Fill::Open;
        }

        if let Some(common) = self.common_prefix(&entry.key) {
            if self.page.common_prefixes.last() == Some(&common) {
                return Fill::Open;
            }
            if self.len() == self.max_keys {
                self.page.is_truncated = true;
                return Fill::Full;
            }
            self.last_marker = Some(format!("{common}{}", char::MAX));
            self.page.common_prefixes.push(common);
        } else {
            if self.len() == self.max_keys {
                self.page.is_truncated = true;
                return Fill::Full;
            }
            self.last_marker = Some(entry.key.clone());
            self.page.entries.push(entry);
        }
        Fill::Open
    }

    /// Close the page. The next token is the encoded resume marker.
    pub(crate) fn finish(mut self) -> ListObjectsPage {
        if self.page.is_truncated {
            self.page.next_token = self.last_marker.as_deref().map(encode_token);
        }
        self.page
    }

    fn common_prefix(&self, key: &str) -> Option<String> {
        let delimiter = self.delimiter?;
        let rest = &key[self.prefix.len()..];
        rest.find(delimiter)
            .map(|pos| format!("{}{}", self.prefix, &rest[..pos + delimiter.len()]))
    }
}

/// Continuation tokens are opaque to callers.
pub(crate) fn encode_token(marker: &str) -> String {
    use base64::{Engine as _, engine::general_purpose};
    general_purpose::URL_SAFE_NO_PAD.encode(marker)
}

pub(crate) fn decode_token(token: &str) -> StoreResult<String> {
    use base64::{Engine as _, engine::general_purpose};
    general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| StoreError::Protocol(format!("invalid continuation token `{token}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(key: &str) -> ObjectEntry {
        ObjectEntry {
            key: key.into(),
            size: 0,
            last_modified: Utc::now(),
            content_type: None,
        }
    }

    fn build(keys: &[&str], request: &ListObjectsRequest, max_keys: usize) -> ListObjectsPage {
        let mut builder = PageBuilder::new(request, max_keys);
        for key in keys {
            if builder.push(entry(key)) == Fill::Full {
                break;
            }
        }
        builder.finish()
    }

    #[test]
    fn groups_keys_under_delimiter() {
        let request = ListObjectsRequest {
            prefix: Some("a/".into()),
            delimiter: Some("/".into()),
            continuation_token: None,
        };
        let page = build(&["a/", "a/b/c.txt", "a/b/e.txt", "a/d.txt", "e.txt"], &request, 10);

        let keys: Vec<_> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a/", "a/d.txt"]);
        assert_eq!(page.common_prefixes, vec!["a/b/".to_string()]);
        assert!(!page.is_truncated);
        assert!(page.next_token.is_none());
    }

    #[test]
    fn truncated_page_resumes_after_common_prefix() {
        let request = ListObjectsRequest {
            prefix: None,
            delimiter: Some("/".into()),
            continuation_token: None,
        };
        let page = build(&["a/1", "a/2", "b/1", "c"], &request, 1);

        assert_eq!(page.common_prefixes, vec!["a/".to_string()]);
        assert!(page.is_truncated);
        let marker = decode_token(page.next_token.as_deref().unwrap()).unwrap();
        assert!(marker.as_str() > "a/2");
        assert!(marker.as_str() < "b/1");
    }

    #[test]
    fn rejects_garbage_tokens() {
        assert!(decode_token("***").is_err());
    }
}
