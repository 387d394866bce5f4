//! In-memory object store.
//!
//! Buckets and objects live in `BTreeMap`s behind a `tokio::sync::RwLock`, so
//! listings come out in key order exactly like S3. The page size is
//! configurable, which makes it the deterministic double for pagination
//! tests. Also selectable as a throwaway backend for local development.

#[cfg(test)]
use std::collections::HashSet;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    BatchDeleteError, BatchDeleteResult, Fill, ListObjectsPage, ListObjectsRequest, ObjectBody,
    ObjectStore, PageBuilder, StoreError, StoreFuture, StoredObject, decode_token,
};
use crate::models::{bucket::Bucket, object::ObjectEntry};

/// S3 default for `max-keys`.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

struct MemoryObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

struct MemoryBucket {
    created_at: DateTime<Utc>,
    objects: BTreeMap<String, MemoryObject>,
}

pub struct MemoryStore {
    buckets: RwLock<BTreeMap<String, MemoryBucket>>,
    page_size: usize,
    list_calls: AtomicUsize,
    #[cfg(test)]
    failing_deletes: std::sync::RwLock<HashSet<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Store whose listings return at most `page_size` items per call.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            list_calls: AtomicUsize::new(0),
            #[cfg(test)]
            failing_deletes: std::sync::RwLock::new(HashSet::new()),
        }
    }

    /// Number of `list_objects_page` calls served so far.
    #[cfg(test)]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make batch deletes report a failure for `key` and leave it in place.
    #[cfg(test)]
    pub fn fail_deletes_for(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.failing_deletes.write() {
            keys.insert(key.into());
        }
    }

    #[cfg(test)]
    fn delete_refused(&self, key: &str) -> bool {
        self.failing_deletes
            .read()
            .map(|keys| keys.contains(key))
            .unwrap_or(false)
    }

    /// Seed a bucket with empty objects under the given keys.
    #[cfg(test)]
    pub async fn seed(&self, bucket: &str, keys: &[&str]) {
        let mut buckets = self.buckets.write().await;
        let entry = buckets
            .entry(bucket.to_string())
            .or_insert_with(|| MemoryBucket {
                created_at: Utc::now(),
                objects: BTreeMap::new(),
            });
        for key in keys {
            entry.objects.insert(
                key.to_string(),
                MemoryObject {
                    data: Bytes::new(),
                    content_type: None,
                    last_modified: Utc::now(),
                },
            );
        }
    }

    /// Keys currently stored in `bucket`, in order.
    #[cfg(test)]
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn missing_bucket(bucket: &str) -> StoreError {
    StoreError::NoSuchBucket(bucket.to_string())
}

impl ObjectStore for MemoryStore {
    fn list_buckets(&self) -> StoreFuture<'_, Vec<Bucket>> {
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            Ok(buckets
                .iter()
                .map(|(name, b)| Bucket {
                    name: name.clone(),
                    creation_date: b.created_at,
                })
                .collect())
        })
    }

    fn create_bucket<'a>(&'a self, name: &'a str, region: Option<&'a str>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            if buckets.contains_key(name) {
                return Err(StoreError::BucketAlreadyExists(name.to_string()));
            }
            debug!("memory create_bucket: {} (region {:?})", name, region);
            buckets.insert(
                name.to_string(),
                MemoryBucket {
                    created_at: Utc::now(),
                    objects: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    fn list_objects_page<'a>(
        &'a self,
        bucket: &'a str,
        request: &'a ListObjectsRequest,
    ) -> StoreFuture<'a, ListObjectsPage> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let buckets = self.buckets.read().await;
            let stored = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;

            let after = request
                .continuation_token
                .as_deref()
                .map(decode_token)
                .transpose()?;

            let mut builder = PageBuilder::new(request, self.page_size);
            let start = request.prefix.clone().unwrap_or_default();
            for (key, object) in stored.objects.range(start..) {
                if after.as_deref().is_some_and(|after| key.as_str() <= after) {
                    continue;
                }
                if !key.starts_with(request.prefix.as_deref().unwrap_or("")) {
                    break;
                }
                let entry = ObjectEntry {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: object.last_modified,
                    content_type: object.content_type.clone(),
                };
                if builder.push(entry) == Fill::Full {
                    break;
                }
            }
            Ok(builder.finish())
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: ObjectBody,
        content_type: Option<String>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let data = body.into_bytes().await?;
            let mut buckets = self.buckets.write().await;
            let stored = buckets
                .get_mut(bucket)
                .ok_or_else(|| missing_bucket(bucket))?;
            stored.objects.insert(
                key.to_string(),
                MemoryObject {
                    data,
                    content_type,
                    last_modified: Utc::now(),
                },
            );
            Ok(())
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, StoredObject> {
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let stored = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
            let object = stored
                .objects
                .get(key)
                .ok_or_else(|| StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?;
            Ok(StoredObject {
                body: object.data.clone(),
                content_type: object.content_type.clone(),
            })
        })
    }

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            let stored = buckets
                .get_mut(bucket)
                .ok_or_else(|| missing_bucket(bucket))?;
            stored.objects.remove(key);
            Ok(())
        })
    }

    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: &'a [String],
    ) -> StoreFuture<'a, BatchDeleteResult> {
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            let stored = buckets
                .get_mut(bucket)
                .ok_or_else(|| missing_bucket(bucket))?;

            let mut result = BatchDeleteResult::default();
            for key in keys {
                #[cfg(test)]
                if self.delete_refused(key) {
                    result.errors.push(BatchDeleteError {
                        key: key.clone(),
                        message: "AccessDenied".into(),
                    });
                    continue;
                }
                stored.objects.remove(key);
                result.deleted.push(key.clone());
            }
            Ok(result)
        })
    }
}
