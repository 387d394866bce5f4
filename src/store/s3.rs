//! S3 (or S3-compatible) object store.
//!
//! Thin adapter from the AWS SDK onto [`ObjectStore`]. Credentials, endpoint
//! and region come from [`S3Settings`] at construction; the client is never
//! global state.

use aws_sdk_s3::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata},
    primitives::{ByteStream, DateTime as AwsDateTime},
    types::{BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier},
};
use chrono::{DateTime, Utc};
use std::{collections::HashSet, future::Future};
use tracing::{debug, info, warn};

use super::{
    BatchDeleteError, BatchDeleteResult, ListObjectsPage, ListObjectsRequest, ObjectBody,
    ObjectStore, StoreError, StoreFuture, StoreResult, StoredObject,
};
use crate::{
    config::S3Settings,
    models::{bucket::Bucket, object::ObjectEntry},
};

/// Upper bound S3 puts on keys per `DeleteObjects` call.
pub const MAX_DELETE_BATCH: usize = 1000;

pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Build a client from explicit settings, falling back to the default
    /// AWS credential chain when no static keys are configured.
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()));

        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
            let creds = aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "bucket-browser-config",
            );
            loader = loader.credentials_provider(creds);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();

        info!(
            "S3 store initialized: region={} endpoint={:?} path_style={}",
            settings.region, settings.endpoint, settings.force_path_style
        );

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    /// One quiet-mode `DeleteObjects` call. Quiet mode only reports failures.
    async fn delete_chunk(
        &self,
        bucket: &str,
        chunk: Vec<String>,
    ) -> StoreResult<Vec<BatchDeleteError>> {
        let objects = chunk
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| backend_error("delete_objects build", e))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| backend_error("delete_objects build", e))?;

        debug!("S3 delete_objects: bucket={} keys={}", bucket, chunk.len());
        let resp = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| service_error("delete_objects", bucket, e.into_service_error()))?;

        Ok(resp
            .errors()
            .iter()
            .map(|err| BatchDeleteError {
                key: err.key().unwrap_or_default().to_string(),
                message: err
                    .message()
                    .or(err.code())
                    .unwrap_or("unknown error")
                    .to_string(),
            })
            .collect())
    }
}

fn backend_error(context: &str, err: impl std::error::Error) -> StoreError {
    StoreError::Backend(format!("{context}: {}", DisplayErrorContext(err)))
}

/// Service error to `StoreError`, keeping a missing bucket distinct.
fn service_error<E>(context: &str, bucket: &str, err: E) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    if err.code() == Some("NoSuchBucket") {
        StoreError::NoSuchBucket(bucket.to_string())
    } else {
        backend_error(context, err)
    }
}

/// Run a batch delete as `MAX_DELETE_BATCH`-sized chunks through `send_chunk`,
/// which reports the keys the store refused.
///
/// A chunk that fails outright marks all of its keys as failed and the
/// remaining chunks still run, so keys already deleted are never lost from
/// the result. A missing bucket aborts the whole batch.
async fn delete_in_chunks<F, Fut>(
    keys: &[String],
    mut send_chunk: F,
) -> StoreResult<BatchDeleteResult>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = StoreResult<Vec<BatchDeleteError>>>,
{
    let mut result = BatchDeleteResult::default();
    for chunk in keys.chunks(MAX_DELETE_BATCH) {
        match send_chunk(chunk.to_vec()).await {
            Ok(failed) => {
                let refused: HashSet<&str> = failed.iter().map(|f| f.key.as_str()).collect();
                result.deleted.extend(
                    chunk
                        .iter()
                        .filter(|key| !refused.contains(key.as_str()))
                        .cloned(),
                );
                result.errors.extend(failed);
            }
            Err(err @ StoreError::NoSuchBucket(_)) => return Err(err),
            Err(err) => {
                warn!("delete_objects chunk of {} keys failed: {}", chunk.len(), err);
                let message = err.to_string();
                result
                    .errors
                    .extend(chunk.iter().map(|key| BatchDeleteError {
                        key: key.clone(),
                        message: message.clone(),
                    }));
            }
        }
    }
    Ok(result)
}

fn to_chrono(ts: Option<&AwsDateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

impl ObjectStore for S3Store {
    fn list_buckets(&self) -> StoreFuture<'_, Vec<Bucket>> {
        Box::pin(async move {
            let resp = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(|e| backend_error("list_buckets", e))?;

            Ok(resp
                .buckets()
                .iter()
                .filter_map(|b| {
                    b.name().map(|name| Bucket {
                        name: name.to_string(),
                        creation_date: to_chrono(b.creation_date()),
                    })
                })
                .collect())
        })
    }

    fn create_bucket<'a>(&'a self, name: &'a str, region: Option<&'a str>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut req = self.client.create_bucket().bucket(name);
            if let Some(region) = region {
                req = req.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region))
                        .build(),
                );
            }

            debug!("S3 create_bucket: bucket={} region={:?}", name, region);
            req.send().await.map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_bucket_already_exists()
                    || service_err.is_bucket_already_owned_by_you()
                {
                    StoreError::BucketAlreadyExists(name.to_string())
                } else {
                    backend_error("create_bucket", service_err)
                }
            })?;
            Ok(())
        })
    }

    fn list_objects_page<'a>(
        &'a self,
        bucket: &'a str,
        request: &'a ListObjectsRequest,
    ) -> StoreFuture<'a, ListObjectsPage> {
        Box::pin(async move {
            debug!(
                "S3 list_objects_v2: bucket={} prefix={:?} delimiter={:?} token={}",
                bucket,
                request.prefix,
                request.delimiter,
                request.continuation_token.is_some()
            );

            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(request.prefix.clone())
                .set_delimiter(request.delimiter.clone())
                .set_continuation_token(request.continuation_token.clone())
                .send()
                .await
                .map_err(|e| service_error("list_objects_v2", bucket, e.into_service_error()))?;

            let entries = resp
                .contents()
                .iter()
                .filter_map(|obj| {
                    obj.key().map(|key| ObjectEntry {
                        key: key.to_string(),
                        size: obj.size().unwrap_or(0).max(0) as u64,
                        last_modified: to_chrono(obj.last_modified()),
                        content_type: None,
                    })
                })
                .collect();

            let common_prefixes = resp
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect();

            Ok(ListObjectsPage {
                entries,
                common_prefixes,
                is_truncated: resp.is_truncated().unwrap_or(false),
                next_token: resp.next_continuation_token().map(str::to_string),
            })
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
            let stream = match body {
                ObjectBody::Bytes(bytes) => ByteStream::from(bytes),
                ObjectBody::File(path) => ByteStream::from_path(&path)
                    .await
                    .map_err(|e| backend_error("put_object body", e))?,
            };

            debug!("S3 put_object: bucket={} key={}", bucket, key);
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .set_content_type(content_type)
                .body(stream)
                .send()
                .await
                .map_err(|e| service_error("put_object", bucket, e.into_service_error()))?;
            Ok(())
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, StoredObject> {
        Box::pin(async move {
            debug!("S3 get_object: bucket={} key={}", bucket, key);
            let resp = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        StoreError::NoSuchKey {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        }
                    } else {
                        service_error("get_object", bucket, service_err)
                    }
                })?;

            let content_type = resp.content_type().map(str::to_string);
            let body = resp
                .body
                .collect()
                .await
                .map_err(|e| backend_error("get_object body", e))?
                .into_bytes();

            Ok(StoredObject { body, content_type })
        })
    }

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            debug!("S3 delete_object: bucket={} key={}", bucket, key);
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| service_error("delete_object", bucket, e.into_service_error()))?;
            Ok(())
        })
    }

    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: &'a [String],
    ) -> StoreFuture<'a, BatchDeleteResult> {
        Box::pin(delete_in_chunks(keys, move |chunk| self.delete_chunk(bucket, chunk)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::{error::ErrorMetadata, operation::put_object::PutObjectError};

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("photos/{i:04}.jpg")).collect()
    }

    fn refused(key: &str) -> BatchDeleteError {
        BatchDeleteError {
            key: key.to_string(),
            message: "AccessDenied".into(),
        }
    }

    fn put_error(code: &str) -> PutObjectError {
        PutObjectError::generic(ErrorMetadata::builder().code(code).message("boom").build())
    }

    #[test]
    fn missing_bucket_code_maps_to_no_such_bucket() {
        let err = service_error("put_object", "photos", put_error("NoSuchBucket"));
        assert!(matches!(err, StoreError::NoSuchBucket(name) if name == "photos"));

        let err = service_error("put_object", "photos", put_error("AccessDenied"));
        assert!(matches!(err, StoreError::Backend(msg) if msg.starts_with("put_object")));
    }

    #[tokio::test]
    async fn batches_are_capped_and_refusals_split_out() {
        let keys = keys(2500);
        let denied = ["photos/0007.jpg", "photos/1500.jpg"];
        let mut sizes = Vec::new();

        let result = delete_in_chunks(&keys, |chunk| {
            sizes.push(chunk.len());
            let failed = chunk
                .iter()
                .filter(|key| denied.contains(&key.as_str()))
                .map(|key| refused(key))
                .collect();
            async move { Ok(failed) }
        })
        .await
        .unwrap();

        assert_eq!(sizes, vec![MAX_DELETE_BATCH, MAX_DELETE_BATCH, 500]);
        assert_eq!(result.deleted.len(), 2498);
        let failed: Vec<_> = result.errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(failed, denied);
        assert!(!result.deleted.contains(&"photos/0007.jpg".to_string()));
    }

    #[tokio::test]
    async fn failed_chunk_keeps_earlier_deletions() {
        let keys = keys(2100);
        let mut call = 0;

        let result = delete_in_chunks(&keys, |_chunk| {
            call += 1;
            let outcome = if call == 2 {
                Err(StoreError::Backend("connection reset".into()))
            } else {
                Ok(Vec::new())
            };
            async move { outcome }
        })
        .await
        .unwrap();

        assert_eq!(call, 3);
        assert_eq!(result.deleted.len(), 1100);
        assert_eq!(result.errors.len(), MAX_DELETE_BATCH);
        assert_eq!(result.errors[0].key, "photos/1000.jpg");
        assert!(result.errors[0].message.contains("connection reset"));
    }

    #[tokio::test]
    async fn missing_bucket_aborts_the_batch() {
        let keys = keys(3);
        let err = delete_in_chunks(&keys, |_chunk| async {
            Err(StoreError::NoSuchBucket("photos".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::NoSuchBucket(_)));
    }
}
