//! src/store/local.rs
//!
//! LocalStore: a self-contained object store backed by SQLite for metadata
//! and local disk for object payloads. Payloads are sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{digest}`, where the digest is the MD5
//! of `bucket/key`. The key itself lives only in SQLite, so keys that nest
//! (`docs` and `docs/a.txt`) never compete for the same path. Every write
//! goes through a temp file followed by a rename.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, TryStreamExt, pin_mut, stream};
use md5::Context;
use sqlx::{
    FromRow, QueryBuilder, SqlitePool,
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    BatchDeleteError, BatchDeleteResult, Fill, ListObjectsPage, ListObjectsRequest, ObjectBody,
    ObjectStore, PageBuilder, StoreError, StoreFuture, StoreResult, StoredObject, decode_token,
};
use crate::models::{bucket::Bucket, object::ObjectEntry};

const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");
const MAX_OBJECT_KEY_LEN: usize = 1024;
/// S3 default for `max-keys`.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_REGION: &str = "local";

#[derive(FromRow, Debug)]
struct BucketRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    content_type: Option<String>,
    size_bytes: i64,
    last_modified: DateTime<Utc>,
}

impl From<ObjectRow> for ObjectEntry {
    fn from(row: ObjectRow) -> Self {
        Self {
            key: row.key,
            size: row.size_bytes.max(0) as u64,
            last_modified: row.last_modified,
            content_type: row.content_type,
        }
    }
}

#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    page_size: usize,
}

impl LocalStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Cap listings at `page_size` items per call.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Open (or create) the metadata database and payload directory, then
    /// apply the schema.
    pub async fn connect(database_url: &str, base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                info!("Created missing directory {:?}", parent);
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self::new(Arc::new(pool), base_path);
        store.migrate().await?;
        Ok(store)
    }

    /// Run the embedded schema statements. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Rejects keys S3 would not accept either.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::Backend(format!("invalid object key `{key}`")));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Payload location: two shard directories plus a flat file name, all
    /// taken from MD5(bucket/key).
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        let mut path = self.bucket_root(bucket_name);
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StoreResult<BucketRow> {
        sqlx::query_as::<_, BucketRow>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StoreError::NoSuchBucket(bucket.to_string()),
                other => StoreError::Sqlx(other),
            })
    }

    async fn list_page(
        &self,
        bucket: &str,
        request: &ListObjectsRequest,
    ) -> StoreResult<ListObjectsPage> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let prefix = request.prefix.as_deref().unwrap_or("");
        let after = request
            .continuation_token
            .as_deref()
            .map(decode_token)
            .transpose()?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT key, content_type, size_bytes, last_modified FROM objects WHERE bucket_id = ",
        );
        builder.push_bind(bucket_rec.id);
        if !prefix.is_empty() {
            builder.push(" AND key >= ");
            builder.push_bind(prefix);
        }
        if let Some(after) = &after {
            builder.push(" AND key > ");
            builder.push_bind(after.as_str());
        }
        builder.push(" ORDER BY key ASC");

        let mut page = PageBuilder::new(request, self.page_size);
        let mut rows = builder.build_query_as::<ObjectRow>().fetch(&*self.db);
        while let Some(row) = rows.try_next().await? {
            if !row.key.starts_with(prefix) {
                break;
            }
            if page.push(row.into()) == Fill::Full {
                break;
            }
        }
        Ok(page.finish())
    }

    /// Stream a payload to disk and upsert its metadata (overwrite semantics).
    ///
    /// Bytes go to a temp file next to the final location, which is renamed
    /// into place after an fsync. The temp file is removed on every error.
    async fn write_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StoreResult<()>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        Self::ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = Self::spool(&tmp_path, stream).await;
        let (size_bytes, etag) = match written {
            Ok(summary) => summary,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        let upsert = sqlx::query(
            r#"
            INSERT INTO objects (id, bucket_id, key, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        if let Err(err) = upsert {
            let _ = fs::remove_file(&file_path).await;
            return Err(err.into());
        }
        debug!("stored {}/{} ({} bytes, etag {})", bucket, key, size_bytes, etag);
        Ok(())
    }

    async fn spool<S>(tmp_path: &Path, stream: S) -> io::Result<(i64, String)>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut file = File::create(tmp_path).await?;
        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok((size_bytes, format!("{:x}", digest.compute())))
    }

    async fn remove_object(&self, bucket_rec: &BucketRow, key: &str) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;
        sqlx::query("DELETE FROM objects WHERE key = ? AND bucket_id = ?")
            .bind(key)
            .bind(bucket_rec.id)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }
}

impl ObjectStore for LocalStore {
    fn list_buckets(&self) -> StoreFuture<'_, Vec<Bucket>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, BucketRow>(
                "SELECT id, name, created_at FROM buckets ORDER BY name ASC",
            )
            .fetch_all(&*self.db)
            .await?;
            Ok(rows
                .into_iter()
                .map(|row| Bucket {
                    name: row.name,
                    creation_date: row.created_at,
                })
                .collect())
        })
    }

    fn create_bucket<'a>(&'a self, name: &'a str, region: Option<&'a str>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            fs::create_dir_all(self.bucket_root(name)).await?;
            let region = region.unwrap_or(DEFAULT_REGION).to_lowercase();

            match sqlx::query(
                "INSERT INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(&region)
            .bind(Utc::now())
            .execute(&*self.db)
            .await
            {
                Ok(_) => Ok(()),
                Err(err) if is_unique_violation(&err) => {
                    Err(StoreError::BucketAlreadyExists(name.to_string()))
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn list_objects_page<'a>(
        &'a self,
        bucket: &'a str,
        request: &'a ListObjectsRequest,
    ) -> StoreFuture<'a, ListObjectsPage> {
        Box::pin(self.list_page(bucket, request))
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: ObjectBody,
        content_type: Option<String>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            match body {
                ObjectBody::Bytes(bytes) => {
                    let stream = stream::once(async move { Ok::<_, io::Error>(bytes) });
                    self.write_object(bucket, key, content_type, stream).await
                }
                ObjectBody::File(path) => {
                    let file = File::open(&path).await?;
                    self.write_object(bucket, key, content_type, ReaderStream::new(file))
                        .await
                }
            }
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, StoredObject> {
        Box::pin(async move {
            let not_found = || StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            };
            Self::ensure_key_safe(key)?;
            let bucket_rec = self.fetch_bucket(bucket).await?;
            let content_type: Option<String> = sqlx::query_scalar(
                "SELECT content_type FROM objects WHERE key = ? AND bucket_id = ?",
            )
            .bind(key)
            .bind(bucket_rec.id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(not_found)?;

            let body = fs::read(self.object_path(&bucket_rec.name, key))
                .await
                .map_err(|err| match err.kind() {
                    ErrorKind::NotFound => not_found(),
                    _ => StoreError::Io(err),
                })?;

            Ok(StoredObject {
                body: Bytes::from(body),
                content_type,
            })
        })
    }

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let bucket_rec = self.fetch_bucket(bucket).await?;
            self.remove_object(&bucket_rec, key).await
        })
    }

    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: &'a [String],
    ) -> StoreFuture<'a, BatchDeleteResult> {
        Box::pin(async move {
            let bucket_rec = self.fetch_bucket(bucket).await?;
            let mut result = BatchDeleteResult::default();
            for key in keys {
                match self.remove_object(&bucket_rec, key).await {
                    Ok(()) => result.deleted.push(key.clone()),
                    Err(err) => result.errors.push(BatchDeleteError {
                        key: key.clone(),
                        message: err.to_string(),
                    }),
                }
            }
            Ok(result)
        })
    }
}

/// Remove empty directories from `start` up to, but excluding, `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("meta/browser.db").display());
        let store = LocalStore::connect(&url, dir.path().join("objects"))
            .await
            .expect("failed to open local store");
        store.create_bucket("photos", None).await.unwrap();
        (dir, store)
    }

    async fn put(store: &LocalStore, key: &str, body: &'static [u8]) {
        store
            .put_object("photos", key, ObjectBody::Bytes(Bytes::from_static(body)), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_dir, store) = open_store().await;
        store
            .put_object(
                "photos",
                "2025/cat.txt",
                ObjectBody::Bytes(Bytes::from_static(b"meow")),
                Some("text/plain".into()),
            )
            .await
            .unwrap();

        let object = store.get_object("photos", "2025/cat.txt").await.unwrap();
        assert_eq!(&object.body[..], b"meow");
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn folder_marker_coexists_with_children() {
        let (_dir, store) = open_store().await;
        put(&store, "a/", b"").await;
        put(&store, "a/b.txt", b"b").await;

        let request = ListObjectsRequest {
            prefix: Some("a/".into()),
            delimiter: Some("/".into()),
            continuation_token: None,
        };
        let page = store.list_objects_page("photos", &request).await.unwrap();
        let keys: Vec<_> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a/", "a/b.txt"]);
    }

    #[tokio::test]
    async fn listing_groups_common_prefixes() {
        let (_dir, store) = open_store().await;
        for key in ["a/b/c.txt", "a/d.txt", "e.txt"] {
            put(&store, key, b"x").await;
        }

        let request = ListObjectsRequest {
            prefix: None,
            delimiter: Some("/".into()),
            continuation_token: None,
        };
        let page = store.list_objects_page("photos", &request).await.unwrap();

        assert_eq!(page.common_prefixes, vec!["a/".to_string()]);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].key, "e.txt");
        assert!(!page.is_truncated);
    }

    #[tokio::test]
    async fn nested_keys_keep_separate_payloads() {
        let (_dir, store) = open_store().await;
        put(&store, "docs", b"file").await;
        put(&store, "docs/f643.txt", b"child").await;
        put(&store, "m43437", b"plain").await;
        put(&store, "m43437/", b"").await;

        let docs = store.get_object("photos", "docs").await.unwrap();
        assert_eq!(&docs.body[..], b"file");
        let child = store.get_object("photos", "docs/f643.txt").await.unwrap();
        assert_eq!(&child.body[..], b"child");
        let plain = store.get_object("photos", "m43437").await.unwrap();
        assert_eq!(&plain.body[..], b"plain");

        store.delete_object("photos", "docs").await.unwrap();
        let child = store.get_object("photos", "docs/f643.txt").await.unwrap();
        assert_eq!(&child.body[..], b"child");
    }

    #[tokio::test]
    async fn small_pages_resume_from_token() {
        let (_dir, store) = open_store().await;
        let store = store.with_page_size(2);
        for key in ["a/1", "a/2", "b.txt", "c/1", "c/2", "d.txt", "e.txt"] {
            put(&store, key, b"x").await;
        }

        let mut request = ListObjectsRequest {
            prefix: None,
            delimiter: Some("/".into()),
            continuation_token: None,
        };
        let mut pages = Vec::new();
        loop {
            let page = store.list_objects_page("photos", &request).await.unwrap();
            let mut items: Vec<String> = page.common_prefixes.clone();
            items.extend(page.entries.iter().map(|e| e.key.clone()));
            pages.push(items);
            if !page.is_truncated {
                assert!(page.next_token.is_none());
                break;
            }
            assert!(page.next_token.is_some());
            request.continuation_token = page.next_token;
        }

        assert_eq!(
            pages,
            vec![
                vec!["a/".to_string(), "b.txt".to_string()],
                vec!["c/".to_string(), "d.txt".to_string()],
                vec!["e.txt".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn missing_object_is_no_such_key() {
        let (_dir, store) = open_store().await;
        let err = store.get_object("photos", "nope.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::NoSuchKey { .. }));
    }

    #[tokio::test]
    async fn batch_delete_removes_rows_and_files() {
        let (_dir, store) = open_store().await;
        put(&store, "a/1", b"1").await;
        put(&store, "a/2", b"2").await;

        let keys = vec!["a/1".to_string(), "a/2".to_string()];
        let result = store.delete_objects("photos", &keys).await.unwrap();
        assert_eq!(result.deleted.len(), 2);
        assert!(result.errors.is_empty());

        let page = store
            .list_objects_page("photos", &ListObjectsRequest::default())
            .await
            .unwrap();
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn duplicate_bucket_is_rejected() {
        let (_dir, store) = open_store().await;
        let err = store.create_bucket("photos", None).await.unwrap_err();
        assert!(matches!(err, StoreError::BucketAlreadyExists(_)));
    }
}
