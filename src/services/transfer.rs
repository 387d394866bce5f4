//! Upload and download relay.
//!
//! Uploads are spooled to a named temporary file before the store sees them,
//! so the store always gets a complete, sized payload. The file is removed on
//! every exit path: explicitly after `put_object`, or by `TempPath`'s drop
//! when an earlier step fails or the request is abandoned.

use std::{io, path::PathBuf, sync::Arc};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{BrowserError, BrowserResult};
use crate::{
    models::{listing::Download, object::file_name},
    store::{ObjectBody, ObjectStore, StoreError},
};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upload payload parked on local disk. Dropping it deletes the file.
#[derive(Debug)]
pub struct SpooledUpload {
    path: TempPath,
    len: u64,
}

#[derive(Clone)]
pub struct TransferRelay {
    store: Arc<dyn ObjectStore>,
    spool_dir: Option<PathBuf>,
}

impl TransferRelay {
    pub fn new(store: Arc<dyn ObjectStore>, spool_dir: Option<PathBuf>) -> Self {
        Self { store, spool_dir }
    }

    fn spool_file(&self) -> io::Result<NamedTempFile> {
        match &self.spool_dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
    }

    /// Stream `body` into a fresh spool file.
    pub async fn spool<S>(&self, body: S) -> BrowserResult<SpooledUpload>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let (file, path) = self.spool_file()?.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut body = std::pin::pin!(body);
        let mut len: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            len += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("spooled {} bytes at {:?}", len, path);
        Ok(SpooledUpload { path, len })
    }

    /// Hand a spooled payload to the store under the key derived from
    /// `prefix` and `filename`. Returns the stored key.
    pub async fn upload(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        filename: &str,
        content_type: Option<String>,
        spooled: SpooledUpload,
    ) -> BrowserResult<String> {
        let key = upload_key(prefix, filename)?;
        let SpooledUpload { path, len } = spooled;

        let stored = self
            .store
            .put_object(bucket, &key, ObjectBody::File(path.to_path_buf()), content_type)
            .await;
        if let Err(err) = path.close() {
            warn!("failed to remove upload spool file: {}", err);
        }
        stored?;

        info!("uploaded {}/{} ({} bytes)", bucket, key, len);
        Ok(key)
    }

    /// Read the whole object into memory.
    pub async fn download(&self, bucket: &str, key: &str) -> BrowserResult<Download> {
        let object = self.store.get_object(bucket, key).await.map_err(|err| match err {
            StoreError::NoSuchKey { bucket, key } => BrowserError::NotFound { bucket, key },
            other => BrowserError::Store(other),
        })?;

        debug!("download {}/{} ({} bytes)", bucket, key, object.body.len());
        Ok(Download {
            filename: file_name(key).to_string(),
            content_type: object
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body: object.body,
        })
    }
}

/// Key an upload lands on: the bare file name at the root, otherwise joined
/// to the folder prefix with exactly one `/`.
pub fn upload_key(prefix: Option<&str>, filename: &str) -> BrowserResult<String> {
    if filename.is_empty() {
        return Err(BrowserError::Validation("Upload is missing a file name".into()));
    }
    let folder = prefix.unwrap_or_default().trim_end_matches('/');
    if folder.is_empty() {
        Ok(filename.to_string())
    } else {
        Ok(format!("{folder}/{filename}"))
    }
}
