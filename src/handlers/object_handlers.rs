//! HTTP handlers for the file-browser view of a bucket.
//! Listing, tree and search return JSON; uploads arrive as multipart and are
//! spooled to disk before the store sees them.

use crate::{
    errors::AppError,
    models::listing::{DeleteOutcome, FolderTree, ListingPage},
    services::{
        browser_service::BrowserService, listing::DEFAULT_DELIMITER,
        transfer::{DEFAULT_CONTENT_TYPE, SpooledUpload},
    },
};
use axum::{
    Form, Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;

/// Query params of `GET /objects`.
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
}

/// Query params of `GET /search`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// Form body of `POST /folder`.
#[derive(Debug, Deserialize)]
pub struct CreateFolderForm {
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub message: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: DeleteOutcome,
}

/// GET `/api/buckets/{bucket}/objects`: one folder level.
pub async fn list_objects(
    State(service): State<BrowserService>,
    Path(bucket): Path<String>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Json<ListingPage>, AppError> {
    let delimiter = q.delimiter.as_deref().unwrap_or(DEFAULT_DELIMITER);
    let page = service
        .list_objects(&bucket, q.prefix.as_deref(), delimiter)
        .await
        .map_err(|err| AppError::from_browser("list objects", err))?;
    Ok(Json(page))
}

/// GET `/api/buckets/{bucket}/tree`: every folder in the bucket.
pub async fn folder_tree(
    State(service): State<BrowserService>,
    Path(bucket): Path<String>,
) -> Result<Json<FolderTree>, AppError> {
    let tree = service
        .folder_tree(&bucket)
        .await
        .map_err(|err| AppError::from_browser("get folder tree", err))?;
    Ok(Json(tree))
}

/// GET `/api/buckets/{bucket}/search?query=`
pub async fn search(
    State(service): State<BrowserService>,
    Path(bucket): Path<String>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<ListingPage>, AppError> {
    let page = service
        .search(&bucket, &q.query)
        .await
        .map_err(|err| AppError::from_browser("search", err))?;
    Ok(Json(page))
}

/// POST `/api/buckets/{bucket}/upload`: multipart `file` plus optional
/// `prefix`. Fields may arrive in any order, so the file is spooled first and
/// the key is derived once the whole form has been read.
pub async fn upload_file(
    State(service): State<BrowserService>,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<KeyResponse>, AppError> {
    let mut prefix: Option<String> = None;
    let mut upload: Option<(String, Option<String>, SpooledUpload)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prefix" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("Invalid prefix field: {err}")))?;
                prefix = Some(value);
            }
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let body = field.map(|chunk| chunk.map_err(io::Error::other));
                let spooled = service
                    .spool_upload(body)
                    .await
                    .map_err(|err| AppError::from_browser("upload file", err))?;
                upload = Some((filename, content_type, spooled));
            }
            other => tracing::debug!("ignoring multipart field {:?}", other),
        }
    }

    let (filename, content_type, spooled) =
        upload.ok_or_else(|| AppError::bad_request("Missing `file` field"))?;
    let key = service
        .upload(&bucket, prefix.as_deref(), &filename, content_type, spooled)
        .await
        .map_err(|err| AppError::from_browser("upload file", err))?;

    Ok(Json(KeyResponse {
        message: "File uploaded successfully".into(),
        key,
    }))
}

/// POST `/api/buckets/{bucket}/folder`: write a folder marker.
pub async fn create_folder(
    State(service): State<BrowserService>,
    Path(bucket): Path<String>,
    Form(form): Form<CreateFolderForm>,
) -> Result<Json<KeyResponse>, AppError> {
    let key = service
        .create_folder(&bucket, &form.prefix)
        .await
        .map_err(|err| AppError::from_browser("create folder", err))?;
    Ok(Json(KeyResponse {
        message: "Folder created successfully".into(),
        key,
    }))
}

/// GET `/api/buckets/{bucket}/download/{*key}`: whole object as an
/// attachment.
pub async fn download_file(
    State(service): State<BrowserService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let download = service
        .download(&bucket, &key)
        .await
        .map_err(|err| AppError::from_browser("download file", err))?;

    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&content_disposition(&download.filename))
        .map_err(|err| AppError::internal(format!("Failed to download file: {err}")))?;

    let mut response = Response::new(Body::from(download.body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

/// DELETE `/api/buckets/{bucket}/objects/{*key}`: a trailing `/` deletes the
/// whole folder.
pub async fn delete_object(
    State(service): State<BrowserService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, AppError> {
    let outcome = service
        .delete(&bucket, &key)
        .await
        .map_err(|err| AppError::from_browser("delete object", err))?;

    let message = if key.ends_with('/') {
        "Folder deleted successfully"
    } else {
        "File deleted successfully"
    };
    Ok(Json(DeleteResponse {
        message: message.into(),
        outcome,
    }))
}

/// `attachment; filename="..."` restricted to characters a header value can
/// carry.
fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_quotes_plain_names() {
        assert_eq!(
            content_disposition("report 2024.pdf"),
            "attachment; filename=\"report 2024.pdf\""
        );
    }

    #[test]
    fn disposition_replaces_unsafe_characters() {
        let value = content_disposition("we\"ird\\naïve.txt");
        assert_eq!(value, "attachment; filename=\"we_ird_na_ve.txt\"");
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
