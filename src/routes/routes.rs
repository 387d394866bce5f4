//! Defines routes for the file-browser API.
//!
//! ## Structure
//! - **Bucket endpoints**
//!   - `GET    /api/buckets`: list buckets
//!   - `POST   /api/buckets`: create bucket (form `bucket_name`, `region`)
//!
//! - **Browser endpoints** under `/api/buckets/{bucket}`
//!   - `GET    /objects`: one folder level (`prefix`, `delimiter`)
//!   - `GET    /tree`: every folder derived from the key set
//!   - `GET    /search`: substring search (`query`)
//!   - `POST   /upload`: multipart upload (`file`, `prefix`)
//!   - `POST   /folder`: create folder marker (form `prefix`)
//!   - `GET    /download/{*key}`: download as attachment
//!   - `DELETE /objects/{*key}`: delete file, or folder when the key ends in `/`
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, list_buckets},
        health_handlers::{healthz, readyz},
        object_handlers::{
            create_folder, delete_object, download_file, folder_tree, list_objects, search,
            upload_file,
        },
    },
    services::browser_service::BrowserService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the route table. The router carries `BrowserService` to all handlers.
pub fn routes() -> Router<BrowserService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/api/buckets", get(list_buckets).post(create_bucket))
        // Browser routes
        .route("/api/buckets/{bucket}/objects", get(list_objects))
        .route("/api/buckets/{bucket}/objects/{*key}", delete(delete_object))
        .route("/api/buckets/{bucket}/tree", get(folder_tree))
        .route("/api/buckets/{bucket}/search", get(search))
        .route("/api/buckets/{bucket}/upload", post(upload_file))
        .route("/api/buckets/{bucket}/folder", post(create_folder))
        .route("/api/buckets/{bucket}/download/{*key}", get(download_file))
}

/// Routes plus the HTTP layers: open CORS, request tracing and the upload
/// body limit.
pub fn app(service: BrowserService, max_upload_bytes: usize) -> Router {
    routes()
        .with_state(service)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
