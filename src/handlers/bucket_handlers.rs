//! HTTP handlers for bucket-level operations.

use crate::{errors::AppError, models::bucket::Bucket, services::browser_service::BrowserService};
use axum::{Form, Json, extract::State};
use serde::{Deserialize, Serialize};

/// Form body of `POST /api/buckets`.
#[derive(Debug, Deserialize)]
pub struct CreateBucketForm {
    pub bucket_name: String,
    pub region: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateBucketResponse {
    pub message: String,
    pub name: String,
}

/// `GET /api/buckets`
pub async fn list_buckets(
    State(service): State<BrowserService>,
) -> Result<Json<Vec<Bucket>>, AppError> {
    let buckets = service
        .list_buckets()
        .await
        .map_err(|err| AppError::from_browser("list buckets", err))?;
    Ok(Json(buckets))
}

/// `POST /api/buckets`
pub async fn create_bucket(
    State(service): State<BrowserService>,
    Form(form): Form<CreateBucketForm>,
) -> Result<Json<CreateBucketResponse>, AppError> {
    service
        .create_bucket(&form.bucket_name, form.region.as_deref())
        .await
        .map_err(|err| AppError::from_browser("create bucket", err))?;

    Ok(Json(CreateBucketResponse {
        message: "Bucket created successfully".into(),
        name: form.bucket_name,
    }))
}
