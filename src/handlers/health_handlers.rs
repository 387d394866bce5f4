//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the backing store answers

use crate::services::browser_service::BrowserService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, time::Instant};

/// `GET /healthz`
///
/// Very small liveness probe, always 200 OK. Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Lists buckets once as a connectivity and credentials probe. HTTP 200 when
/// the store answers, HTTP 503 otherwise.
pub async fn readyz(State(service): State<BrowserService>) -> impl IntoResponse {
    let started = Instant::now();
    let store_check = match service.store().list_buckets().await {
        Ok(_) => CheckStatus {
            ok: true,
            error: None,
            latency_ms: started.elapsed().as_millis(),
        },
        Err(err) => {
            tracing::warn!("readiness probe failed: {}", err);
            CheckStatus {
                ok: false,
                error: Some(err.to_string()),
                latency_ms: started.elapsed().as_millis(),
            }
        }
    };

    let overall_ok = store_check.ok;
    let mut checks = HashMap::new();
    checks.insert("store", store_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
    latency_ms: u128,
}
