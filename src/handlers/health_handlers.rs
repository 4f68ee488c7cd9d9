//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness ("ok")
//! - GET /readyz   -> readiness: SQLite round trip, blob store round trip,
//!   and the count of audit entries lost since startup

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Never performs I/O.
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
/// 200 when SQLite and the blob store both answer, 503 otherwise. Lost audit
/// entries are reported but do not make the service unready.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite_check = match state.store.ping().await {
        Ok(()) => CheckStatus::ok(),
        Err(err) => CheckStatus::failed(format!("error: {err}")),
    };

    let blob_check = probe_blob_store(&state).await;

    let overall_ok = sqlite_check.ok && blob_check.ok;
    let mut checks = HashMap::new();
    checks.insert("sqlite", sqlite_check);
    checks.insert("blobs", blob_check);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
        audit_failures: state.audit.failure_count(),
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Write, check and remove a throwaway payload.
async fn probe_blob_store(state: &AppState) -> CheckStatus {
    let path = match state
        .blobs
        .put("readyz.probe", Bytes::from_static(b"readyz"))
        .await
    {
        Ok(path) => path,
        Err(err) => return CheckStatus::failed(format!("could not write probe: {err}")),
    };

    let found = state.blobs.exists(&path).await;
    let removed = state.blobs.delete(&path).await;
    match (found, removed) {
        (Ok(true), Ok(())) => CheckStatus::ok(),
        (Ok(false), _) => CheckStatus::failed("probe vanished after write".into()),
        (Err(err), _) => CheckStatus::failed(format!("could not stat probe: {err}")),
        (Ok(true), Err(err)) => CheckStatus {
            ok: true,
            error: Some(format!("could not remove probe: {err}")),
        },
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
    audit_failures: u64,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
