use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{
        header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;

use crate::cache::SnapshotCache;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status_all))
        .route("/status/{id}", get(status_one))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn status_all(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let snapshot = state.cache.get_or_refresh().await;
    let body = match serde_json::to_vec(&*snapshot) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(target: "api", error = ?e, "snapshot serialization failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let etag = etag_for(&body);
    let matches = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|t| t.trim() == etag));
    if matches {
        return (StatusCode::NOT_MODIFIED, [(ETAG, etag)]).into_response();
    }

    (
        [(CONTENT_TYPE, "application/json".to_string()), (ETAG, etag)],
        body,
    )
        .into_response()
}

async fn status_one(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let snapshot = state.cache.get_or_refresh().await;
    match snapshot.get(&id) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "unknown service", "service_id": id })),
        )
            .into_response(),
    }
}

/// Quoted SHA-256 prefix of the response body.
fn etag_for(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("\"{hex}\"")
}
