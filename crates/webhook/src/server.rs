//! The axum surface.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tracing::{debug, warn};
use weft_engine::Executor;

use crate::dispatch::{VerifyAction, bearer_authorized, build_envelope, verify_get};
use crate::lookup::TriggerLookup;
use crate::provider::Provider;

/// Shared state behind the webhook routes.
pub struct WebhookState {
    /// Path → binding resolution.
    pub lookup: Arc<dyn TriggerLookup>,
    /// The engine that executes triggered workflows.
    pub executor: Arc<Executor>,
    /// Environment variables handed to every triggered run.
    pub environment: HashMap<String, String>,
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookState").finish_non_exhaustive()
    }
}

/// Build the webhook router. The embedder decides where it mounts.
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/{*path}", get(handle_verification).post(handle_delivery))
        .with_state(state)
}

async fn handle_verification(
    State(state): State<Arc<WebhookState>>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(binding) = state.lookup.resolve(&path).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match verify_get(binding.provider, &binding.config, &query) {
        VerifyAction::Challenge(challenge) => {
            debug!(%path, "webhook handshake verified");
            (StatusCode::OK, challenge).into_response()
        }
        VerifyAction::Ok => (StatusCode::OK, "OK").into_response(),
        VerifyAction::Forbidden => {
            warn!(%path, "webhook handshake rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

async fn handle_delivery(
    State(state): State<Arc<WebhookState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(binding) = state.lookup.resolve(&path).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if binding.provider == Provider::Generic {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !bearer_authorized(&binding.config, authorization) {
            warn!(%path, "webhook delivery rejected: bad bearer token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let payload = serde_json::from_slice::<Value>(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();
    let envelope = build_envelope(
        &path,
        binding.provider,
        &binding.config,
        payload,
        &header_map,
        "POST",
    );

    debug!(%path, provider = %binding.provider, "dispatching webhook delivery");
    let result = state
        .executor
        .run(
            (*binding.workflow).clone(),
            envelope,
            state.environment.clone(),
        )
        .await;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}
