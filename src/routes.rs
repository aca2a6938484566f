// src/routes.rs

//! HTTP handlers for the OpenAI-compatible surface.

use crate::{
    core::CommittedStream,
    error::{AppError, Result},
    state::AppState,
    upstream::{UpstreamRequest, UpstreamResponse},
};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc};
use tracing::{info, warn};

/// Health check handler, also served at the root path.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Response> {
    info!("Handling models list request");
    let response = state.orchestrator.execute(UpstreamRequest::list_models()).await?;
    let mut models = into_payload(response)?;
    filter_models(&mut models, &state.config.available_models);
    Ok(Json(models).into_response())
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response> {
    let request = UpstreamRequest::chat_completion(parse_body(&body)?);
    info!(model = ?request.model, stream = request.stream, "Handling chat completion request");

    match state.orchestrator.execute(request).await? {
        UpstreamResponse::Payload(value) => Ok(Json(value).into_response()),
        UpstreamResponse::Stream(stream) => Ok(event_stream(stream)),
    }
}

pub async fn embeddings(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response> {
    let request = UpstreamRequest::embedding(parse_body(&body)?);
    info!(model = ?request.model, "Handling embedding request");

    let response = state.orchestrator.execute(request).await?;
    Ok(Json(into_payload(response)?).into_response())
}

pub async fn list_keys(State(state): State<Arc<AppState>>) -> Json<Value> {
    let report = state.reporter.report();
    Json(json!({
        "status": "success",
        "data": {
            "valid_keys": report.valid_keys,
            "invalid_keys": report.invalid_keys,
            "cooling_keys": report.cooling_keys,
        },
        "total": report.total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RevalidateRequest {
    pub key: String,
}

/// Puts a key back into rotation, whatever its current status.
pub async fn revalidate_key(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Value>> {
    let request: RevalidateRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::RequestBodyError(e.to_string()))?;

    let key = request.key.trim();
    state.pool.mark_valid(key)?;
    let record = state.pool.get(key)?;
    Ok(Json(json!({
        "status": "success",
        "key": record.preview(),
        "state": record.status().label(),
    })))
}

fn parse_body(body: &Bytes) -> Result<Value> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| AppError::RequestBodyError(e.to_string()))?;
    if !value.is_object() {
        return Err(AppError::RequestBodyError(
            "request body must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn into_payload(response: UpstreamResponse) -> Result<Value> {
    match response {
        UpstreamResponse::Payload(value) => Ok(value),
        UpstreamResponse::Stream(_) => Err(AppError::Internal(
            "upstream streamed a response that was requested as JSON".to_string(),
        )),
    }
}

/// Keeps only the configured models. An empty list means no filtering.
fn filter_models(models: &mut Value, available: &[String]) {
    if available.is_empty() {
        return;
    }
    if let Some(data) = models.get_mut("data").and_then(Value::as_array_mut) {
        data.retain(|model| {
            model
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| available.iter().any(|allowed| allowed == id))
        });
    }
}

/// Relays a committed upstream stream as `text/event-stream`. An upstream
/// failure mid-stream becomes one final `data:` event carrying the error.
fn event_stream(stream: CommittedStream) -> Response {
    let body = stream.map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(chunk) => chunk,
            Err(error) => {
                warn!(error = %error, "Relaying stream failure to client");
                let event = json!({
                    "error": {
                        "message": error.to_string(),
                        "type": "upstream_stream_error",
                    }
                });
                Bytes::from(format!("data: {event}\n\n"))
            }
        })
    });

    (
        [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(body),
    )
        .into_response()
}
