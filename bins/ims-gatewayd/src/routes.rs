// SPDX-License-Identifier: Apache-2.0
//! Ingress adapter: HTTP routes distinguished by integration type,
//! grounded on `bins/jitosd/src/main.rs`'s router/`with_state` pattern and
//! on `listener.py`'s three Flask routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tracing::info;

use ims_config::Config;
use ims_dispatch::{validate_v2_payload, DestinationType, EventTask, EventWorkers};
use ims_kernel::is_integration_key;

#[derive(Clone)]
pub struct AppState {
    pub event_workers: Arc<EventWorkers>,
    pub base_url: String,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/integration/{key}/enqueue", post(enqueue_v1))
        .route("/x-ere/{key}", post(enqueue_x_ere))
        .route("/v2/enqueue", post(enqueue_v2))
        .with_state(state)
}

async fn enqueue_v1(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    enqueue_arbitrary(&state, key, body, DestinationType::V1)
}

async fn enqueue_x_ere(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    enqueue_arbitrary(&state, key, body, DestinationType::XEre)
}

fn enqueue_arbitrary(
    state: &AppState,
    routing_key: String,
    body: axum::body::Bytes,
    destination_type: DestinationType,
) -> (StatusCode, &'static str) {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "Bad request");
    }
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "Bad request");
    };
    if state.config.log_events {
        info!(routing_key = %routing_key, ?destination_type, "enqueuing event");
    }
    state.event_workers.enqueue(EventTask {
        routing_key,
        payload,
        base_url: state.base_url.clone(),
        destination_type,
    });
    (StatusCode::OK, "Message enqueued")
}

async fn enqueue_v2(State(state): State<AppState>, body: axum::body::Bytes) -> impl IntoResponse {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "Bad request");
    }
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "Bad request");
    };
    if validate_v2_payload(&payload).is_err() {
        return (StatusCode::BAD_REQUEST, "Invalid PD events v2 payload");
    }
    let Some(routing_key) = payload.get("routing_key").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, "Invalid routing key");
    };
    if !is_integration_key(routing_key) {
        return (StatusCode::BAD_REQUEST, "Invalid routing key");
    }

    if state.config.log_events {
        info!(routing_key, "enqueuing v2 event");
    }
    state.event_workers.enqueue(EventTask {
        routing_key: routing_key.to_string(),
        payload,
        base_url: state.base_url.clone(),
        destination_type: DestinationType::V2,
    });
    (StatusCode::OK, "Message enqueued")
}
