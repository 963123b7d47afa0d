//! # HTTP Routes
//!
//! ```text
//! PUT|POST /mdm                                device check-in (plist)
//! GET      /devices                            registered devices (JSON)
//! POST     /devices/{udid}/command             queue a plist command
//! POST     /devices/{udid}/declarative-management
//!                                              queue a DDM sync (JSON tokens)
//! GET      /health                             database liveness
//! ```

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tracing::debug;

use vex_core::{DeclarativeManagementData, Device};

use crate::error::ServerResult;
use crate::services::EnqueueReport;
use crate::wire;
use crate::AppState;

/// Builds the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mdm", put(checkin_handler).post(checkin_handler))
        .route("/devices", get(list_devices_handler))
        .route("/devices/{udid}/command", post(enqueue_command_handler))
        .route(
            "/devices/{udid}/declarative-management",
            post(declarative_management_handler),
        )
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Device check-in. Answers with the next command, or an empty 200.
async fn checkin_handler(State(state): State<Arc<AppState>>, body: Bytes) -> ServerResult<Response> {
    let (enrollment, message) = wire::decode_inbound(&body)?;

    match state.checkin.handle(&enrollment, message).await? {
        Some(payload) => {
            debug!(udid = %enrollment.udid, bytes = payload.len(), "Responding with command");
            Ok(([(header::CONTENT_TYPE, "application/xml")], payload).into_response())
        }
        None => Ok(StatusCode::OK.into_response()),
    }
}

async fn list_devices_handler(State(state): State<Arc<AppState>>) -> ServerResult<Json<Vec<Device>>> {
    Ok(Json(state.registry.list_devices().await?))
}

async fn enqueue_command_handler(
    State(state): State<Arc<AppState>>,
    Path(udid): Path<String>,
    body: Bytes,
) -> ServerResult<Json<EnqueueReport>> {
    let device = state.registry.get_device(&udid).await?;
    let command = wire::decode_command(&body)?;
    let report = state.commander.enqueue(&[command], &[device]).await?;
    Ok(Json(report))
}

async fn declarative_management_handler(
    State(state): State<Arc<AppState>>,
    Path(udid): Path<String>,
    Json(data): Json<DeclarativeManagementData>,
) -> ServerResult<Json<EnqueueReport>> {
    let device = state.registry.get_device(&udid).await?;
    let report = state.commander.declarative_management(&data, &[device]).await?;
    Ok(Json(report))
}

/// Health check endpoint.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_healthy().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
    }
}
