// Copyright 2026 Veriscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for Veriscope.
//!
//! The service boundary is deliberately thin: it validates the request
//! body, invokes the orchestrator, and maps fatal capture errors onto
//! stable error codes. Non-fatal conditions are invisible here except
//! through the shape of the returned data.

use crate::capture::orchestrator::Orchestrator;
use crate::capture::request::{CaptureMode, CaptureRequest};
use crate::capture::session::CaptureSession;
use crate::driver::Viewport;
use crate::error::CaptureError;
use crate::events::{self, EventBus};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Shared state behind every endpoint.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub events: Arc<EventBus>,
    pub started_at: Instant,
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/capture", post(handle_capture))
        .route("/api/v1/events", get(events_sse))
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server on the given port. Runs until ctrl-c.
pub async fn start(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

// ── Request body ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureBody {
    pub url: Option<String>,
    pub mode: Option<String>,
    pub token: Option<String>,
    pub max_screenshots: Option<i64>,
    pub viewport: Option<ViewportBody>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ViewportBody {
    pub width: u32,
    pub height: u32,
}

/// Validate a boundary request body into a [`CaptureRequest`]. All
/// validation failures are reported before the browser engine is touched.
pub fn validate_body(body: CaptureBody) -> Result<CaptureRequest, CaptureError> {
    let url = body
        .url
        .ok_or_else(|| CaptureError::Validation("'url' is required".into()))?;
    let mode = body
        .mode
        .ok_or_else(|| CaptureError::Validation("'mode' is required".into()))?;
    let mode = CaptureMode::parse(&mode)?;
    let viewport = body.viewport.map(|v| Viewport {
        width: v.width,
        height: v.height,
    });
    CaptureRequest::new(&url, mode, body.token, body.max_screenshots, viewport)
}

// ── Handlers ────────────────────────────────────────────────────

/// Service identity and current timestamp. Always succeeds while the
/// process is up; never launches a browser.
async fn health() -> Json<Value> {
    Json(json!({
        "service": "veriscope",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime_s = state.started_at.elapsed().as_secs_f64();
    Json(json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_s,
        "active_contexts": state.orchestrator.driver().active_contexts(),
        "pool": {
            "active": state.orchestrator.pool().active(),
            "max": state.orchestrator.pool().max(),
            "poisoned": state.orchestrator.pool().is_poisoned(),
        },
        "capture_dir": state.orchestrator.store().dir().display().to_string(),
    }))
}

async fn handle_capture(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CaptureBody>,
) -> (StatusCode, Json<Value>) {
    let request = match validate_body(body) {
        Ok(r) => r,
        Err(e) => return failure(&e),
    };
    match state.orchestrator.capture(request).await {
        Ok(session) => (StatusCode::OK, Json(success_payload(&session))),
        Err(e) => failure(&e),
    }
}

fn failure(e: &CaptureError) -> (StatusCode, Json<Value>) {
    let status = match e {
        CaptureError::Validation(_) => StatusCode::BAD_REQUEST,
        CaptureError::DriverUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CaptureError::NavigationFailed(_) | CaptureError::Capture(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(json!({
            "success": false,
            "error": e.code(),
            "message": e.to_string(),
        })),
    )
}

fn success_payload(session: &CaptureSession) -> Value {
    let mut value = serde_json::to_value(session).unwrap_or_default();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("success".to_string(), Value::Bool(true));
    }
    value
}

/// SSE query parameters.
#[derive(Deserialize, Default)]
struct EventsParams {
    session: Option<String>,
}

/// Server-Sent Events endpoint for real-time capture events.
///
/// Subscribes to the event bus and streams events as SSE. Optionally
/// filters by session via `?session=<id>`.
async fn events_sse(
    Query(params): Query<EventsParams>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let session_filter = params.session;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(ref session) = session_filter {
                        if !events::event_matches_session(&event, session) {
                            continue;
                        }
                    }
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Missed some events due to slow consumer — continue
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::request::CaptureMode;
    use crate::capture::session::{ProfileData, SessionOutcome};
    use assert_json_diff::assert_json_include;

    fn body(json: Value) -> CaptureBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_validate_requires_url_and_mode() {
        let e = validate_body(body(json!({ "mode": "PROFILE_EXTRACTION" }))).err().unwrap();
        assert!(e.to_string().contains("'url'"));

        let e = validate_body(body(json!({ "url": "https://ebay.com/usr/x" }))).err().unwrap();
        assert!(e.to_string().contains("'mode'"));
    }

    #[test]
    fn test_validate_rejects_unknown_mode_literal() {
        let e = validate_body(body(json!({
            "url": "https://ebay.com/usr/x",
            "mode": "SCREENSHOT_ONLY",
        })))
        .err()
        .unwrap();
        assert_eq!(e.code(), "E_VALIDATION");
    }

    #[test]
    fn test_validate_requires_token_for_token_in_bio() {
        let e = validate_body(body(json!({
            "url": "https://ebay.com/usr/x",
            "mode": "TOKEN_IN_BIO",
        })))
        .err()
        .unwrap();
        assert!(e.to_string().contains("'token'"));
    }

    #[test]
    fn test_validate_clamps_budget_and_reads_viewport() {
        let req = validate_body(body(json!({
            "url": "https://ebay.com/usr/x",
            "mode": "PROFILE_EXTRACTION",
            "maxScreenshots": 9,
            "viewport": { "width": 1440, "height": 900 },
        })))
        .unwrap();
        assert_eq!(req.max_screenshots(), 3);
        assert_eq!(req.viewport().width, 1440);
    }

    #[test]
    fn test_failure_status_mapping() {
        let (status, _) = failure(&CaptureError::Validation("x".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = failure(&CaptureError::DriverUnavailable("x".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, body) = failure(&CaptureError::NavigationFailed("x".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.0["success"], false);
        assert_eq!(body.0["error"], "E_NAVIGATION_FAILED");
    }

    #[test]
    fn test_success_payload_shape() {
        let session = CaptureSession {
            session_id: "1700-abc".into(),
            platform: "ebay".into(),
            mode: CaptureMode::ProfileExtraction,
            screenshots: vec![],
            token_verification: None,
            profile_data: ProfileData::default(),
            captured_at: Utc::now(),
            outcome: SessionOutcome::Success,
            skips: vec![],
        };
        let payload = success_payload(&session);
        assert_json_include!(
            actual: payload,
            expected: json!({
                "success": true,
                "sessionId": "1700-abc",
                "platform": "ebay",
                "mode": "PROFILE_EXTRACTION",
                "tokenVerification": null,
            })
        );
    }
}
