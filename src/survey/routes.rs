//! REST + WebSocket endpoints that drive the survey sequencer.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SurveyError;

use super::sequencer::{SurveySequencer, SurveyStatus};
use super::stage::SurveyStageId;
use super::sync::{SyncEvent, SyncOutcome};

/// Shared state for survey routes.
#[derive(Clone)]
pub struct SurveyRouteState {
    pub sequencer: Arc<SurveySequencer>,
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurveyWsMessage {
    /// Full session snapshot, sent on connect and after a lagged receiver.
    Status { status: SurveyStatus },
    /// Outcome of one background step sync.
    Sync {
        session_id: Uuid,
        stage: SurveyStageId,
        stage_number: u32,
        outcome: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl From<&SyncEvent> for SurveyWsMessage {
    fn from(event: &SyncEvent) -> Self {
        let (outcome, detail) = match &event.outcome {
            SyncOutcome::Saved => ("saved", None),
            SyncOutcome::Skipped(reason) => ("skipped", Some(format!("{reason:?}"))),
            SyncOutcome::Failed(e) => ("failed", Some(e.to_string())),
        };
        Self::Sync {
            session_id: event.session_id,
            stage: event.stage,
            stage_number: event.stage_number,
            outcome,
            detail,
        }
    }
}

/// Actions a WebSocket client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SurveyAction {
    Show,
    Advance {
        stage: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    Back {
        stage: String,
    },
    Skip,
    Complete {
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Build the survey router.
pub fn survey_routes(state: SurveyRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/survey/status", get(get_status))
        .route("/api/survey/show", post(show))
        .route("/api/survey/resume", post(resume))
        .route("/api/survey/stages/{stage}/advance", post(advance))
        .route("/api/survey/stages/{stage}/back", post(back))
        .route("/api/survey/skip", post(skip))
        .route("/api/survey/complete", post(complete))
        .route("/api/survey/ws", get(ws_handler))
        .with_state(state)
}

fn error_response(err: SurveyError) -> Response {
    let status = match err {
        SurveyError::UnknownStage(_) => StatusCode::BAD_REQUEST,
        SurveyError::AlreadyOpen(_)
        | SurveyError::StageNotActive { .. }
        | SurveyError::NoPredecessor(_)
        | SurveyError::NotTerminalStage(_)
        | SurveyError::TransitionInFlight
        | SurveyError::Finished => StatusCode::CONFLICT,
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "survey-flow"
    }))
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn get_status(State(state): State<SurveyRouteState>) -> impl IntoResponse {
    Json(state.sequencer.status().await)
}

async fn show(State(state): State<SurveyRouteState>) -> Response {
    match state.sequencer.show_survey().await {
        Ok(stage) => Json(serde_json::json!({"stage": stage})).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/survey/resume
///
/// Reopens the persisted stage, if any. `stage` is null when there was
/// nothing to resume.
async fn resume(State(state): State<SurveyRouteState>) -> impl IntoResponse {
    let stage = state.sequencer.resume().await;
    Json(serde_json::json!({"stage": stage}))
}

/// An empty body is a null payload; anything else must be JSON.
fn parse_payload(body: &Bytes) -> Result<serde_json::Value, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": format!("Invalid JSON payload: {e}")})),
        )
            .into_response()
    })
}

/// POST /api/survey/stages/{stage}/advance
///
/// The request body is the stage's answer payload.
async fn advance(
    State(state): State<SurveyRouteState>,
    Path(stage): Path<String>,
    body: Bytes,
) -> Response {
    let stage = match stage.parse::<SurveyStageId>() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    let payload = match parse_payload(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.sequencer.advance(stage, payload).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

async fn back(State(state): State<SurveyRouteState>, Path(stage): Path<String>) -> Response {
    let stage = match stage.parse::<SurveyStageId>() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    match state.sequencer.retreat(stage).await {
        Ok(previous) => Json(serde_json::json!({"stage": previous})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn skip(State(state): State<SurveyRouteState>) -> Response {
    match state.sequencer.skip_all().await {
        Ok(closed) => Json(serde_json::json!({"closed": closed})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn complete(State(state): State<SurveyRouteState>, body: Bytes) -> Response {
    let payload = match parse_payload(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.sequencer.complete(payload).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SurveyRouteState>) -> impl IntoResponse {
    info!("Survey WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.sequencer))
}

async fn send_json(socket: &mut WebSocket, msg: &SurveyWsMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode WS message");
            true
        }
    }
}

async fn send_status(socket: &mut WebSocket, sequencer: &SurveySequencer) -> bool {
    let status = sequencer.status().await;
    send_json(socket, &SurveyWsMessage::Status { status }).await
}

async fn handle_socket(mut socket: WebSocket, sequencer: Arc<SurveySequencer>) {
    // Subscribe before the snapshot so no sync outcome falls in between.
    let mut rx = sequencer.subscribe_sync();

    if !send_status(&mut socket, &sequencer).await {
        warn!("Failed to send initial status, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_json(&mut socket, &SurveyWsMessage::from(&event)).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind sync events");
                        if !send_status(&mut socket, &sequencer).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Sync event channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &sequencer).await;
                        if !send_status(&mut socket, &sequencer).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Survey WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Survey WebSocket connection closed");
}

async fn handle_client_message(text: &str, sequencer: &SurveySequencer) {
    let action = match serde_json::from_str::<SurveyAction>(text) {
        Ok(action) => action,
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
            return;
        }
    };

    let result = match action {
        SurveyAction::Show => sequencer.show_survey().await.map(|_| ()),
        SurveyAction::Advance { stage, payload } => match stage.parse() {
            Ok(stage) => sequencer.advance(stage, payload).await.map(|_| ()),
            Err(e) => Err(e),
        },
        SurveyAction::Back { stage } => match stage.parse() {
            Ok(stage) => sequencer.retreat(stage).await.map(|_| ()),
            Err(e) => Err(e),
        },
        SurveyAction::Skip => sequencer.skip_all().await.map(|_| ()),
        SurveyAction::Complete { payload } => sequencer.complete(payload).await.map(|_| ()),
    };

    if let Err(e) = result {
        warn!(error = %e, "Survey action rejected via WS");
    }
}
