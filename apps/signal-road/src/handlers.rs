use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signal_proto::{
    BookingStatus, CallSession, CandidatePost, SessionDescription, SignalResponse, SignalingRoom,
};
use tracing::{debug, info};

use crate::error::SignalError;
use crate::lifecycle::BridgeOutcome;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

/// Raw `{action, payload}` envelope. The payload is decoded per action so a
/// malformed body surfaces as `invalid_payload` rather than a framework
/// rejection.
#[derive(Debug, Deserialize)]
pub struct SignalEnvelope {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: BookingStatus,
}

/// GET /health
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

/// GET /metrics
pub async fn metrics_text() -> Response {
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], metrics::render()).into_response()
}

/// POST /sessions - register a booking so its participants may signal
pub async fn register_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CallSession>, JsonRejection>,
) -> Result<Json<SignalResponse>, SignalError> {
    state.require_admin(&headers)?;
    let Json(session) = body.map_err(|err| SignalError::InvalidPayload(err.body_text()))?;
    if session.session_id.trim().is_empty() {
        return Err(SignalError::InvalidPayload("session_id is required".into()));
    }
    info!(
        session = %session.session_id,
        status = session.status.as_str(),
        "registering call session"
    );
    state.bookings().register(session).await?;
    Ok(Json(SignalResponse { ok: true }))
}

/// POST /sessions/{id}/status - booking lifecycle transition
pub async fn update_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<BridgeOutcome>, SignalError> {
    state.require_admin(&headers)?;
    let Json(update) = body.map_err(|err| SignalError::InvalidPayload(err.body_text()))?;
    let outcome = state
        .bridge()
        .apply_transition(&session_id, update.status)
        .await?;
    Ok(Json(outcome))
}

/// GET /sessions/{id}/room - current mailbox, or `null` before the first offer
pub async fn get_room(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Option<SignalingRoom>>, SignalError> {
    let caller = state.caller(&headers);
    let room = state
        .service()
        .get_room(&session_id, caller.as_deref())
        .await?;
    Ok(Json(room))
}

/// POST /sessions/{id}/signal - create-offer | create-answer | add-candidate | end
pub async fn post_signal(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<SignalEnvelope>, JsonRejection>,
) -> Result<Json<SignalResponse>, SignalError> {
    let caller = state.caller(&headers);
    let caller = caller.as_deref();
    // Identity problems win over payload problems.
    state.bridge().gate().authorize(caller, &session_id).await?;
    let Json(envelope) = body.map_err(|err| SignalError::InvalidPayload(err.body_text()))?;
    let service = state.service();

    debug!(session = %session_id, action = %envelope.action, "signal received");
    match envelope.action.as_str() {
        "create-offer" => {
            let offer: SessionDescription = decode_payload(envelope.payload)?;
            service.post_offer(&session_id, caller, offer).await?;
        }
        "create-answer" => {
            let answer: SessionDescription = decode_payload(envelope.payload)?;
            service.post_answer(&session_id, caller, answer).await?;
        }
        "add-candidate" => {
            let post: CandidatePost = decode_payload(envelope.payload)?;
            service
                .add_candidate(&session_id, caller, post.role, post.candidate)
                .await?;
        }
        "end" => {
            service.end_room(&session_id, caller).await?;
        }
        other => {
            return Err(SignalError::InvalidPayload(format!("unknown action {other}")));
        }
    }
    Ok(Json(SignalResponse { ok: true }))
}

fn decode_payload<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, SignalError> {
    serde_json::from_value(payload).map_err(|err| SignalError::InvalidPayload(err.to_string()))
}
