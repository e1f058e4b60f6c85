// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the gateway.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};

use chime::error::PipelineError;
use chime::types::{
    epoch_ms, AuditRow, Directive, IntelligenceReport, PerceptionReport, RingEvent, Session,
    TranscriptEntry,
};

use crate::error::GateError;
use crate::state::GateState;
use crate::transport::auth;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RingRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    pub device_id: String,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RingResponse {
    pub session_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub session_id: String,
    pub status: String,
    pub last_updated: u64,
    pub risk_score: f64,
    pub final_action: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailResponse {
    pub session: Session,
    pub perception: Option<PerceptionReport>,
    pub intelligence: Option<IntelligenceReport>,
    pub decision: Option<Directive>,
    pub transcripts: Vec<TranscriptEntry>,
    pub actions: Vec<AuditRow>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub session: Session,
    pub transcripts: Vec<TranscriptEntry>,
    pub snapshot: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub session_id: String,
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub audio_base64: String,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub transcript: String,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsResponse {
    pub wav_path: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub running: usize,
}

// -- Helpers ------------------------------------------------------------------

fn pipeline_response(e: &PipelineError) -> axum::response::Response {
    GateError::from_pipeline(e).to_http_response(e.to_string()).into_response()
}

fn decode_media(field: &str, value: Option<String>) -> Result<Option<Vec<u8>>, GateError> {
    match value {
        Some(encoded) if !encoded.is_empty() => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|_| {
                tracing::debug!(field, "rejecting undecodable media");
                GateError::BadRequest
            }),
        _ => Ok(None),
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(s): State<Arc<GateState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        sessions: s.orchestrator.active_sessions().await,
        running: s.orchestrator.running_tasks(),
    })
}

/// `POST /api/ring` — ingress for a doorbell event.
///
/// The body is parsed by hand so a malformed payload is a 400, per the
/// ingress contract (only 400/429/503 ever surface here).
pub async fn ring(
    State(s): State<Arc<GateState>>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if s.shutdown.is_cancelled() {
        return GateError::ShuttingDown.to_http_response("shutting down").into_response();
    }

    let req: RingRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return GateError::BadRequest
                .to_http_response(format!("bad payload: {e}"))
                .into_response()
        }
    };

    let image_bytes = match decode_media("image_base64", req.image_base64) {
        Ok(bytes) => bytes,
        Err(e) => return e.to_http_response("invalid image_base64").into_response(),
    };
    let audio_bytes = match decode_media("audio_base64", req.audio_base64) {
        Ok(bytes) => bytes,
        Err(e) => return e.to_http_response("invalid audio_base64").into_response(),
    };

    let event = RingEvent {
        session_id: req.session_id,
        timestamp: req.timestamp.unwrap_or_else(epoch_ms),
        device_id: req.device_id,
        image_bytes,
        audio_bytes,
        metadata: req.metadata,
    };

    match s.orchestrator.ring(event).await {
        Ok(ack) => Json(RingResponse {
            session_id: ack.session_id,
            status: ack.status.as_str().to_owned(),
            greeting: ack.greeting,
        })
        .into_response(),
        Err(e) => pipeline_response(&e),
    }
}

/// `GET /api/session/{id}/status`
pub async fn session_status(
    State(s): State<Arc<GateState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.orchestrator.store().get_session(&id) {
        Ok(Some(session)) => Json(StatusResponse {
            session_id: session.id,
            status: session.status.as_str().to_owned(),
            last_updated: session.last_updated_at,
            risk_score: session.risk_score,
            final_action: session.final_action.map(|a| a.as_str().to_owned()),
        })
        .into_response(),
        Ok(None) => GateError::NotFound.to_http_response("unknown session").into_response(),
        Err(e) => pipeline_response(&e),
    }
}

/// `GET /api/session/{id}/detail` — full reports, transcripts, actions.
pub async fn session_detail(
    State(s): State<Arc<GateState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = s.orchestrator.store();
    let session = match store.get_session(&id) {
        Ok(Some(session)) => session,
        Ok(None) => {
            return GateError::NotFound.to_http_response("unknown session").into_response()
        }
        Err(e) => return pipeline_response(&e),
    };

    let detail = DetailResponse {
        perception: store.get_perception(&id).unwrap_or_default(),
        intelligence: store.get_intelligence(&id).unwrap_or_default(),
        decision: store.get_decision(&id).unwrap_or_default(),
        transcripts: store.list_transcripts(&id).unwrap_or_default(),
        actions: store.list_actions(&id).unwrap_or_default(),
        session,
    };
    Json(detail).into_response()
}

/// `GET /api/logs?limit=N` — recent sessions with transcripts.
pub async fn logs(
    State(s): State<Arc<GateState>>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let store = s.orchestrator.store();
    let limit = query.limit.min(200);
    let sessions = match store.list_sessions(limit, None) {
        Ok(sessions) => sessions,
        Err(e) => return pipeline_response(&e),
    };

    let data = s.orchestrator.data();
    let entries: Vec<LogEntry> = sessions
        .into_iter()
        .map(|session| {
            let transcripts = store.list_transcripts(&session.id).unwrap_or_default();
            let snap = data.snapshot_path(&session.id);
            let snapshot =
                snap.exists().then(|| snap.to_string_lossy().into_owned());
            LogEntry { session, transcripts, snapshot }
        })
        .collect();
    Json(entries).into_response()
}

/// `POST /api/ai-reply` — generate a follow-up reply for a live session.
pub async fn ai_reply(
    State(s): State<Arc<GateState>>,
    Json(req): Json<ConversationRequest>,
) -> impl IntoResponse {
    match s.orchestrator.ai_reply(&req.session_id, &req.message).await {
        Ok(reply) => {
            Json(ReplyResponse { session_id: req.session_id, reply }).into_response()
        }
        Err(e) => pipeline_response(&e),
    }
}

/// `POST /api/owner-reply` — authenticated owner message to the visitor.
pub async fn owner_reply(
    State(s): State<Arc<GateState>>,
    headers: HeaderMap,
    Json(req): Json<ConversationRequest>,
) -> impl IntoResponse {
    if let Err(e) = auth::validate_bearer(&headers, s.auth_token.as_deref()) {
        return e.to_http_response("owner endpoints require a bearer token").into_response();
    }

    match s.orchestrator.owner_reply(&req.session_id, &req.message).await {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(e) => pipeline_response(&e),
    }
}

/// `POST /api/transcribe` — standalone STT.
pub async fn transcribe(
    State(s): State<Arc<GateState>>,
    Json(req): Json<TranscribeRequest>,
) -> impl IntoResponse {
    let bytes = match decode_media("audio_base64", Some(req.audio_base64)) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            return GateError::BadRequest.to_http_response("empty audio").into_response()
        }
        Err(e) => return e.to_http_response("invalid audio_base64").into_response(),
    };

    let session_id = req.session_id.unwrap_or_else(|| "adhoc".to_owned());
    if !chime::assets::valid_session_id(&session_id) {
        return GateError::BadRequest.to_http_response("invalid session id").into_response();
    }
    let data = s.orchestrator.data();
    let path = match data.tmp_audio_path(&session_id, epoch_ms()) {
        Ok(path) => path,
        Err(e) => return GateError::Internal.to_http_response(e.to_string()).into_response(),
    };
    if let Err(e) = chime::assets::atomic_write(&path, &bytes) {
        return GateError::Internal.to_http_response(e.to_string()).into_response();
    }

    match s.stt.transcribe(path).await {
        Ok(result) => Json(TranscribeResponse {
            transcript: result.transcript,
            confidence: result.confidence,
        })
        .into_response(),
        Err(e) => pipeline_response(&e),
    }
}

/// `POST /api/tts` — standalone synthesis.
pub async fn tts(
    State(s): State<Arc<GateState>>,
    Json(req): Json<TtsRequest>,
) -> impl IntoResponse {
    if req.text.trim().is_empty() {
        return GateError::BadRequest.to_http_response("empty text").into_response();
    }

    let session_id = req.session_id.unwrap_or_else(|| "adhoc".to_owned());
    if !chime::assets::valid_session_id(&session_id) {
        return GateError::BadRequest.to_http_response("invalid session id").into_response();
    }
    let text = chime::agents::action::sanitize_reply(&req.text);
    let voice = chime::agents::action::detect_voice(&text);
    let out = s.orchestrator.data().tts_wav_path(&session_id);

    match s.tts.synthesize(text, voice, out.clone()).await {
        Ok(()) => {
            Json(TtsResponse { wav_path: out.to_string_lossy().into_owned() }).into_response()
        }
        Err(e) => pipeline_response(&e),
    }
}

