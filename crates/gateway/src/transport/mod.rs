// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the gateway.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::GateState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GateState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/health", get(http::health))
        // Ingress
        .route("/api/ring", post(http::ring))
        // Session observation
        .route("/api/session/{id}/status", get(http::session_status))
        .route("/api/session/{id}/detail", get(http::session_detail))
        .route("/api/logs", get(http::logs))
        // Conversation
        .route("/api/ai-reply", post(http::ai_reply))
        .route("/api/owner-reply", post(http::owner_reply))
        // Provider seams
        .route("/api/transcribe", post(http::transcribe))
        .route("/api/tts", post(http::tts))
        // WebSocket
        .route("/api/ws/{channel}", get(ws::ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
