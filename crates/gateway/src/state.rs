// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use chime::orchestrator::Orchestrator;
use chime::providers::{Stt, TtsEngine};

/// Shared gateway state.
pub struct GateState {
    pub orchestrator: Arc<Orchestrator>,
    pub stt: Arc<dyn Stt>,
    pub tts: Arc<dyn TtsEngine>,
    pub auth_token: Option<String>,
    pub shutdown: CancellationToken,
}
