// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action stage: executes a directive, never decides.
//!
//! `auto_reply` writes the sanitized text preview and synthesizes the
//! spoken reply; `notify_owner` and `escalate` append the owner-facing
//! audit row and publish on the owner channel. Failures are logged and
//! returned as `failed` — the executor never retries on its own.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agents::intelligence::SECURITY_LINE;
use crate::assets::{atomic_write, DataDir};
use crate::bus::{EventBus, PipelineEvent, OWNER_CHANNEL};
use crate::error::{PipelineError, Result};
use crate::oplog::OpLog;
use crate::providers::{TtsEngine, Voice};
use crate::store::Store;
use crate::types::{
    epoch_ms, ActionResult, ActionStatus, AuditRow, Directive, FinalAction, IntelligenceReport,
    PerceptionReport, SessionStatus,
};

/// Maximum characters of reply text passed to the synthesizer.
pub const MAX_REPLY_CHARS: usize = 240;

/// Sanitize reply text for the synthesizer: strip control characters,
/// cap the length, escape double quotes.
pub fn sanitize_reply(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !c.is_control()).collect();
    let capped: String = stripped.chars().take(MAX_REPLY_CHARS).collect();
    capped.replace('"', "\\\"")
}

/// Pick the synthesis voice from the script of the reply.
pub fn detect_voice(text: &str) -> Voice {
    if crate::agents::lexicon::has_devanagari(text) {
        Voice::Hindi
    } else {
        Voice::English
    }
}

/// Executes directives produced by the decision stage.
pub struct ActionAgent {
    tts: Arc<dyn TtsEngine>,
    data: Arc<DataDir>,
    store: Arc<Store>,
    bus: Arc<EventBus>,
    oplog: OpLog,
}

impl ActionAgent {
    pub fn new(
        tts: Arc<dyn TtsEngine>,
        data: Arc<DataDir>,
        store: Arc<Store>,
        bus: Arc<EventBus>,
        oplog: OpLog,
    ) -> Self {
        Self { tts, data, store, bus, oplog }
    }

    /// Execute a directive. Returns `Err` only on cancellation; every
    /// other failure is reported through the result status.
    pub async fn execute(
        &self,
        directive: &Directive,
        intelligence: &IntelligenceReport,
        perception: &PerceptionReport,
        cancel: &CancellationToken,
    ) -> Result<ActionResult> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let session_id = &directive.session_id;
        let result = match directive.final_action {
            FinalAction::AutoReply => {
                self.speak(session_id, &intelligence.reply_text, cancel).await
            }
            FinalAction::NotifyOwner => {
                self.notify(session_id, intelligence, perception, false).await
            }
            FinalAction::Escalate => {
                let notified = self.notify(session_id, intelligence, perception, true).await;
                // The visitor still hears the canned security line; a TTS
                // failure must not mask a successful escalation.
                if let Err(e) = self.speak(session_id, SECURITY_LINE, cancel).await {
                    warn!(session_id, err = %e, "escalation tts failed");
                }
                notified
            }
            FinalAction::Ignore => Ok((ActionStatus::Ignored, serde_json::json!({}))),
        };

        let (status, payload) = match result {
            Ok(ok) => ok,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(session_id, err = %e, "action execution failed");
                self.oplog.push(session_id, "action_failed", Some(&e.to_string()));
                (ActionStatus::Failed, serde_json::json!({ "error": e.to_string() }))
            }
        };

        self.oplog.push(session_id, "action", Some(status.as_str()));
        Ok(ActionResult {
            session_id: session_id.clone(),
            status,
            action_type: directive.final_action.as_str().to_owned(),
            payload,
            timestamp: epoch_ms(),
        })
    }

    /// Write the text preview and synthesize the spoken reply.
    async fn speak(
        &self,
        session_id: &str,
        reply: &str,
        cancel: &CancellationToken,
    ) -> Result<(ActionStatus, serde_json::Value)> {
        let text = sanitize_reply(reply);
        let voice = detect_voice(&text);
        let text_path = self.data.tts_text_path(session_id);
        let wav_path = self.data.tts_wav_path(session_id);

        atomic_write(&text_path, text.as_bytes())
            .map_err(|e| PipelineError::TransientProvider(format!("tts text write: {e}")))?;

        tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            r = self.tts.synthesize(text.clone(), voice, wav_path.clone()) => r?,
        }

        Ok((
            ActionStatus::Played,
            serde_json::json!({
                "text_path": path_str(&text_path),
                "wav_path": path_str(&wav_path),
                "voice": voice.as_str(),
            }),
        ))
    }

    /// Append the owner-facing audit row and publish on the owner channel.
    async fn notify(
        &self,
        session_id: &str,
        intelligence: &IntelligenceReport,
        perception: &PerceptionReport,
        urgent: bool,
    ) -> Result<(ActionStatus, serde_json::Value)> {
        let mut payload = serde_json::json!({
            "message": intelligence.reply_text,
            "risk_score": intelligence.risk_score,
            "image_path": perception.image_path,
        });
        if urgent {
            payload["urgent"] = serde_json::Value::Bool(true);
        }

        self.store.append_audit(&AuditRow::new(
            session_id,
            "action",
            "notify_owner",
            payload.clone(),
            ActionStatus::Queued.as_str(),
            if urgent { "escalation" } else { "" },
        ))?;

        self.bus
            .publish(
                OWNER_CHANNEL,
                PipelineEvent::PipelineStage {
                    session: session_id.to_owned(),
                    status: SessionStatus::DecisionDone,
                    timestamp_ms: epoch_ms(),
                },
            )
            .await;

        Ok((ActionStatus::Queued, payload))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
