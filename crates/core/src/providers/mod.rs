// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injectable provider capabilities.
//!
//! The pipeline treats vision, speech-to-text, reply generation, and TTS
//! synthesis as narrow contracts behind object-safe traits; swapping an
//! implementation never changes the pipeline. Timeouts are enforced by
//! the orchestrator, not by providers.

pub mod command_tts;
pub mod disabled;
pub mod http_reply;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DetectedObject, Role};

/// Boxed provider future, object-safe for `Arc<dyn …>` injection.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

// -- Perception ---------------------------------------------------------------

/// Raw output of the vision+STT stack, before the perception agent adds
/// the anti-spoof score and emotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPerception {
    pub person_detected: bool,
    pub objects: Vec<DetectedObject>,
    pub vision_confidence: f64,
    pub transcript: String,
    pub stt_confidence: f64,
    pub weapon_detected: bool,
    pub weapon_confidence: f64,
    pub weapon_labels: Vec<String>,
}

impl RawPerception {
    /// The degraded shape: no person, zeroed confidences, empty fields.
    pub fn degraded() -> Self {
        Self {
            person_detected: false,
            objects: Vec::new(),
            vision_confidence: 0.0,
            transcript: String::new(),
            stt_confidence: 0.0,
            weapon_detected: false,
            weapon_confidence: 0.0,
            weapon_labels: Vec::new(),
        }
    }
}

/// Vision + STT capability: given media paths, describe who is at the
/// door. May return the degraded shape instead of failing.
pub trait Perception: Send + Sync {
    fn detect(
        &self,
        image_path: Option<PathBuf>,
        audio_path: Option<PathBuf>,
    ) -> ProviderFuture<'_, RawPerception>;
}

// -- Speech-to-text -----------------------------------------------------------

/// A transcribed utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttResult {
    pub transcript: String,
    pub confidence: f64,
}

/// Standalone transcription capability (the `/api/transcribe` seam).
pub trait Stt: Send + Sync {
    fn transcribe(&self, audio_path: PathBuf) -> ProviderFuture<'_, SttResult>;
}

// -- Reply generation ---------------------------------------------------------

/// Bounded context handed to the reply provider: system prompt, the last
/// two transcript turns at most, and a one-line perception summary.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyContext {
    pub system_prompt: String,
    pub turns: Vec<(Role, String)>,
    pub perception_summary: String,
}

/// LLM-backed reply capability. Callers own deadlines, retries, and the
/// canned fallback; implementations do one attempt.
pub trait Reply: Send + Sync {
    fn generate(&self, context: ReplyContext) -> ProviderFuture<'_, String>;
}

// -- TTS ----------------------------------------------------------------------

/// Synthesis voice, auto-detected from the reply script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    English,
    Hindi,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "english",
            Self::Hindi => "hindi",
        }
    }
}

/// Text-to-speech capability writing a wav file at `out_path`.
pub trait TtsEngine: Send + Sync {
    fn synthesize(
        &self,
        text: String,
        voice: Voice,
        out_path: PathBuf,
    ) -> ProviderFuture<'_, ()>;
}
