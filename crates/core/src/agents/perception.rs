// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Perception stage: wraps the injectable vision/STT provider and adds
//! the rule-based anti-spoof score and emotion inference.
//!
//! This stage never fails a session — a provider error or timeout
//! produces a degraded report and the pipeline continues.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agents::lexicon::{normalize, Lexicon};
use crate::error::{PipelineError, Result};
use crate::providers::{Perception, RawPerception};
use crate::types::{epoch_ms, Emotion, PerceptionReport};

/// Drives the perception provider and finalizes its raw output.
pub struct PerceptionAgent {
    provider: Arc<dyn Perception>,
    lexicon: Arc<Lexicon>,
}

impl PerceptionAgent {
    pub fn new(provider: Arc<dyn Perception>, lexicon: Arc<Lexicon>) -> Self {
        Self { provider, lexicon }
    }

    /// Run the stage within `budget`. Returns `Err` only on cancellation.
    pub async fn observe(
        &self,
        session_id: &str,
        image_path: Option<PathBuf>,
        audio_path: Option<PathBuf>,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<PerceptionReport> {
        let audio_present = audio_path.is_some();
        let raw = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            outcome = tokio::time::timeout(
                budget,
                self.provider.detect(image_path.clone(), audio_path),
            ) => match outcome {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => {
                    warn!(session_id, err = %e, "perception provider failed, degrading");
                    RawPerception::degraded()
                }
                Err(_) => {
                    warn!(session_id, "perception provider exceeded budget, degrading");
                    RawPerception::degraded()
                }
            },
        };

        Ok(self.finalize(session_id, raw, image_path, audio_present))
    }

    /// Apply the anti-spoof and emotion rules to a raw provider result.
    pub fn finalize(
        &self,
        session_id: &str,
        raw: RawPerception,
        image_path: Option<PathBuf>,
        audio_present: bool,
    ) -> PerceptionReport {
        let normalized = normalize(&raw.transcript);
        let emotion = infer_emotion(&self.lexicon, &normalized);
        let anti_spoof = anti_spoof_score(
            raw.person_detected,
            raw.vision_confidence,
            audio_present,
            raw.transcript.trim().is_empty(),
        );

        PerceptionReport {
            session_id: session_id.to_owned(),
            person_detected: raw.person_detected,
            objects: raw.objects,
            vision_confidence: raw.vision_confidence,
            transcript: raw.transcript,
            stt_confidence: raw.stt_confidence,
            emotion,
            anti_spoof_score: anti_spoof,
            weapon_detected: raw.weapon_detected,
            weapon_confidence: raw.weapon_confidence,
            weapon_labels: raw.weapon_labels,
            image_path: image_path.map(|p| p.to_string_lossy().into_owned()),
            timestamp: epoch_ms(),
        }
    }
}

/// Heuristic chance the ring was not produced by a bona-fide human.
pub fn anti_spoof_score(
    person_detected: bool,
    vision_confidence: f64,
    audio_present: bool,
    transcript_empty: bool,
) -> f64 {
    let mut score: f64 = 0.0;
    if !person_detected {
        score = 0.9;
    } else if vision_confidence < 0.5 {
        score += 0.3;
    }
    if audio_present && transcript_empty {
        score += 0.2;
    }
    if !audio_present {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Rule-based emotion from the normalized transcript: threat vocabulary
/// wins, then distress, else neutral.
pub fn infer_emotion(lexicon: &Lexicon, normalized: &str) -> Emotion {
    if normalized.is_empty() {
        return Emotion::Neutral;
    }
    if lexicon.has_threat(normalized) {
        Emotion::Aggressive
    } else if lexicon.sounds_distressed(normalized) {
        Emotion::Distressed
    } else {
        Emotion::Neutral
    }
}

#[cfg(test)]
#[path = "perception_tests.rs"]
mod tests;
