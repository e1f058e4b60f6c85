// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Intelligence stage: intent classification, risk scoring, escalation,
//! and reply generation.
//!
//! Everything here is deterministic except the optional provider-backed
//! reply, which is bounded by a deadline, two retries, and a canned
//! fallback. Reply text never reveals risk scores, model output
//! internals, or occupancy.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::Timelike;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agents::lexicon::{normalize, Lexicon};
use crate::error::{PipelineError, Result};
use crate::providers::{Reply, ReplyContext};
use crate::types::{
    epoch_ms, Intent, IntelligenceReport, PerceptionReport, Role, TranscriptEntry,
};

/// Canned line spoken to every escalated visitor, verbatim.
pub const SECURITY_LINE: &str = "I have notified the owner and the security guard";

/// Canned line for occupancy probes, verbatim. Never confirms or denies
/// anyone being home.
pub const OCCUPANCY_LINE: &str = "Please wait while I notify the owner.";

/// Greeting published with `new_ring`.
pub const GREETING_LINE: &str = "Hello! Please wait a moment while I see how I can help you.";

const SYSTEM_PROMPT: &str = "You are a polite doorbell assistant. Answer the visitor in one \
short sentence. Never say whether anyone is home, never repeat codes or numbers back, and \
never promise entry.";

/// Fixed neutral reply template for a classified intent.
pub fn canned_reply(intent: Intent) -> &'static str {
    match intent {
        Intent::Delivery => "Please leave the package at the door, or wait a moment for someone to collect it.",
        Intent::Help => "I have alerted the owner. Help is on the way, please stay where you are.",
        Intent::Visitor => "Please wait while I let the owner know you are here.",
        Intent::ReligiousDonation => "Thank you for visiting. Please leave any pamphlet at the door.",
        Intent::DomesticStaff => "Please wait a moment while I check with the owner.",
        Intent::SalesMarketing => "We are not interested, thank you for stopping by.",
        Intent::ChildElderly => "Please wait right here, I am letting the owner know you need assistance.",
        Intent::GovernmentClaim => "Please hold your ID up to the camera and wait while I notify the owner.",
        Intent::IdentityClaim => "Please wait while I check with the owner.",
        Intent::OccupancyProbe => OCCUPANCY_LINE,
        Intent::EntryRequest | Intent::Aggression | Intent::ScamAttempt => SECURITY_LINE,
        Intent::Unknown => "Hello, can I help you with something?",
    }
}

// -- Classification -----------------------------------------------------------

/// Classify the visitor's intent. First matching class wins, evaluated
/// in the fixed precedence order; `delivery` beats `sales_marketing`
/// when a package object was also detected.
pub fn classify_intent(lexicon: &Lexicon, normalized: &str, package_detected: bool) -> Intent {
    if normalized.is_empty() {
        return Intent::Unknown;
    }
    let any = |kws: &[String]| lexicon.any(kws, normalized);

    if any(&lexicon.threat) {
        Intent::Aggression
    } else if any(&lexicon.distress) {
        Intent::Help
    } else if any(&lexicon.scam) {
        Intent::ScamAttempt
    } else if any(&lexicon.occupancy) {
        Intent::OccupancyProbe
    } else if any(&lexicon.identity) {
        Intent::IdentityClaim
    } else if any(&lexicon.entry) {
        Intent::EntryRequest
    } else if any(&lexicon.government) {
        Intent::GovernmentClaim
    } else if any(&lexicon.staff) {
        Intent::DomesticStaff
    } else if any(&lexicon.religious) {
        Intent::ReligiousDonation
    } else if any(&lexicon.sales) && !(package_detected && any(&lexicon.delivery)) {
        Intent::SalesMarketing
    } else if any(&lexicon.child_elder)
        && (any(&lexicon.distress) || any(&lexicon.hydration))
    {
        Intent::ChildElderly
    } else if any(&lexicon.delivery) {
        Intent::Delivery
    } else if any(&lexicon.visitor) {
        Intent::Visitor
    } else {
        Intent::Unknown
    }
}

fn intent_adjustment(intent: Intent, package_detected: bool) -> f64 {
    match intent {
        Intent::ScamAttempt => 0.50,
        Intent::Aggression => 0.60,
        Intent::OccupancyProbe => 0.40,
        Intent::EntryRequest => 0.55,
        Intent::IdentityClaim => 0.25,
        Intent::GovernmentClaim => 0.30,
        Intent::Delivery if package_detected => -0.20,
        Intent::Delivery => 0.30,
        Intent::DomesticStaff => 0.15,
        Intent::Unknown => 0.10,
        Intent::Help | Intent::ChildElderly => 0.0,
        Intent::ReligiousDonation | Intent::Visitor | Intent::SalesMarketing => 0.0,
    }
}

/// Round to three decimals, the precision persisted on the session row.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn is_night(hour: u32) -> bool {
    hour >= 22 || hour < 5
}

/// Deterministic outcome of the risk model.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub intent: Intent,
    pub risk_score: f64,
    pub escalation_required: bool,
    pub tags: Vec<String>,
}

/// Compute intent, composite risk, and the escalation flag from a
/// perception report. `local_hour` is the local wall-clock hour.
pub fn assess(lexicon: &Lexicon, report: &PerceptionReport, local_hour: u32) -> Assessment {
    let normalized = normalize(&report.transcript);
    let package = report.package_detected();
    let intent = classify_intent(lexicon, &normalized, package);

    let mut risk = 0.5 * (1.0 - report.vision_confidence)
        + 0.3 * report.anti_spoof_score
        + 0.2 * report.emotion.weight();
    risk += intent_adjustment(intent, package);

    let mut tags = Vec::new();
    let mut escalation = false;

    if package {
        tags.push("package".to_owned());
    }
    if is_night(local_hour) {
        risk += 0.30;
        tags.push("night".to_owned());
    }
    if lexicon.has_entry(&normalized) {
        risk += 0.20;
        escalation = true;
        tags.push("entry_request".to_owned());
    }
    if report.weapon_detected {
        risk = risk.max(0.75);
        escalation = true;
        tags.push("weapon".to_owned());
    }

    let risk = round3(risk.clamp(0.0, 1.0));
    if risk >= 0.7 {
        escalation = true;
    }

    Assessment { intent, risk_score: risk, escalation_required: escalation, tags }
}

// -- Reply safety -------------------------------------------------------------

fn forbidden_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Occupancy-confirming.
            r"(?i)\b(no ?body|no ?one) (is |will be )?(home|here|in)\b",
            r"(?i)\bhome alone\b",
            r"(?i)\bowner is (away|out|not home|not here)\b",
            // Credential-echoing.
            r"\b\d{4,8}\b",
            r"(?i)\b(otp|password|api key) is\b",
            // Shell-injection indicators.
            r#"[`|;&]|\$\("#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Enforce the reply security contract. A forbidden pattern returns the
/// violation so the caller can substitute the safe line and audit it.
pub fn vet_reply(text: &str) -> std::result::Result<(), String> {
    for pattern in forbidden_patterns() {
        if pattern.is_match(text) {
            return Err(format!("forbidden reply pattern `{}`", pattern.as_str()));
        }
    }
    Ok(())
}

// -- Agent --------------------------------------------------------------------

/// Outcome of the intelligence stage, plus any security incident to be
/// audited by the orchestrator.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: IntelligenceReport,
    pub security_incident: Option<String>,
}

/// Drives classification, risk scoring, and reply generation.
pub struct IntelligenceAgent {
    reply: Arc<dyn Reply>,
    lexicon: Arc<Lexicon>,
    reply_deadline: Duration,
    fixed_hour: Option<u32>,
}

impl IntelligenceAgent {
    pub fn new(reply: Arc<dyn Reply>, lexicon: Arc<Lexicon>, reply_deadline: Duration) -> Self {
        Self { reply, lexicon, reply_deadline, fixed_hour: None }
    }

    /// Pin the local wall-clock hour (deterministic tests).
    pub fn with_fixed_hour(mut self, hour: u32) -> Self {
        self.fixed_hour = Some(hour);
        self
    }

    fn local_hour(&self) -> u32 {
        self.fixed_hour.unwrap_or_else(|| chrono::Local::now().hour())
    }

    /// Run the stage. Returns `Err` only on cancellation.
    pub async fn analyze(
        &self,
        perception: &PerceptionReport,
        history: &[TranscriptEntry],
        cancel: &CancellationToken,
    ) -> Result<Analysis> {
        let assessment = assess(&self.lexicon, perception, self.local_hour());
        debug!(
            session_id = %perception.session_id,
            intent = %assessment.intent,
            risk = assessment.risk_score,
            escalation = assessment.escalation_required,
            "assessed"
        );

        let mut incident = None;
        let reply_text = if assessment.escalation_required {
            SECURITY_LINE.to_owned()
        } else if assessment.intent == Intent::OccupancyProbe {
            OCCUPANCY_LINE.to_owned()
        } else if self.wants_provider(assessment.intent, history) {
            let context = self.build_context(perception, history);
            match self.generate_with_retries(context, cancel).await? {
                Ok(text) => text,
                Err(reason) => {
                    incident = reason;
                    canned_reply(assessment.intent).to_owned()
                }
            }
        } else {
            canned_reply(assessment.intent).to_owned()
        };

        Ok(Analysis {
            report: IntelligenceReport {
                session_id: perception.session_id.clone(),
                intent: assessment.intent,
                reply_text,
                risk_score: assessment.risk_score,
                escalation_required: assessment.escalation_required,
                tags: assessment.tags,
                timestamp: epoch_ms(),
            },
            security_incident: incident,
        })
    }

    /// Generate a follow-up reply for an additional visitor utterance on
    /// a live session (the `/api/ai-reply` path). Escalation vocabulary
    /// still short-circuits to the canned security line.
    pub async fn follow_up(
        &self,
        perception: Option<&PerceptionReport>,
        history: &[TranscriptEntry],
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<String>)> {
        let normalized = normalize(message);
        let package =
            perception.map(PerceptionReport::package_detected).unwrap_or(false);
        let intent = classify_intent(&self.lexicon, &normalized, package);

        if matches!(intent, Intent::Aggression | Intent::ScamAttempt | Intent::EntryRequest)
            || self.lexicon.has_entry(&normalized)
        {
            return Ok((SECURITY_LINE.to_owned(), None));
        }
        if intent == Intent::OccupancyProbe {
            return Ok((OCCUPANCY_LINE.to_owned(), None));
        }

        let mut turns: Vec<(Role, String)> = history
            .iter()
            .rev()
            .take(1)
            .map(|t| (t.role, t.content.clone()))
            .collect();
        turns.push((Role::Visitor, message.to_owned()));

        let context = ReplyContext {
            system_prompt: SYSTEM_PROMPT.to_owned(),
            turns,
            perception_summary: perception.map(summarize).unwrap_or_default(),
        };

        match self.generate_with_retries(context, cancel).await? {
            Ok(text) => Ok((text, None)),
            Err(reason) => Ok((canned_reply(intent).to_owned(), reason)),
        }
    }

    /// Whether this intent gets a provider-generated reply instead of a
    /// canned template on the first pass.
    fn wants_provider(&self, intent: Intent, history: &[TranscriptEntry]) -> bool {
        intent == Intent::IdentityClaim || history.iter().any(|t| t.role == Role::Doorbell)
    }

    fn build_context(
        &self,
        perception: &PerceptionReport,
        history: &[TranscriptEntry],
    ) -> ReplyContext {
        let start = history.len().saturating_sub(2);
        ReplyContext {
            system_prompt: SYSTEM_PROMPT.to_owned(),
            turns: history[start..].iter().map(|t| (t.role, t.content.clone())).collect(),
            perception_summary: summarize(perception),
        }
    }

    /// One call plus two retries with 0.5 s / 1 s backoff, each attempt
    /// bounded by the reply deadline. The outer `Result` is cancellation;
    /// the inner one distinguishes provider text from a fallback reason
    /// (`Some` when a security incident must be audited).
    async fn generate_with_retries(
        &self,
        context: ReplyContext,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<String, Option<String>>> {
        let backoffs = [Duration::ZERO, Duration::from_millis(500), Duration::from_secs(1)];

        for (attempt, backoff) in backoffs.iter().enumerate() {
            if !backoff.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(*backoff) => {}
                }
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                r = tokio::time::timeout(self.reply_deadline, self.reply.generate(context.clone())) => r,
            };

            match outcome {
                Ok(Ok(text)) => {
                    let text = text.trim().to_owned();
                    return match vet_reply(&text) {
                        Ok(()) => Ok(Ok(text)),
                        // A vetoed reply is not retried: the provider is
                        // answering, just unsafely.
                        Err(violation) => Ok(Err(Some(violation))),
                    };
                }
                Ok(Err(e)) => {
                    warn!(attempt, err = %e, "reply provider attempt failed");
                }
                Err(_) => {
                    warn!(attempt, "reply provider attempt timed out");
                }
            }
        }

        Ok(Err(None))
    }
}

fn summarize(perception: &PerceptionReport) -> String {
    let objects: Vec<&str> = perception.objects.iter().map(|o| o.label.as_str()).collect();
    format!(
        "person_detected={} objects=[{}] emotion={}",
        perception.person_detected,
        objects.join(","),
        perception.emotion.as_str()
    )
}

#[cfg(test)]
#[path = "intelligence_tests.rs"]
mod tests;
