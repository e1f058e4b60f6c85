// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model: the session spine and the per-stage reports.
//!
//! Statuses, intents, actions, and emotions are closed enums; the string
//! forms exist only for the JSON/SQL boundary. Timestamps are epoch
//! milliseconds throughout.

use serde::{Deserialize, Serialize};

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// -- Session ------------------------------------------------------------------

/// Lifecycle status of a session. Advances monotonically; `Error` is
/// terminal from any non-terminal state, `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Queued,
    Processing,
    PerceptionDone,
    IntelligenceDone,
    DecisionDone,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::PerceptionDone => "perception_done",
            Self::IntelligenceDone => "intelligence_done",
            Self::DecisionDone => "decision_done",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "perception_done" => Some(Self::PerceptionDone),
            "intelligence_done" => Some(Self::IntelligenceDone),
            "decision_done" => Some(Self::DecisionDone),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Position in the pipeline ordering. `Error` sorts last so the
    /// monotonicity check treats it as reachable from anywhere.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::PerceptionDone => 2,
            Self::IntelligenceDone => 3,
            Self::DecisionDone => 4,
            Self::Completed => 5,
            Self::Error => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether a transition from `self` to `next` is legal: strictly
    /// forward, or to `Error` from any non-terminal state.
    pub fn allows(&self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Error {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The spine of the pipeline: one row per ring session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub device_id: String,
    pub created_at: u64,
    pub last_updated_at: u64,
    pub status: SessionStatus,
    pub risk_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_action: Option<FinalAction>,
}

impl Session {
    pub fn new(id: String, device_id: String) -> Self {
        let now = epoch_ms();
        Self {
            id,
            device_id,
            created_at: now,
            last_updated_at: now,
            status: SessionStatus::Queued,
            risk_score: 0.0,
            final_action: None,
        }
    }
}

// -- Ingress ------------------------------------------------------------------

/// A ring event as delivered by the transport. Not persisted as-is; media
/// bytes are written to the filesystem before the event is enqueued.
#[derive(Debug, Clone, Default)]
pub struct RingEvent {
    pub session_id: Option<String>,
    pub timestamp: u64,
    pub device_id: String,
    pub image_bytes: Option<Vec<u8>>,
    pub audio_bytes: Option<Vec<u8>>,
    pub metadata: Option<serde_json::Value>,
}

// -- Perception ---------------------------------------------------------------

/// Perceived emotional register of the visitor, inferred from the
/// transcript by rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Aggressive,
    Distressed,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Aggressive => "aggressive",
            Self::Distressed => "distressed",
        }
    }

    /// Contribution of this emotion to the composite risk base.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Neutral => 0.2,
            Self::Distressed => 0.4,
            Self::Aggressive => 0.6,
        }
    }
}

/// A single detected object with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f64,
}

/// Output of the Perception stage. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionReport {
    pub session_id: String,
    pub person_detected: bool,
    pub objects: Vec<DetectedObject>,
    pub vision_confidence: f64,
    pub transcript: String,
    pub stt_confidence: f64,
    pub emotion: Emotion,
    pub anti_spoof_score: f64,
    pub weapon_detected: bool,
    pub weapon_confidence: f64,
    pub weapon_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub timestamp: u64,
}

impl PerceptionReport {
    /// True when a `package` object was seen by the vision stage.
    pub fn package_detected(&self) -> bool {
        self.objects.iter().any(|o| o.label.eq_ignore_ascii_case("package"))
    }
}

// -- Intelligence -------------------------------------------------------------

/// Closed set of visitor intents, in classification precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Aggression,
    Help,
    ScamAttempt,
    OccupancyProbe,
    IdentityClaim,
    EntryRequest,
    GovernmentClaim,
    DomesticStaff,
    ReligiousDonation,
    SalesMarketing,
    ChildElderly,
    Delivery,
    Visitor,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggression => "aggression",
            Self::Help => "help",
            Self::ScamAttempt => "scam_attempt",
            Self::OccupancyProbe => "occupancy_probe",
            Self::IdentityClaim => "identity_claim",
            Self::EntryRequest => "entry_request",
            Self::GovernmentClaim => "government_claim",
            Self::DomesticStaff => "domestic_staff",
            Self::ReligiousDonation => "religious_donation",
            Self::SalesMarketing => "sales_marketing",
            Self::ChildElderly => "child_elderly",
            Self::Delivery => "delivery",
            Self::Visitor => "visitor",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the Intelligence stage. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceReport {
    pub session_id: String,
    pub intent: Intent,
    pub reply_text: String,
    pub risk_score: f64,
    pub escalation_required: bool,
    pub tags: Vec<String>,
    pub timestamp: u64,
}

// -- Decision -----------------------------------------------------------------

/// Terminal action chosen by the Decision stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalAction {
    AutoReply,
    NotifyOwner,
    Escalate,
    Ignore,
}

impl FinalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoReply => "auto_reply",
            Self::NotifyOwner => "notify_owner",
            Self::Escalate => "escalate",
            Self::Ignore => "ignore",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auto_reply" => Some(Self::AutoReply),
            "notify_owner" => Some(Self::NotifyOwner),
            "escalate" => Some(Self::Escalate),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }
}

/// Which side effects the Action stage must perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    pub tts: bool,
    pub notify_owner: bool,
    pub escalate: bool,
}

/// Output of the Decision stage. `reason` records the matching rule id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub session_id: String,
    pub final_action: FinalAction,
    pub reason: String,
    pub dispatch: Dispatch,
    pub timestamp: u64,
}

// -- Action -------------------------------------------------------------------

/// Outcome of executing a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Played,
    Queued,
    Ignored,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Played => "played",
            Self::Queued => "queued",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
        }
    }
}

/// Result of the Action stage, persisted as an audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub session_id: String,
    pub status: ActionStatus,
    pub action_type: String,
    pub payload: serde_json::Value,
    pub timestamp: u64,
}

// -- Transcript ---------------------------------------------------------------

/// Speaker role in the per-session conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Visitor,
    Doorbell,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visitor => "visitor",
            Self::Doorbell => "doorbell",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "visitor" => Some(Self::Visitor),
            "doorbell" => Some(Self::Doorbell),
            _ => None,
        }
    }
}

/// Append-only conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: u64,
}

// -- Audit --------------------------------------------------------------------

/// Append-only audit row, written on every stage transition and every
/// externally observable side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: i64,
    pub session_id: String,
    pub agent: String,
    pub action_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub short_reason: String,
    pub timestamp: u64,
}

impl AuditRow {
    /// Build an unsaved row (`id` is assigned by the store on append).
    pub fn new(
        session_id: impl Into<String>,
        agent: impl Into<String>,
        action_type: impl Into<String>,
        payload: serde_json::Value,
        status: impl Into<String>,
        short_reason: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            session_id: session_id.into(),
            agent: agent.into(),
            action_type: action_type.into(),
            payload,
            status: status.into(),
            short_reason: short_reason.into(),
            timestamp: epoch_ms(),
        }
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
