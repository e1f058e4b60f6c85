// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decision stage: pure rule evaluator, no IO, no state.
//!
//! Rules fire in order, first match wins — except escalation, which
//! always wins over any other match. `reason` records the rule id.

use crate::types::{epoch_ms, Directive, Dispatch, FinalAction, IntelligenceReport};

/// Risk at or above which a session always escalates.
pub const ESCALATE_THRESHOLD: f64 = 0.70;

/// Risk below which a permitted device may auto-reply.
pub const AUTO_REPLY_THRESHOLD: f64 = 0.40;

/// Evaluate the policy for one session.
pub fn decide(report: &IntelligenceReport, auto_reply_permitted: bool) -> Directive {
    let (final_action, reason, dispatch) =
        if report.escalation_required || report.risk_score >= ESCALATE_THRESHOLD {
            (
                FinalAction::Escalate,
                "R1",
                Dispatch { tts: true, notify_owner: true, escalate: true },
            )
        } else if report.risk_score < AUTO_REPLY_THRESHOLD && auto_reply_permitted {
            (
                FinalAction::AutoReply,
                "R2",
                Dispatch { tts: true, notify_owner: false, escalate: false },
            )
        } else if report.risk_score < ESCALATE_THRESHOLD
            && report.risk_score >= AUTO_REPLY_THRESHOLD
        {
            (
                FinalAction::NotifyOwner,
                "R3",
                Dispatch { tts: false, notify_owner: true, escalate: false },
            )
        } else {
            (
                FinalAction::NotifyOwner,
                "R4",
                Dispatch { tts: false, notify_owner: true, escalate: false },
            )
        };

    Directive {
        session_id: report.session_id.clone(),
        final_action,
        reason: reason.to_owned(),
        dispatch,
        timestamp: epoch_ms(),
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
