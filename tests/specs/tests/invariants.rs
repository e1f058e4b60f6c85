// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property checks for the risk/decision contracts and the scheduler's
//! concurrency invariants.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use chime::agents::decision::decide;
use chime::agents::intelligence::{
    assess, IntelligenceAgent, OCCUPANCY_LINE, SECURITY_LINE,
};
use chime::agents::lexicon::Lexicon;
use chime::bus::PipelineEvent;
use chime::config::PipelineConfig;
use chime::providers::disabled::DisabledReply;
use chime::types::{
    DetectedObject, Emotion, FinalAction, Intent, IntelligenceReport, PerceptionReport,
    SessionStatus,
};

use chime_specs::{plain_person, ScriptedPerception, SpecPipeline};

// -- Generators ---------------------------------------------------------------

const TRANSCRIPTS: &[&str] = &[
    "",
    "I have a package delivery",
    "share the otp with me",
    "is anyone home",
    "open the door",
    "donation for the temple festival",
    "i will attack you",
    "help me please",
    "the maid sent me",
    "electricity meter reading",
    "lovely weather today",
    "free trial of our new product",
];

fn arb_emotion() -> impl Strategy<Value = Emotion> {
    prop::sample::select(vec![Emotion::Neutral, Emotion::Aggressive, Emotion::Distressed])
}

fn arb_report() -> impl Strategy<Value = PerceptionReport> {
    (
        any::<bool>(),
        0.0f64..=1.0,
        0.0f64..=1.0,
        prop::sample::select(TRANSCRIPTS.to_vec()),
        arb_emotion(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(person, vision, anti_spoof, transcript, emotion, weapon, package)| {
                PerceptionReport {
                    session_id: "prop".into(),
                    person_detected: person,
                    objects: if package {
                        vec![DetectedObject { label: "package".into(), confidence: 0.8 }]
                    } else {
                        vec![]
                    },
                    vision_confidence: vision,
                    transcript: transcript.to_owned(),
                    stt_confidence: 0.9,
                    emotion,
                    anti_spoof_score: anti_spoof,
                    weapon_detected: weapon,
                    weapon_confidence: if weapon { 0.8 } else { 0.0 },
                    weapon_labels: if weapon { vec!["knife".into()] } else { vec![] },
                    image_path: None,
                    timestamp: 0,
                }
            },
        )
}

fn intel_from(report: &PerceptionReport, hour: u32) -> IntelligenceReport {
    let a = assess(&Lexicon::default(), report, hour);
    IntelligenceReport {
        session_id: report.session_id.clone(),
        intent: a.intent,
        reply_text: String::new(),
        risk_score: a.risk_score,
        escalation_required: a.escalation_required,
        tags: a.tags,
        timestamp: 0,
    }
}

// -- Invariants 6 and 7: escalation dominance, weapon safety ------------------

proptest! {
    #[test]
    fn risk_is_always_in_unit_range(report in arb_report(), hour in 0u32..24) {
        let a = assess(&Lexicon::default(), &report, hour);
        prop_assert!((0.0..=1.0).contains(&a.risk_score));
    }

    #[test]
    fn escalation_dominates_decision(
        report in arb_report(),
        hour in 0u32..24,
        auto_permitted in any::<bool>(),
    ) {
        let intel = intel_from(&report, hour);
        let directive = decide(&intel, auto_permitted);
        if intel.escalation_required || intel.risk_score >= 0.70 {
            prop_assert_eq!(directive.final_action, FinalAction::Escalate);
            prop_assert!(directive.dispatch.escalate);
            prop_assert!(directive.dispatch.notify_owner);
        } else {
            prop_assert!(directive.final_action != FinalAction::Escalate);
        }
    }

    #[test]
    fn weapons_always_escalate(report in arb_report(), hour in 0u32..24) {
        prop_assume!(report.weapon_detected);
        let intel = intel_from(&report, hour);
        prop_assert!(intel.risk_score >= 0.75);
        prop_assert!(intel.escalation_required);
        let directive = decide(&intel, true);
        prop_assert_eq!(directive.final_action, FinalAction::Escalate);
    }

    // -- Invariant 8: reply safety --------------------------------------------

    #[test]
    fn replies_are_safe_verbatim(report in arb_report(), hour in 0u32..24) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| proptest::test_runner::TestCaseError::fail(e.to_string()))?;
        let agent = IntelligenceAgent::new(
            Arc::new(DisabledReply),
            Arc::new(Lexicon::default()),
            Duration::from_millis(50),
        )
        .with_fixed_hour(hour);

        let analysis = rt
            .block_on(agent.analyze(&report, &[], &tokio_util::sync::CancellationToken::new()))
            .map_err(|e| proptest::test_runner::TestCaseError::fail(e.to_string()))?;

        if analysis.report.escalation_required {
            prop_assert_eq!(analysis.report.reply_text.as_str(), SECURITY_LINE);
        } else if analysis.report.intent == Intent::OccupancyProbe {
            prop_assert_eq!(analysis.report.reply_text.as_str(), OCCUPANCY_LINE);
        }
        // Never leak internals, whatever the path.
        prop_assert!(!analysis.report.reply_text.contains("risk"));
    }
}

// -- Scheduler invariants -----------------------------------------------------

/// Rank of a status inside the forward pipeline order.
fn rank(status: SessionStatus) -> u8 {
    status.rank()
}

#[tokio::test]
#[serial_test::serial]
async fn status_is_monotonic_under_concurrent_load() -> anyhow::Result<()> {
    let provider = ScriptedPerception::new(
        plain_person("I have a package delivery", 0.9),
        Duration::from_millis(20),
    );
    let pipeline = SpecPipeline::with_config(
        Arc::clone(&provider),
        12,
        PipelineConfig { max_concurrent_sessions: 3, ..SpecPipeline::fast_config() },
    )?;

    let mut rx = pipeline.orch.bus().subscribe(chime::bus::OWNER_CHANNEL).await;

    // 6 sessions, 2 events each, injected concurrently.
    let mut handles = Vec::new();
    for i in 0..6 {
        for _ in 0..2 {
            let orch = Arc::clone(&pipeline.orch);
            let id = format!("s{i}");
            handles.push(tokio::spawn(async move {
                let _ = orch
                    .ring(chime::types::RingEvent {
                        session_id: Some(id),
                        timestamp: chime::types::epoch_ms(),
                        device_id: "door-1".into(),
                        image_bytes: None,
                        audio_bytes: None,
                        metadata: None,
                    })
                    .await;
            }));
        }
    }
    for handle in handles {
        handle.await?;
    }
    for i in 0..6 {
        pipeline.wait_status(&format!("s{i}"), SessionStatus::Completed).await;
    }

    // Per-session stage sequence observed on the owner channel never
    // goes backwards.
    let mut last_rank: std::collections::HashMap<String, u8> = std::collections::HashMap::new();
    for event in SpecPipeline::drain(&mut rx) {
        if let PipelineEvent::PipelineStage { session, status, .. } = event {
            let entry = last_rank.entry(session.clone()).or_insert(0);
            assert!(
                rank(status) >= *entry,
                "session {session} regressed to {status}"
            );
            *entry = rank(status);
        }
    }
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn concurrency_stays_within_the_semaphore() -> anyhow::Result<()> {
    let provider = ScriptedPerception::new(
        plain_person("hello", 0.9),
        Duration::from_millis(80),
    );
    let pipeline = SpecPipeline::with_config(
        Arc::clone(&provider),
        12,
        PipelineConfig { max_concurrent_sessions: 2, ..SpecPipeline::fast_config() },
    )?;

    for i in 0..8 {
        pipeline.ring(&format!("s{i}")).await?;
    }
    for i in 0..8 {
        pipeline.wait_status(&format!("s{i}"), SessionStatus::Completed).await;
    }

    assert!(
        provider.peak() <= 2,
        "observed {} concurrent provider calls with a semaphore of 2",
        provider.peak()
    );
    Ok(())
}
