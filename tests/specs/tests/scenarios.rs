// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end doorbell scenarios, driven through a real orchestrator
//! with scripted perception.

use std::time::Duration;

use chime::agents::intelligence::{canned_reply, OCCUPANCY_LINE, SECURITY_LINE};
use chime::bus::PipelineEvent;
use chime::types::{DetectedObject, FinalAction, Intent, SessionStatus};

use chime_specs::{plain_person, ScriptedPerception, SpecPipeline};

const DAY: u32 = 12;

// -- S1: simple delivery (English) --------------------------------------------

#[tokio::test]
async fn delivery_with_visible_package_auto_replies() -> anyhow::Result<()> {
    let mut raw = plain_person("I have a package delivery", 0.88);
    raw.objects = vec![DetectedObject { label: "package".into(), confidence: 0.78 }];
    let pipeline = SpecPipeline::new(ScriptedPerception::new(raw, Duration::ZERO), DAY)?;

    pipeline.ring("s1").await?;
    let session = pipeline.wait_status("s1", SessionStatus::Completed).await;

    let store = pipeline.orch.store();
    let intel = store.get_intelligence("s1")?.ok_or_else(|| anyhow::anyhow!("no report"))?;
    assert_eq!(intel.intent, Intent::Delivery);
    assert_eq!(intel.risk_score, 0.0);
    assert!(!intel.escalation_required);
    assert_eq!(intel.reply_text, canned_reply(Intent::Delivery));

    assert_eq!(session.final_action, Some(FinalAction::AutoReply));
    let directive = store.get_decision("s1")?.ok_or_else(|| anyhow::anyhow!("no directive"))?;
    assert_eq!(directive.reason, "R2");
    assert!(directive.dispatch.tts);
    assert!(!directive.dispatch.notify_owner);
    Ok(())
}

// -- S2: OTP scam (Devanagari input) ------------------------------------------

#[tokio::test]
async fn otp_scam_escalates_without_weapon_alert() -> anyhow::Result<()> {
    let raw = plain_person("otp बताओ", 0.65);
    let pipeline = SpecPipeline::new(ScriptedPerception::new(raw, Duration::ZERO), DAY)?;

    let mut rx = pipeline.orch.bus().subscribe("s2").await;
    pipeline.ring("s2").await?;
    let session = pipeline.wait_status("s2", SessionStatus::Completed).await;

    let intel = pipeline
        .orch
        .store()
        .get_intelligence("s2")?
        .ok_or_else(|| anyhow::anyhow!("no report"))?;
    assert_eq!(intel.intent, Intent::ScamAttempt);
    assert!(intel.risk_score >= 0.70);
    assert!(intel.escalation_required);
    assert_eq!(intel.reply_text, SECURITY_LINE);
    assert_eq!(session.final_action, Some(FinalAction::Escalate));

    let events = SpecPipeline::drain(&mut rx);
    assert!(
        !events.iter().any(|e| matches!(e, PipelineEvent::WeaponAlert { .. })),
        "no weapon alert for a scam"
    );
    Ok(())
}

// -- S3: weapon detected ------------------------------------------------------

#[tokio::test]
async fn weapon_forces_escalation_and_alerts_first() -> anyhow::Result<()> {
    let mut raw = plain_person("", 0.90);
    raw.weapon_detected = true;
    raw.weapon_confidence = 0.82;
    raw.weapon_labels = vec!["knife".into()];
    let pipeline = SpecPipeline::new(ScriptedPerception::new(raw, Duration::ZERO), DAY)?;

    let mut rx = pipeline.orch.bus().subscribe("s3").await;
    pipeline.ring_event("s3", true, false).await?;
    let session = pipeline.wait_status("s3", SessionStatus::Completed).await;

    let intel = pipeline
        .orch
        .store()
        .get_intelligence("s3")?
        .ok_or_else(|| anyhow::anyhow!("no report"))?;
    assert_eq!(intel.intent, Intent::Unknown);
    assert!(intel.risk_score >= 0.75);
    assert!(intel.escalation_required);
    assert_eq!(session.final_action, Some(FinalAction::Escalate));

    // The alert is published strictly before the perception_done stage
    // event and before the session's completed event.
    let events = SpecPipeline::drain(&mut rx);
    let alert = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::WeaponAlert { .. }))
        .ok_or_else(|| anyhow::anyhow!("weapon alert not published"))?;
    let perception_done = events
        .iter()
        .position(|e| {
            matches!(
                e,
                PipelineEvent::PipelineStage { status: SessionStatus::PerceptionDone, .. }
            )
        })
        .ok_or_else(|| anyhow::anyhow!("perception_done not published"))?;
    let ended = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::SessionEnded { .. }))
        .ok_or_else(|| anyhow::anyhow!("session end not published"))?;
    assert!(alert < perception_done);
    assert!(alert < ended);
    Ok(())
}

// -- S4: occupancy probe (Hinglish, Devanagari script) ------------------------

#[tokio::test]
async fn occupancy_probe_notifies_owner_with_exact_reply() -> anyhow::Result<()> {
    let raw = plain_person("कोई घर पे है?", 0.80);
    let pipeline = SpecPipeline::new(ScriptedPerception::new(raw, Duration::ZERO), DAY)?;

    pipeline.ring("s4").await?;
    let session = pipeline.wait_status("s4", SessionStatus::Completed).await;

    let intel = pipeline
        .orch
        .store()
        .get_intelligence("s4")?
        .ok_or_else(|| anyhow::anyhow!("no report"))?;
    assert_eq!(intel.intent, Intent::OccupancyProbe);
    assert_eq!(intel.risk_score, 0.54);
    assert_eq!(intel.reply_text, OCCUPANCY_LINE);
    assert_eq!(session.final_action, Some(FinalAction::NotifyOwner));
    let directive = pipeline
        .orch
        .store()
        .get_decision("s4")?
        .ok_or_else(|| anyhow::anyhow!("no directive"))?;
    assert_eq!(directive.reason, "R3");
    Ok(())
}

// -- S5: silent visitor, no audio ---------------------------------------------

#[tokio::test]
async fn silent_visitor_notifies_owner() -> anyhow::Result<()> {
    let raw = plain_person("", 0.49);
    let pipeline = SpecPipeline::new(ScriptedPerception::new(raw, Duration::ZERO), DAY)?;

    pipeline.ring_event("s5", true, false).await?;
    let session = pipeline.wait_status("s5", SessionStatus::Completed).await;

    let perception = pipeline
        .orch
        .store()
        .get_perception("s5")?
        .ok_or_else(|| anyhow::anyhow!("no report"))?;
    // Low confidence (+0.3) and missing audio (+0.1).
    assert!((perception.anti_spoof_score - 0.4).abs() < 1e-9);

    let intel = pipeline
        .orch
        .store()
        .get_intelligence("s5")?
        .ok_or_else(|| anyhow::anyhow!("no report"))?;
    assert_eq!(intel.intent, Intent::Unknown);
    assert_eq!(intel.risk_score, 0.515);
    assert_eq!(session.final_action, Some(FinalAction::NotifyOwner));
    Ok(())
}

// -- S6: aggression at night --------------------------------------------------

#[tokio::test]
async fn night_aggression_maxes_risk_and_escalates() -> anyhow::Result<()> {
    let raw = plain_person("maar dunga, open up", 0.80);
    let pipeline = SpecPipeline::new(ScriptedPerception::new(raw, Duration::ZERO), 23)?;

    pipeline.ring("s6").await?;
    let session = pipeline.wait_status("s6", SessionStatus::Completed).await;

    let perception = pipeline
        .orch
        .store()
        .get_perception("s6")?
        .ok_or_else(|| anyhow::anyhow!("no report"))?;
    assert_eq!(perception.emotion, chime::types::Emotion::Aggressive);

    let intel = pipeline
        .orch
        .store()
        .get_intelligence("s6")?
        .ok_or_else(|| anyhow::anyhow!("no report"))?;
    assert_eq!(intel.intent, Intent::Aggression);
    assert_eq!(intel.risk_score, 1.0);
    assert!(intel.escalation_required);
    assert_eq!(intel.reply_text, SECURITY_LINE);
    assert_eq!(session.final_action, Some(FinalAction::Escalate));
    Ok(())
}

// -- Transcript shape across a conversation -----------------------------------

#[tokio::test]
async fn conversation_is_recorded_in_order() -> anyhow::Result<()> {
    let raw = plain_person("I have a package delivery", 0.88);
    let pipeline = SpecPipeline::new(ScriptedPerception::new(raw, Duration::ZERO), DAY)?;

    pipeline.ring("s7").await?;
    pipeline.wait_status("s7", SessionStatus::Completed).await;
    pipeline.orch.ai_reply("s7", "can you keep it safe?").await?;
    pipeline.orch.owner_reply("s7", "leave it with the guard").await?;

    let transcripts = pipeline.orch.store().list_transcripts("s7")?;
    let contents: Vec<&str> = transcripts.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents[0], "I have a package delivery");
    assert_eq!(contents[1], canned_reply(Intent::Delivery));
    assert_eq!(contents[2], "can you keep it safe?");
    assert!(contents[4].starts_with("[owner] "));
    Ok(())
}
