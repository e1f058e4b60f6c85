// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::types::{ActionStatus, DetectedObject, Emotion, PerceptionReport, Session};

fn store() -> Store {
    Store::open_in_memory().expect("in-memory store")
}

fn session(id: &str) -> Session {
    Session::new(id.to_owned(), "door-1".to_owned())
}

fn perception(id: &str) -> PerceptionReport {
    PerceptionReport {
        session_id: id.to_owned(),
        person_detected: true,
        objects: vec![DetectedObject { label: "package".into(), confidence: 0.78 }],
        vision_confidence: 0.88,
        transcript: "I have a package delivery".into(),
        stt_confidence: 0.9,
        emotion: Emotion::Neutral,
        anti_spoof_score: 0.0,
        weapon_detected: false,
        weapon_confidence: 0.0,
        weapon_labels: vec![],
        image_path: Some("data/snaps/s1.jpg".into()),
        timestamp: epoch_ms(),
    }
}

#[test]
fn create_session_rejects_duplicate() {
    let store = store();
    store.create_session(&session("s1")).expect("first insert");
    let err = store.create_session(&session("s1"));
    assert!(matches!(err, Err(PipelineError::Store(_))));
}

#[test]
fn status_advances_monotonically() {
    let store = store();
    store.create_session(&session("s1")).expect("insert");

    store
        .update_session_status("s1", SessionStatus::Processing, None, None)
        .expect("queued -> processing");
    store
        .update_session_status("s1", SessionStatus::PerceptionDone, None, None)
        .expect("processing -> perception_done");

    // Backwards is refused.
    let back = store.update_session_status("s1", SessionStatus::Processing, None, None);
    assert!(matches!(back, Err(PipelineError::Store(_))));

    let got = store.get_session("s1").expect("get").expect("present");
    assert_eq!(got.status, SessionStatus::PerceptionDone);
}

#[test]
fn error_is_reachable_from_any_non_terminal_state() {
    let store = store();
    store.create_session(&session("s1")).expect("insert");
    store
        .update_session_status("s1", SessionStatus::Error, None, None)
        .expect("queued -> error");

    // Terminal states refuse everything, including error.
    let after = store.update_session_status("s1", SessionStatus::Error, None, None);
    assert!(matches!(after, Err(PipelineError::Store(_))));
}

#[test]
fn update_unknown_session_fails() {
    let store = store();
    let err = store.update_session_status("ghost", SessionStatus::Processing, None, None);
    assert!(matches!(err, Err(PipelineError::Store(_))));
}

#[test]
fn status_update_carries_risk_and_action() {
    let store = store();
    store.create_session(&session("s1")).expect("insert");
    store
        .update_session_status("s1", SessionStatus::IntelligenceDone, Some(0.48), None)
        .expect("with risk");
    store
        .update_session_status(
            "s1",
            SessionStatus::DecisionDone,
            None,
            Some(FinalAction::NotifyOwner),
        )
        .expect("with action");

    let got = store.get_session("s1").expect("get").expect("present");
    assert_eq!(got.risk_score, 0.48);
    assert_eq!(got.final_action, Some(FinalAction::NotifyOwner));
}

#[test]
fn report_storage_is_idempotent() {
    let store = store();
    store.create_session(&session("s1")).expect("insert");

    let first = perception("s1");
    store.put_perception(&first).expect("first put");

    // A second write with different content is a no-op returning the
    // original row.
    let mut second = perception("s1");
    second.transcript = "something else entirely".into();
    let stored = store.put_perception(&second).expect("second put");
    assert_eq!(stored.transcript, "I have a package delivery");

    let fetched = store.get_perception("s1").expect("get").expect("present");
    assert_eq!(fetched.transcript, "I have a package delivery");
}

#[test]
fn missing_reports_read_as_none() {
    let store = store();
    assert!(store.get_perception("nope").expect("get").is_none());
    assert!(store.get_intelligence("nope").expect("get").is_none());
    assert!(store.get_decision("nope").expect("get").is_none());
}

#[test]
fn audit_rows_keep_insertion_order() {
    let store = store();
    let ts = epoch_ms();
    for (i, agent) in ["orchestrator", "perception", "intelligence"].iter().enumerate() {
        let mut row = AuditRow::new(
            "s1",
            *agent,
            "status",
            serde_json::json!({ "step": i }),
            "ok",
            "",
        );
        // Same millisecond on purpose: rowid must break the tie.
        row.timestamp = ts;
        store.append_audit(&row).expect("append");
    }

    let rows = store.list_actions("s1").expect("list");
    let agents: Vec<&str> = rows.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(agents, vec!["orchestrator", "perception", "intelligence"]);
}

#[test]
fn transcripts_are_append_only_and_ordered() {
    let store = store();
    for (role, content) in [
        (Role::Visitor, "I have a package delivery"),
        (Role::Doorbell, "Please leave the package at the door."),
    ] {
        store
            .append_transcript(&TranscriptEntry {
                session_id: "s1".into(),
                role,
                content: content.into(),
                timestamp: epoch_ms(),
            })
            .expect("append");
    }

    let entries = store.list_transcripts("s1").expect("list");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].role, Role::Visitor);
    assert_eq!(entries[1].role, Role::Doorbell);
}

#[test]
fn list_sessions_filters_and_limits() {
    let store = store();
    for id in ["a", "b", "c"] {
        let mut s = session(id);
        s.created_at = epoch_ms();
        store.create_session(&s).expect("insert");
    }
    store
        .update_session_status("b", SessionStatus::Error, None, None)
        .expect("fail b");

    let all = store.list_sessions(10, None).expect("list all");
    assert_eq!(all.len(), 3);

    let errored = store.list_sessions(10, Some(SessionStatus::Error)).expect("list errored");
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].id, "b");

    let limited = store.list_sessions(2, None).expect("list limited");
    assert_eq!(limited.len(), 2);
}

#[test]
fn kv_side_tables_roundtrip() {
    let store = store();
    store
        .put_member("ravi", &serde_json::json!({ "role": "driver" }))
        .expect("put member");
    let got = store.get_member("ravi").expect("get").expect("present");
    assert_eq!(got["role"], "driver");

    // Upsert overwrites.
    store
        .put_member("ravi", &serde_json::json!({ "role": "cook" }))
        .expect("update member");
    let got = store.get_member("ravi").expect("get").expect("present");
    assert_eq!(got["role"], "cook");

    assert_eq!(store.list_members().expect("list").len(), 1);
    assert!(store.get_user("nobody").expect("get").is_none());
    store.put_token("t1", &serde_json::json!("opaque")).expect("put token");
    assert!(store.get_token("t1").expect("get").is_some());
}

#[test]
fn integrity_check_passes_on_fresh_store() {
    let store = store();
    assert!(store.integrity_check().expect("integrity"));
}

#[test]
fn action_result_persists_as_audit_row() {
    let store = store();
    let result = crate::types::ActionResult {
        session_id: "s1".into(),
        status: ActionStatus::Queued,
        action_type: "notify_owner".into(),
        payload: serde_json::json!({ "message": "visitor at the door" }),
        timestamp: epoch_ms(),
    };
    let row = AuditRow::new(
        &result.session_id,
        "action",
        &result.action_type,
        result.payload.clone(),
        result.status.as_str(),
        "",
    );
    store.append_audit(&row).expect("append");

    let rows = store.list_actions("s1").expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "queued");
    assert_eq!(rows[0].payload["message"], "visitor at the door");
}
