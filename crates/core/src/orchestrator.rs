// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: session registry, bounded concurrency, and the
//! pipeline driver.
//!
//! One task per session, at most `max_concurrent_sessions` tasks holding
//! the global semaphore. Each task drains its session's bounded queue,
//! drives the four stages in order, and closes the session after the
//! idle window. Components never call back into the orchestrator —
//! everything observable flows out through the store and the event bus.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agents::action::ActionAgent;
use crate::agents::intelligence::{IntelligenceAgent, GREETING_LINE};
use crate::agents::perception::PerceptionAgent;
use crate::agents::decision;
use crate::assets::{atomic_write, valid_session_id, DataDir};
use crate::bus::{EventBus, PipelineEvent, OWNER_CHANNEL};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::oplog::OpLog;
use crate::store::Store;
use crate::types::{
    epoch_ms, ActionResult, ActionStatus, AuditRow, FinalAction, RingEvent, Role, Session,
    SessionStatus, TranscriptEntry,
};

/// Immediate acknowledgement returned to the transport.
#[derive(Debug, Clone)]
pub struct RingAck {
    pub session_id: String,
    pub status: SessionStatus,
    pub greeting: Option<String>,
}

/// One ring event after its media has been persisted.
#[derive(Debug)]
struct QueuedRing {
    image_path: Option<PathBuf>,
    audio_path: Option<PathBuf>,
}

/// Bounded per-session work queue: keeps the newest events, drops the
/// oldest on overflow, and reports back-pressure to the caller.
struct SessionQueue {
    items: Mutex<VecDeque<QueuedRing>>,
    notify: Notify,
    depth: usize,
}

impl SessionQueue {
    fn new(depth: usize) -> Self {
        Self { items: Mutex::new(VecDeque::new()), notify: Notify::new(), depth }
    }

    fn push(&self, item: QueuedRing) -> Result<()> {
        let mut items =
            self.items.lock().map_err(|_| PipelineError::Store("queue mutex poisoned".into()))?;
        let overflowed = items.len() >= self.depth;
        if overflowed {
            items.pop_front();
        }
        items.push_back(item);
        drop(items);
        self.notify.notify_one();
        if overflowed {
            Err(PipelineError::BackPressure)
        } else {
            Ok(())
        }
    }

    fn pop(&self) -> Option<QueuedRing> {
        self.items.lock().ok().and_then(|mut items| items.pop_front())
    }

    fn is_empty(&self) -> bool {
        self.items.lock().map(|items| items.is_empty()).unwrap_or(true)
    }
}

struct SessionHandle {
    queue: Arc<SessionQueue>,
    cancel: CancellationToken,
}

/// Session registry, bounded scheduler, and pipeline driver.
pub struct Orchestrator {
    config: PipelineConfig,
    store: Arc<Store>,
    bus: Arc<EventBus>,
    data: Arc<DataDir>,
    perception: PerceptionAgent,
    intelligence: IntelligenceAgent,
    action: ActionAgent,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    slots: Arc<Semaphore>,
    running: AtomicUsize,
    shutdown: CancellationToken,
    oplog: OpLog,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        store: Arc<Store>,
        bus: Arc<EventBus>,
        data: Arc<DataDir>,
        perception: PerceptionAgent,
        intelligence: IntelligenceAgent,
        action: ActionAgent,
    ) -> Arc<Self> {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_sessions));
        let oplog = OpLog::new(Some(&data), "orchestrator");
        Arc::new(Self {
            config,
            store,
            bus,
            data,
            perception,
            intelligence,
            action,
            sessions: RwLock::new(HashMap::new()),
            slots,
            running: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            oplog,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn data(&self) -> &Arc<DataDir> {
        &self.data
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every pipeline task. Sessions caught mid-stage move to
    /// `error`; nothing persisted is deleted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Number of sessions with a live pipeline task.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Number of tasks currently holding a semaphore slot. Exposed for
    /// the health endpoint and the concurrency invariant tests.
    pub fn running_tasks(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    // -- Ingress --------------------------------------------------------------

    /// Accept a ring event: persist media, create the session row, and
    /// hand the event to the session's pipeline task.
    pub async fn ring(self: &Arc<Self>, event: RingEvent) -> Result<RingAck> {
        if self.shutdown.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if event.device_id.trim().is_empty() {
            return Err(PipelineError::ContractViolation("missing device_id".into()));
        }
        let session_id = match event.session_id {
            Some(id) => {
                if !valid_session_id(&id) {
                    return Err(PipelineError::ContractViolation(format!(
                        "invalid session id `{id}`"
                    )));
                }
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let received_at = if event.timestamp > 0 { event.timestamp } else { epoch_ms() };

        // Media to disk before anything is enqueued.
        let image_path = match event.image_bytes {
            Some(bytes) => {
                let path = self.data.snapshot_path(&session_id);
                atomic_write(&path, &bytes)?;
                Some(path)
            }
            None => None,
        };
        let audio_path = match event.audio_bytes {
            Some(bytes) => {
                let path = self.data.tmp_audio_path(&session_id, received_at)?;
                atomic_write(&path, &bytes)?;
                Some(path)
            }
            None => None,
        };

        let is_new = self.store.get_session(&session_id)?.is_none();
        if is_new {
            if let Err(e) = self
                .store
                .create_session(&Session::new(session_id.clone(), event.device_id.clone()))
            {
                // A concurrent ring for the same id may have won the
                // insert; only a genuinely missing row is fatal.
                if self.store.get_session(&session_id)?.is_none() {
                    return Err(e);
                }
            }
        }
        self.store.append_audit(&AuditRow::new(
            &session_id,
            "orchestrator",
            "ring_received",
            serde_json::json!({
                "device_id": event.device_id.clone(),
                "has_image": image_path.is_some(),
                "has_audio": audio_path.is_some(),
                "metadata": event.metadata,
            }),
            "ok",
            "",
        ))?;

        if is_new {
            self.publish_both(
                &session_id,
                PipelineEvent::NewRing {
                    session: session_id.clone(),
                    device: event.device_id.clone(),
                    greeting: Some(GREETING_LINE.to_owned()),
                    timestamp_ms: epoch_ms(),
                },
            )
            .await;
        }

        let item = QueuedRing { image_path, audio_path };
        self.enqueue(&session_id, item).await?;

        Ok(RingAck {
            session_id,
            status: SessionStatus::Queued,
            greeting: Some(GREETING_LINE.to_owned()),
        })
    }

    /// Enqueue onto the session's queue, spawning its pipeline task if
    /// this is the first event.
    async fn enqueue(self: &Arc<Self>, session_id: &str, item: QueuedRing) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(session_id) {
            return handle.queue.push(item);
        }

        let queue = Arc::new(SessionQueue::new(self.config.session_queue_depth));
        let cancel = self.shutdown.child_token();
        queue.push(item)?;
        sessions.insert(
            session_id.to_owned(),
            SessionHandle { queue: Arc::clone(&queue), cancel: cancel.clone() },
        );
        drop(sessions);

        Self::spawn_run_session(Arc::clone(self), session_id.to_owned(), queue, cancel);
        Ok(())
    }

    /// Spawn the pipeline task for a session. Boxing the future here
    /// gives it a concrete, nameable type so the compiler doesn't need
    /// to prove `Send` through the `run_session` <-> `remove_handle`
    /// recursion.
    fn spawn_run_session(
        this: Arc<Self>,
        session_id: String,
        queue: Arc<SessionQueue>,
        cancel: CancellationToken,
    ) {
        let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
            Box::pin(async move {
                this.run_session(session_id, queue, cancel).await;
            });
        tokio::spawn(fut);
    }

    // -- Pipeline task --------------------------------------------------------

    async fn run_session(
        self: Arc<Self>,
        session_id: String,
        queue: Arc<SessionQueue>,
        cancel: CancellationToken,
    ) {
        // A slot must be held before any stage runs. Sessions beyond the
        // capacity stay `queued` until one frees.
        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                self.fail_session(&session_id, "cancelled", "cancelled").await;
                self.remove_handle(&session_id).await;
                return;
            }
            acquired = tokio::time::timeout(
                self.config.slot_timeout,
                Arc::clone(&self.slots).acquire_owned(),
            ) => match acquired {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) | Err(_) => {
                    self.fail_session(&session_id, "error", "timed out waiting for a slot").await;
                    // Drop queued work: the session is terminal now.
                    while queue.pop().is_some() {}
                    self.remove_handle(&session_id).await;
                    return;
                }
            },
        };

        self.running.fetch_add(1, Ordering::AcqRel);
        info!(session_id, "pipeline task started");

        let mut ended_reason: Option<String> = None;
        loop {
            let Some(item) = queue.pop() else {
                // Queue drained: wait for another event or the idle close.
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.fail_session(&session_id, "cancelled", "cancelled").await;
                        ended_reason = None;
                        break;
                    }
                    _ = queue.notify.notified() => continue,
                    _ = tokio::time::sleep(self.config.session_idle_timeout) => {
                        ended_reason = Some("inactive".to_owned());
                        break;
                    }
                }
            };

            match self.process(&session_id, item, &cancel).await {
                Ok(()) => {}
                Err(PipelineError::Cancelled) => {
                    self.fail_session(&session_id, "cancelled", "cancelled").await;
                    break;
                }
                Err(e) => {
                    error!(session_id, err = %e, "pipeline stage failed");
                    self.fail_session(&session_id, "error", &e.to_string()).await;
                    break;
                }
            }
        }

        if let Some(reason) = ended_reason {
            self.publish_both(
                &session_id,
                PipelineEvent::SessionEnded {
                    session: session_id.clone(),
                    reason,
                    timestamp_ms: epoch_ms(),
                },
            )
            .await;
        }

        self.running.fetch_sub(1, Ordering::AcqRel);
        drop(permit);
        self.remove_handle(&session_id).await;
        info!(session_id, "pipeline task finished");
    }

    /// Remove the session's handle unless new work raced in; in that
    /// case the caller owns a dead task, so respawn.
    async fn remove_handle(self: &Arc<Self>, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        let respawn = match sessions.get(session_id) {
            Some(handle) if !handle.queue.is_empty() && !handle.cancel.is_cancelled() => {
                Some((Arc::clone(&handle.queue), handle.cancel.clone()))
            }
            _ => None,
        };
        if respawn.is_none() {
            sessions.remove(session_id);
        }
        drop(sessions);

        if let Some((queue, cancel)) = respawn {
            Self::spawn_run_session(Arc::clone(self), session_id.to_owned(), queue, cancel);
        } else {
            self.bus.prune(session_id).await;
        }
    }

    /// Drive one queued event through the four stages.
    async fn process(
        &self,
        session_id: &str,
        item: QueuedRing,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| PipelineError::Store(format!("session {session_id} vanished")))?;

        // A later utterance on an already-finished session is a
        // follow-up turn: the status machine stays terminal, only the
        // conversation advances.
        if session.status.is_terminal() {
            return self.follow_up_pass(session_id, &item, cancel).await;
        }

        self.transition(session_id, SessionStatus::Processing, "orchestrator", None, None)
            .await?;

        // Perception. Degrades rather than fails; the budget is enforced
        // here, not inside the provider.
        let report = self
            .perception
            .observe(
                session_id,
                item.image_path.clone(),
                item.audio_path.clone(),
                self.config.provider_timeout,
                cancel,
            )
            .await?;
        let report = self.store_retry(|| self.store.put_perception(&report))?;

        if report.weapon_detected {
            // The alert precedes the perception_done stage event.
            self.publish_both(
                session_id,
                PipelineEvent::WeaponAlert {
                    session: session_id.to_owned(),
                    labels: report.weapon_labels.clone(),
                    confidence: report.weapon_confidence,
                    timestamp_ms: epoch_ms(),
                },
            )
            .await;
        }
        if !report.transcript.trim().is_empty() {
            self.store.append_transcript(&TranscriptEntry {
                session_id: session_id.to_owned(),
                role: Role::Visitor,
                content: report.transcript.clone(),
                timestamp: epoch_ms(),
            })?;
        }
        self.transition(session_id, SessionStatus::PerceptionDone, "perception", None, None)
            .await?;

        // Intelligence.
        let history = self.store.list_transcripts(session_id)?;
        let analysis = self.intelligence.analyze(&report, &history, cancel).await?;
        let intel = self.store_retry(|| self.store.put_intelligence(&analysis.report))?;
        if let Some(ref violation) = analysis.security_incident {
            self.store.append_audit(&AuditRow::new(
                session_id,
                "intelligence",
                "security_contract",
                serde_json::json!({ "violation": violation }),
                "replaced",
                "reply replaced by canned line",
            ))?;
        }
        self.store.append_transcript(&TranscriptEntry {
            session_id: session_id.to_owned(),
            role: Role::Doorbell,
            content: intel.reply_text.clone(),
            timestamp: epoch_ms(),
        })?;
        self.transition(
            session_id,
            SessionStatus::IntelligenceDone,
            "intelligence",
            Some(intel.risk_score),
            None,
        )
        .await?;

        // Decision: synchronous and pure.
        let permitted = self.config.auto_reply_permitted(&session.device_id);
        let directive = decision::decide(&intel, permitted);
        let directive = self.store_retry(|| self.store.put_decision(&directive))?;
        self.transition(
            session_id,
            SessionStatus::DecisionDone,
            "decision",
            None,
            Some(directive.final_action),
        )
        .await?;

        // Action.
        let result = match tokio::time::timeout(
            self.config.action_timeout,
            self.action.execute(&directive, &intel, &report, cancel),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(session_id, "action stage exceeded budget");
                ActionResult {
                    session_id: session_id.to_owned(),
                    status: ActionStatus::Failed,
                    action_type: directive.final_action.as_str().to_owned(),
                    payload: serde_json::json!({ "error": "action timed out" }),
                    timestamp: epoch_ms(),
                }
            }
        };
        self.store.append_audit(&AuditRow::new(
            session_id,
            "action",
            &result.action_type,
            result.payload.clone(),
            result.status.as_str(),
            "",
        ))?;

        self.transition(session_id, SessionStatus::Completed, "orchestrator", None, None)
            .await?;
        self.publish_both(
            session_id,
            PipelineEvent::SessionEnded {
                session: session_id.to_owned(),
                reason: "completed".to_owned(),
                timestamp_ms: epoch_ms(),
            },
        )
        .await;

        Ok(())
    }

    /// Process an event that arrived after the session finished: run the
    /// conversational stages only.
    async fn follow_up_pass(
        &self,
        session_id: &str,
        item: &QueuedRing,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let report = self
            .perception
            .observe(
                session_id,
                item.image_path.clone(),
                item.audio_path.clone(),
                self.config.provider_timeout,
                cancel,
            )
            .await?;

        if report.transcript.trim().is_empty() {
            return Ok(());
        }

        self.store.append_transcript(&TranscriptEntry {
            session_id: session_id.to_owned(),
            role: Role::Visitor,
            content: report.transcript.clone(),
            timestamp: epoch_ms(),
        })?;

        let history = self.store.list_transcripts(session_id)?;
        let stored = self.store.get_perception(session_id)?;
        let (reply, incident) = self
            .intelligence
            .follow_up(stored.as_ref(), &history, &report.transcript, cancel)
            .await?;
        if let Some(violation) = incident {
            self.store.append_audit(&AuditRow::new(
                session_id,
                "intelligence",
                "security_contract",
                serde_json::json!({ "violation": violation }),
                "replaced",
                "reply replaced by canned line",
            ))?;
        }

        self.store.append_transcript(&TranscriptEntry {
            session_id: session_id.to_owned(),
            role: Role::Doorbell,
            content: reply,
            timestamp: epoch_ms(),
        })?;
        self.store.append_audit(&AuditRow::new(
            session_id,
            "intelligence",
            "follow_up",
            serde_json::json!({}),
            "ok",
            "",
        ))?;
        Ok(())
    }

    // -- Conversation endpoints ------------------------------------------------

    /// Generate an Intelligence reply for a follow-up visitor message
    /// (the `/api/ai-reply` seam). Appends both transcript entries.
    pub async fn ai_reply(&self, session_id: &str, message: &str) -> Result<String> {
        if self.store.get_session(session_id)?.is_none() {
            return Err(PipelineError::ContractViolation(format!(
                "unknown session {session_id}"
            )));
        }

        self.store.append_transcript(&TranscriptEntry {
            session_id: session_id.to_owned(),
            role: Role::Visitor,
            content: message.to_owned(),
            timestamp: epoch_ms(),
        })?;

        let history = self.store.list_transcripts(session_id)?;
        let perception = self.store.get_perception(session_id)?;
        let (reply, incident) = self
            .intelligence
            .follow_up(perception.as_ref(), &history, message, &self.shutdown)
            .await?;
        if let Some(violation) = incident {
            self.store.append_audit(&AuditRow::new(
                session_id,
                "intelligence",
                "security_contract",
                serde_json::json!({ "violation": violation }),
                "replaced",
                "reply replaced by canned line",
            ))?;
        }

        self.store.append_transcript(&TranscriptEntry {
            session_id: session_id.to_owned(),
            role: Role::Doorbell,
            content: reply.clone(),
            timestamp: epoch_ms(),
        })?;

        Ok(reply)
    }

    /// Relay an owner message to the visitor-side transcript and the
    /// session channel.
    pub async fn owner_reply(&self, session_id: &str, message: &str) -> Result<()> {
        if self.store.get_session(session_id)?.is_none() {
            return Err(PipelineError::ContractViolation(format!(
                "unknown session {session_id}"
            )));
        }

        self.store.append_transcript(&TranscriptEntry {
            session_id: session_id.to_owned(),
            role: Role::Doorbell,
            content: format!("[owner] {message}"),
            timestamp: epoch_ms(),
        })?;
        self.store.append_audit(&AuditRow::new(
            session_id,
            "orchestrator",
            "owner_reply",
            serde_json::json!({}),
            "ok",
            "",
        ))?;
        self.bus
            .publish(
                session_id,
                PipelineEvent::OwnerReply {
                    session: session_id.to_owned(),
                    message: message.to_owned(),
                    timestamp_ms: epoch_ms(),
                },
            )
            .await;
        Ok(())
    }

    // -- Helpers ---------------------------------------------------------------

    /// Advance the status machine, audit the transition, then publish.
    /// The store write happens first so a reader who saw the event also
    /// sees the status.
    async fn transition(
        &self,
        session_id: &str,
        status: SessionStatus,
        agent: &str,
        risk_score: Option<f64>,
        final_action: Option<FinalAction>,
    ) -> Result<()> {
        self.store_retry(|| {
            self.store.update_session_status(session_id, status, risk_score, final_action)
        })?;
        self.store.append_audit(&AuditRow::new(
            session_id,
            agent,
            "status",
            serde_json::json!({ "status": status.as_str() }),
            status.as_str(),
            "",
        ))?;
        self.oplog.push(session_id, "stage", Some(status.as_str()));
        self.publish_both(
            session_id,
            PipelineEvent::PipelineStage {
                session: session_id.to_owned(),
                status,
                timestamp_ms: epoch_ms(),
            },
        )
        .await;
        Ok(())
    }

    /// Move the session to `error`, audit why, and announce the end.
    async fn fail_session(&self, session_id: &str, kind: &str, reason: &str) {
        let mut short = reason.to_owned();
        short.truncate(200);

        if let Err(e) =
            self.store.update_session_status(session_id, SessionStatus::Error, None, None)
        {
            // Already terminal (e.g. cancellation after completion).
            warn!(session_id, err = %e, "could not mark session errored");
            return;
        }
        let _ = self.store.append_audit(&AuditRow::new(
            session_id,
            "orchestrator",
            kind,
            serde_json::json!({ "reason": short }),
            SessionStatus::Error.as_str(),
            short.clone(),
        ));
        self.oplog.push(session_id, kind, Some(&short));
        self.publish_both(
            session_id,
            PipelineEvent::SessionEnded {
                session: session_id.to_owned(),
                reason: kind.to_owned(),
                timestamp_ms: epoch_ms(),
            },
        )
        .await;
    }

    /// One retry with a fresh transaction on store failure.
    fn store_retry<T>(&self, op: impl Fn() -> Result<T>) -> Result<T> {
        match op() {
            Err(PipelineError::Store(first)) => {
                warn!(err = %first, "store write failed, retrying once");
                op()
            }
            other => other,
        }
    }

    /// Publish to the session channel and mirror to the owner channel.
    async fn publish_both(&self, session_id: &str, event: PipelineEvent) {
        self.bus.publish(session_id, event.clone()).await;
        self.bus.publish(OWNER_CHANNEL, event).await;
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
