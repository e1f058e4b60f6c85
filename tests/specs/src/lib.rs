// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process test harness for end-to-end pipeline scenarios.
//!
//! Builds a real orchestrator over an in-memory store and a temp data
//! root, with a scripted perception provider and degraded reply/TTS, so
//! scenarios can assert on everything the dashboard would see.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chime::agents::action::ActionAgent;
use chime::agents::intelligence::IntelligenceAgent;
use chime::agents::lexicon::Lexicon;
use chime::agents::perception::PerceptionAgent;
use chime::assets::DataDir;
use chime::bus::{EventBus, PipelineEvent};
use chime::config::PipelineConfig;
use chime::oplog::OpLog;
use chime::orchestrator::{Orchestrator, RingAck};
use chime::providers::disabled::{DisabledReply, DisabledTts};
use chime::providers::{Perception, ProviderFuture, RawPerception};
use chime::store::Store;
use chime::types::{epoch_ms, RingEvent, Session, SessionStatus};

/// Perception provider returning one fixed raw report, with an optional
/// delay and a live/peak concurrency gauge.
pub struct ScriptedPerception {
    raw: RawPerception,
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedPerception {
    pub fn new(raw: RawPerception, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            raw,
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Highest number of concurrent provider calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

impl Perception for ScriptedPerception {
    fn detect(
        &self,
        _image_path: Option<PathBuf>,
        _audio_path: Option<PathBuf>,
    ) -> ProviderFuture<'_, RawPerception> {
        Box::pin(async move {
            let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
            self.peak.fetch_max(now, Ordering::AcqRel);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::AcqRel);
            Ok(self.raw.clone())
        })
    }
}

/// A person at the door with nothing remarkable about them.
pub fn plain_person(transcript: &str, vision_confidence: f64) -> RawPerception {
    RawPerception {
        person_detected: true,
        objects: vec![],
        vision_confidence,
        transcript: transcript.to_owned(),
        stt_confidence: 0.9,
        weapon_detected: false,
        weapon_confidence: 0.0,
        weapon_labels: vec![],
    }
}

/// Everything a scenario needs to drive and observe the pipeline.
pub struct SpecPipeline {
    pub orch: Arc<Orchestrator>,
    pub provider: Arc<ScriptedPerception>,
    _tmp: tempfile::TempDir,
}

impl SpecPipeline {
    /// Build a pipeline with the given scripted perception and a pinned
    /// local hour (the risk model's night window must be deterministic).
    pub fn new(provider: Arc<ScriptedPerception>, local_hour: u32) -> anyhow::Result<Self> {
        Self::with_config(provider, local_hour, Self::fast_config())
    }

    pub fn with_config(
        provider: Arc<ScriptedPerception>,
        local_hour: u32,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        let tmp = tempfile::tempdir()?;
        let data = Arc::new(DataDir::create(tmp.path().join("data"))?);
        let store = Arc::new(Store::open_in_memory()?);
        let bus = Arc::new(EventBus::new());
        let lexicon = Arc::new(Lexicon::default());

        let perception = PerceptionAgent::new(
            Arc::clone(&provider) as Arc<dyn Perception>,
            Arc::clone(&lexicon),
        );
        let intelligence = IntelligenceAgent::new(
            Arc::new(DisabledReply),
            Arc::clone(&lexicon),
            config.provider_timeout,
        )
        .with_fixed_hour(local_hour);
        let action = ActionAgent::new(
            Arc::new(DisabledTts),
            Arc::clone(&data),
            Arc::clone(&store),
            Arc::clone(&bus),
            OpLog::disabled(),
        );

        let orch = Orchestrator::new(config, store, bus, data, perception, intelligence, action);
        Ok(Self { orch, provider, _tmp: tmp })
    }

    pub fn fast_config() -> PipelineConfig {
        PipelineConfig {
            session_idle_timeout: Duration::from_millis(50),
            provider_timeout: Duration::from_millis(500),
            action_timeout: Duration::from_secs(1),
            slot_timeout: Duration::from_secs(2),
            ..PipelineConfig::default()
        }
    }

    /// Ring with a snapshot and an audio clip.
    pub async fn ring(&self, session_id: &str) -> chime::error::Result<RingAck> {
        self.ring_event(session_id, true, true).await
    }

    /// Ring with explicit media presence flags.
    pub async fn ring_event(
        &self,
        session_id: &str,
        with_image: bool,
        with_audio: bool,
    ) -> chime::error::Result<RingAck> {
        self.orch
            .ring(RingEvent {
                session_id: Some(session_id.to_owned()),
                timestamp: epoch_ms(),
                device_id: "door-1".into(),
                image_bytes: with_image.then(|| vec![0xFF, 0xD8, 0xFF]),
                audio_bytes: with_audio.then(|| vec![0x52, 0x49, 0x46, 0x46]),
                metadata: None,
            })
            .await
    }

    /// Poll the store until the session reaches `status`.
    pub async fn wait_status(&self, session_id: &str, status: SessionStatus) -> Session {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(Some(session)) = self.orch.store().get_session(session_id) {
                if session.status == status {
                    return session;
                }
                assert!(
                    !(session.status.is_terminal() && session.status != status),
                    "session {session_id} ended as {} while waiting for {status}",
                    session.status
                );
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "session {session_id} never reached {status}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Drain every event currently buffered on a channel receiver.
    pub fn drain(
        rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>,
    ) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }
}
