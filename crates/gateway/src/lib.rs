// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chimegate: HTTP/WebSocket shell around the chime pipeline core.

pub mod config;
pub mod error;
pub mod state;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chime::agents::action::ActionAgent;
use chime::agents::intelligence::IntelligenceAgent;
use chime::agents::lexicon::Lexicon;
use chime::agents::perception::PerceptionAgent;
use chime::assets::DataDir;
use chime::bus::EventBus;
use chime::oplog::OpLog;
use chime::orchestrator::Orchestrator;
use chime::providers::command_tts::CommandTts;
use chime::providers::disabled::{DisabledPerception, DisabledReply, DisabledStt, DisabledTts};
use chime::providers::http_reply::HttpReply;
use chime::providers::{Perception, Reply, Stt, TtsEngine};
use chime::store::Store;

use crate::config::GateConfig;
use crate::state::GateState;
use crate::transport::build_router;

/// Startup failures, mapped onto the process exit codes.
#[derive(Debug)]
pub enum StartupError {
    /// Exit code 1: unusable configuration or bind failure.
    Config(String),
    /// Exit code 2: the store failed its integrity check.
    StoreCorruption(String),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::StoreCorruption(_) => 2,
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::StoreCorruption(msg) => write!(f, "store corruption: {msg}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Wire the pipeline and its providers from the gateway configuration.
pub fn build_state(config: &GateConfig) -> Result<Arc<GateState>, StartupError> {
    let data = DataDir::create(&config.data_dir)
        .map_err(|e| StartupError::Config(format!("data dir: {e}")))?;
    let data = Arc::new(data);

    let store = Store::open(&data.db_path())
        .map_err(|e| StartupError::StoreCorruption(e.to_string()))?;
    match store.integrity_check() {
        Ok(true) => {}
        Ok(false) => {
            return Err(StartupError::StoreCorruption("integrity check failed".into()))
        }
        Err(e) => return Err(StartupError::StoreCorruption(e.to_string())),
    }
    let store = Arc::new(store);

    let bus = Arc::new(EventBus::new());
    let lexicon = Arc::new(Lexicon::default());
    let pipeline_config = config.pipeline_config();

    // Provider wiring. DISABLE_MODELS short-circuits everything to the
    // degraded implementations.
    let disabled = config.models_disabled();
    let perception: Arc<dyn Perception> = Arc::new(DisabledPerception);
    let stt: Arc<dyn Stt> = Arc::new(DisabledStt);
    let reply: Arc<dyn Reply> = match (&config.reply_provider_url, disabled) {
        (Some(url), false) => Arc::new(HttpReply::new(
            url.clone(),
            config.reply_provider_key.clone(),
            pipeline_config.provider_timeout,
        )),
        _ => Arc::new(DisabledReply),
    };
    let tts: Arc<dyn TtsEngine> = match (&config.tts_command, disabled) {
        (Some(program), false) => {
            Arc::new(CommandTts::new(program.clone(), pipeline_config.action_timeout))
        }
        _ => Arc::new(DisabledTts),
    };

    let perception_agent = PerceptionAgent::new(perception, Arc::clone(&lexicon));
    let intelligence_agent = IntelligenceAgent::new(
        reply,
        Arc::clone(&lexicon),
        pipeline_config.provider_timeout,
    );
    let action_agent = ActionAgent::new(
        Arc::clone(&tts),
        Arc::clone(&data),
        Arc::clone(&store),
        Arc::clone(&bus),
        OpLog::new(Some(&data), "action"),
    );

    let orchestrator = Orchestrator::new(
        pipeline_config,
        store,
        bus,
        data,
        perception_agent,
        intelligence_agent,
        action_agent,
    );

    Ok(Arc::new(GateState {
        orchestrator,
        stt,
        tts,
        auth_token: config.auth_token.clone(),
        shutdown: CancellationToken::new(),
    }))
}

/// Run the gateway until shutdown.
pub async fn run(config: GateConfig) -> Result<(), StartupError> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = build_state(&config)?;

    // SIGINT drains: refuse new ingress, cancel pipeline tasks, then
    // stop serving.
    let shutdown = state.shutdown.clone();
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received");
            shutdown.cancel();
            orchestrator.shutdown();
        }
    });

    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| StartupError::Config(format!("bind {addr}: {e}")))?;
    info!("chimegate listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(state.shutdown.clone().cancelled_owned())
        .await
        .map_err(|e| StartupError::Config(e.to_string()))?;

    // Give in-flight cancellations a beat to audit before exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
