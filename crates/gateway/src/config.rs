// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use chime::config::PipelineConfig;

/// Smart-doorbell pipeline gateway.
#[derive(Debug, Clone, Parser)]
#[command(name = "chimegate", version, about)]
pub struct GateConfig {
    /// Host address to bind to.
    #[arg(long, env = "CHIME_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "CHIME_PORT", default_value_t = 8787)]
    pub port: u16,

    /// Root directory for snapshots, TTS output, logs, and the store.
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Maximum pipeline tasks running at once.
    #[arg(long, env = "MAX_CONCURRENT_SESSIONS", default_value_t = 2)]
    pub max_concurrent_sessions: usize,

    /// Seconds a drained session waits for more events before closing.
    #[arg(long, env = "SESSION_IDLE_TIMEOUT_SEC", default_value_t = 90)]
    pub session_idle_timeout_sec: u64,

    /// Per-provider-call wall time budget in seconds.
    #[arg(long, env = "PROVIDER_TIMEOUT_SEC", default_value_t = 8)]
    pub provider_timeout_sec: u64,

    /// Action stage wall time budget in seconds.
    #[arg(long, env = "ACTION_TIMEOUT_SEC", default_value_t = 10)]
    pub action_timeout_sec: u64,

    /// Bearer token for owner endpoints. If unset, auth is disabled.
    #[arg(long, env = "CHIME_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Opaque key for the reply provider. Never logged.
    #[arg(long, env = "REPLY_PROVIDER_KEY", hide_env_values = true)]
    pub reply_provider_key: Option<String>,

    /// Reply provider endpoint URL. If unset, canned replies only.
    #[arg(long, env = "REPLY_PROVIDER_URL")]
    pub reply_provider_url: Option<String>,

    /// Path to the TTS synthesizer binary. If unset, a silent stub.
    #[arg(long, env = "TTS_COMMAND")]
    pub tts_command: Option<PathBuf>,

    /// Devices for which auto-reply is disabled (repeatable).
    #[arg(long = "deny-auto-reply", env = "DENY_AUTO_REPLY", value_delimiter = ',')]
    pub auto_reply_deny: Vec<String>,

    /// Set to 1 to short-circuit all providers to degraded mode.
    #[arg(long, env = "DISABLE_MODELS", default_value_t = 0)]
    pub disable_models: u8,
}

impl GateConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_concurrent_sessions: self.max_concurrent_sessions.max(1),
            session_idle_timeout: Duration::from_secs(self.session_idle_timeout_sec),
            provider_timeout: Duration::from_secs(self.provider_timeout_sec),
            action_timeout: Duration::from_secs(self.action_timeout_sec),
            auto_reply_deny: self.auto_reply_deny.iter().cloned().collect::<HashSet<_>>(),
            ..PipelineConfig::default()
        }
    }

    pub fn models_disabled(&self) -> bool {
        self.disable_models != 0
    }
}
