// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the pipeline core, passed as a struct at
/// construction. The transport shell builds this from its own CLI/env
/// surface; nothing here is read from process globals.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the global pipeline-task semaphore.
    pub max_concurrent_sessions: usize,
    /// How long a drained session waits for another event before closing.
    pub session_idle_timeout: Duration,
    /// Wall-time budget for each perception/intelligence provider call.
    pub provider_timeout: Duration,
    /// Wall-time budget for the action stage (TTS synthesis).
    pub action_timeout: Duration,
    /// How long a pipeline task waits for a semaphore slot before the
    /// session is failed.
    pub slot_timeout: Duration,
    /// Depth of each per-session work queue.
    pub session_queue_depth: usize,
    /// Devices for which the auto-reply rule is disabled. Empty set means
    /// auto-reply is permitted everywhere.
    pub auto_reply_deny: HashSet<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 2,
            session_idle_timeout: Duration::from_secs(90),
            provider_timeout: Duration::from_secs(8),
            action_timeout: Duration::from_secs(10),
            slot_timeout: Duration::from_secs(60),
            session_queue_depth: 4,
            auto_reply_deny: HashSet::new(),
        }
    }
}

impl PipelineConfig {
    /// Whether the auto-reply decision rule may fire for this device.
    pub fn auto_reply_permitted(&self, device_id: &str) -> bool {
        !self.auto_reply_deny.contains(device_id)
    }
}
