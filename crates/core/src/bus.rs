// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fan-out of session lifecycle events.
//!
//! Channels are named: `owner` is global, every session gets a channel
//! keyed by its id. Each channel is a `tokio::sync::broadcast` ring of 64
//! events — a slow subscriber lags and loses the oldest entries rather
//! than blocking the producer. Delivery is at-most-once and best-effort;
//! reliability comes from polling the store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::types::SessionStatus;

/// The global dashboard channel.
pub const OWNER_CHANNEL: &str = "owner";

/// Per-subscriber buffer depth; the oldest event is dropped on overflow.
pub const SUBSCRIBER_BUFFER: usize = 64;

/// Events published by the orchestrator, tagged with the source session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A session was created from a ring event.
    NewRing {
        session: String,
        device: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        greeting: Option<String>,
        timestamp_ms: u64,
    },
    /// The session advanced to a new pipeline status.
    PipelineStage { session: String, status: SessionStatus, timestamp_ms: u64 },
    /// A weapon-positive perception report was stored. Always published
    /// before the `perception_done` stage event for the same session.
    WeaponAlert {
        session: String,
        labels: Vec<String>,
        confidence: f64,
        timestamp_ms: u64,
    },
    /// The session reached a terminal state or went inactive.
    SessionEnded { session: String, reason: String, timestamp_ms: u64 },
    /// The owner sent a message to the visitor.
    OwnerReply { session: String, message: String, timestamp_ms: u64 },
}

impl PipelineEvent {
    /// Return the session identifier for this event.
    pub fn session(&self) -> &str {
        match self {
            Self::NewRing { session, .. }
            | Self::PipelineStage { session, .. }
            | Self::WeaponAlert { session, .. }
            | Self::SessionEnded { session, .. }
            | Self::OwnerReply { session, .. } => session,
        }
    }
}

/// Fan-out hub. Senders are created lazily on first publish or subscribe
/// and pruned once a closed session has no listeners left.
pub struct EventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<PipelineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    /// Publish onto a channel. Never blocks and never fails the producer:
    /// with no subscribers the event is dropped, with slow subscribers the
    /// broadcast ring drops from the tail.
    pub async fn publish(&self, channel: &str, event: PipelineEvent) {
        let sender = {
            let channels = self.channels.read().await;
            channels.get(channel).cloned()
        };
        let sender = match sender {
            Some(tx) => tx,
            None => self.get_or_create(channel).await,
        };
        let _ = sender.send(event);
    }

    /// Subscribe to a channel. The stream ends when the subscriber drops
    /// its receiver.
    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<PipelineEvent> {
        self.get_or_create(channel).await.subscribe()
    }

    /// Drop a session channel once it has no remaining subscribers.
    /// Called after `session_ended`; a live subscriber keeps the channel.
    pub async fn prune(&self, channel: &str) {
        let mut channels = self.channels.write().await;
        let idle = channels.get(channel).is_some_and(|tx| tx.receiver_count() == 0);
        if idle {
            channels.remove(channel);
        }
    }

    async fn get_or_create(&self, channel: &str) -> broadcast::Sender<PipelineEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
