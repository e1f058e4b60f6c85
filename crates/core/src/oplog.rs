// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed append-only operational logs, one file per agent under
//! `<data>/logs/`. Entries are JSONL lines; the log is never truncated.
//!
//! These logs are best-effort observability, not the audit trail — the
//! audit trail lives in the store. Write failures are swallowed so a full
//! disk cannot fail a pipeline stage.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::assets::DataDir;
use crate::types::epoch_ms;

/// A single operational log line.
#[derive(Debug, Serialize)]
struct OpEntry<'a> {
    timestamp_ms: u64,
    session: &'a str,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

/// Append-only per-agent operational log.
#[derive(Debug, Clone)]
pub struct OpLog {
    path: Option<PathBuf>,
}

impl OpLog {
    /// Create a log writing to `<data>/logs/<agent>.log`. If `data` is
    /// `None` (unit tests), nothing is written.
    pub fn new(data: Option<&DataDir>, agent: &str) -> Self {
        Self { path: data.map(|d| d.log_path(agent)) }
    }

    /// A disabled log that drops every entry.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append one line. Best-effort: errors are dropped.
    pub fn push(&self, session: &str, event: &str, detail: Option<&str>) {
        let Some(ref path) = self.path else {
            return;
        };
        let entry = OpEntry { timestamp_ms: epoch_ms(), session, event, detail };
        let Ok(mut line) = serde_json::to_string(&entry) else {
            return;
        };
        line.push('\n');
        let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) else {
            return;
        };
        let _ = file.write_all(line.as_bytes());
    }
}

#[cfg(test)]
#[path = "oplog_tests.rs"]
mod tests;
