// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-writer relational store over SQLite.
//!
//! The connection is guarded by a mutex and every public method runs one
//! short-held transaction, so readers observe either pre- or post-state
//! of a write. Reports are stored as JSON payloads keyed by session id —
//! the session row carries the queryable columns, the payloads are the
//! source of truth for stage output (schema-on-read).
//!
//! Report storage is idempotent per `(kind, session_id)`: a second write
//! is a no-op that returns the existing row. Audit rows and transcripts
//! are append-only and never modified.

pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::types::{
    epoch_ms, AuditRow, FinalAction, Role, Session, SessionStatus, TranscriptEntry,
};

/// Which report table a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportKind {
    Perception,
    Intelligence,
    Decision,
}

impl ReportKind {
    fn table(&self) -> &'static str {
        match self {
            Self::Perception => "perception_reports",
            Self::Intelligence => "intelligence_reports",
            Self::Decision => "decisions",
        }
    }
}

/// Durable session/report/audit persistence plus the KV side tables for
/// the auth and member-directory collaborators.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the single-file store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Run `PRAGMA integrity_check`; `false` means the file is corrupt
    /// and startup should abort with the dedicated exit code.
    pub fn integrity_check(&self) -> Result<bool> {
        let conn = self.lock()?;
        let verdict: String =
            conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(verdict == "ok")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PipelineError::Store("store mutex poisoned".into()))
    }

    // -- Sessions -------------------------------------------------------------

    /// Insert a new session row. Rejects a duplicate id.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO sessions
                (id, device_id, created_at, last_updated_at, status, risk_score, final_action)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                &session.id,
                &session.device_id,
                session.created_at as i64,
                session.last_updated_at as i64,
                session.status.as_str(),
                session.risk_score,
                session.final_action.map(|a| a.as_str()),
            ],
        )?;
        if inserted == 0 {
            return Err(PipelineError::Store(format!("duplicate session id {}", session.id)));
        }
        Ok(())
    }

    /// Advance a session's status, optionally updating the risk score and
    /// final action. Refuses non-monotonic transitions except to `error`.
    pub fn update_session_status(
        &self,
        id: &str,
        new_status: SessionStatus,
        risk_score: Option<f64>,
        final_action: Option<FinalAction>,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row("SELECT status FROM sessions WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        let current = current
            .and_then(|s| SessionStatus::from_name(&s))
            .ok_or_else(|| PipelineError::Store(format!("unknown session {id}")))?;

        if !current.allows(new_status) {
            return Err(PipelineError::Store(format!(
                "refusing {current} -> {new_status} for session {id}"
            )));
        }

        tx.execute(
            r#"
            UPDATE sessions
            SET status = ?2,
                last_updated_at = ?3,
                risk_score = COALESCE(?4, risk_score),
                final_action = COALESCE(?5, final_action)
            WHERE id = ?1
            "#,
            params![
                id,
                new_status.as_str(),
                epoch_ms() as i64,
                risk_score,
                final_action.map(|a| a.as_str()),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Snapshot read of one session.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, device_id, created_at, last_updated_at, status, risk_score, final_action
                FROM sessions WHERE id = ?1
                "#,
                [id],
                session_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Most-recent sessions, optionally filtered by status.
    pub fn list_sessions(
        &self,
        limit: usize,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>> {
        let conn = self.lock()?;
        let mut out = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, device_id, created_at, last_updated_at, status, risk_score, final_action
                    FROM sessions WHERE status = ?1
                    ORDER BY created_at DESC, id DESC LIMIT ?2
                    "#,
                )?;
                let rows =
                    stmt.query_map(params![status.as_str(), limit as i64], session_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, device_id, created_at, last_updated_at, status, risk_score, final_action
                    FROM sessions ORDER BY created_at DESC, id DESC LIMIT ?1
                    "#,
                )?;
                let rows = stmt.query_map(params![limit as i64], session_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    // -- Stage reports --------------------------------------------------------

    /// Store the perception report for a session. Idempotent: a second
    /// write returns the previously stored report unchanged.
    pub fn put_perception(
        &self,
        report: &crate::types::PerceptionReport,
    ) -> Result<crate::types::PerceptionReport> {
        self.put_report(ReportKind::Perception, &report.session_id, report, report.timestamp)
    }

    pub fn get_perception(&self, session_id: &str) -> Result<Option<crate::types::PerceptionReport>> {
        self.get_report(ReportKind::Perception, session_id)
    }

    pub fn put_intelligence(
        &self,
        report: &crate::types::IntelligenceReport,
    ) -> Result<crate::types::IntelligenceReport> {
        self.put_report(ReportKind::Intelligence, &report.session_id, report, report.timestamp)
    }

    pub fn get_intelligence(
        &self,
        session_id: &str,
    ) -> Result<Option<crate::types::IntelligenceReport>> {
        self.get_report(ReportKind::Intelligence, session_id)
    }

    pub fn put_decision(
        &self,
        directive: &crate::types::Directive,
    ) -> Result<crate::types::Directive> {
        self.put_report(ReportKind::Decision, &directive.session_id, directive, directive.timestamp)
    }

    pub fn get_decision(&self, session_id: &str) -> Result<Option<crate::types::Directive>> {
        self.get_report(ReportKind::Decision, session_id)
    }

    fn put_report<T: Serialize + DeserializeOwned>(
        &self,
        kind: ReportKind,
        session_id: &str,
        report: &T,
        timestamp: u64,
    ) -> Result<T> {
        let payload = serde_json::to_string(report)
            .map_err(|e| PipelineError::ContractViolation(format!("unserializable report: {e}")))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (session_id, payload, timestamp) VALUES (?1, ?2, ?3)",
                kind.table()
            ),
            params![session_id, &payload, timestamp as i64],
        )?;
        let stored: String = tx.query_row(
            &format!("SELECT payload FROM {} WHERE session_id = ?1", kind.table()),
            [session_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        serde_json::from_str(&stored)
            .map_err(|e| PipelineError::Store(format!("corrupt {} payload: {e}", kind.table())))
    }

    fn get_report<T: DeserializeOwned>(
        &self,
        kind: ReportKind,
        session_id: &str,
    ) -> Result<Option<T>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                &format!("SELECT payload FROM {} WHERE session_id = ?1", kind.table()),
                [session_id],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| PipelineError::Store(format!("corrupt {} payload: {e}", kind.table()))),
            None => Ok(None),
        }
    }

    // -- Audit ----------------------------------------------------------------

    /// Append an audit row; returns the assigned row id.
    pub fn append_audit(&self, row: &AuditRow) -> Result<i64> {
        let payload = serde_json::to_string(&row.payload)
            .map_err(|e| PipelineError::ContractViolation(format!("unserializable payload: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO actions (session_id, agent, action_type, payload, status, short_reason, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                &row.session_id,
                &row.agent,
                &row.action_type,
                &payload,
                &row.status,
                &row.short_reason,
                row.timestamp as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All audit rows for a session, oldest first. Rows sharing a
    /// millisecond keep insertion order via the rowid.
    pub fn list_actions(&self, session_id: &str) -> Result<Vec<AuditRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_id, agent, action_type, payload, status, short_reason, timestamp
            FROM actions WHERE session_id = ?1 ORDER BY timestamp, id
            "#,
        )?;
        let rows = stmt.query_map([session_id], |row| {
            let payload_json: String = row.get(4)?;
            Ok(AuditRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                agent: row.get(2)?,
                action_type: row.get(3)?,
                payload: serde_json::from_str(&payload_json)
                    .unwrap_or(serde_json::Value::Null),
                status: row.get(5)?,
                short_reason: row.get(6)?,
                timestamp: row.get::<_, i64>(7)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -- Transcripts ----------------------------------------------------------

    pub fn append_transcript(&self, entry: &TranscriptEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transcripts (session_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![&entry.session_id, entry.role.as_str(), &entry.content, entry.timestamp as i64],
        )?;
        Ok(())
    }

    pub fn list_transcripts(&self, session_id: &str) -> Result<Vec<TranscriptEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, role, content, timestamp
            FROM transcripts WHERE session_id = ?1 ORDER BY timestamp, id
            "#,
        )?;
        let rows = stmt.query_map([session_id], |row| {
            let role: String = row.get(1)?;
            Ok(TranscriptEntry {
                session_id: row.get(0)?,
                role: Role::from_name(&role).unwrap_or(Role::Doorbell),
                content: row.get(2)?,
                timestamp: row.get::<_, i64>(3)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -- KV side tables (auth / member directory collaborators) ---------------

    pub fn put_member(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.put_kv("members", key, value)
    }

    pub fn get_member(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_kv("members", key)
    }

    pub fn list_members(&self) -> Result<Vec<(String, serde_json::Value)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key, value FROM members ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            Ok((key, value))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (key, value) = row?;
            out.push((
                key,
                serde_json::from_str(&value).unwrap_or(serde_json::Value::Null),
            ));
        }
        Ok(out)
    }

    pub fn put_user(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.put_kv("users", key, value)
    }

    pub fn get_user(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_kv("users", key)
    }

    pub fn put_token(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.put_kv("tokens", key, value)
    }

    pub fn get_token(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_kv("tokens", key)
    }

    fn put_kv(&self, table: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| PipelineError::ContractViolation(format!("unserializable value: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO {table} (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3"
            ),
            params![key, &json, epoch_ms()],
        )?;
        Ok(())
    }

    fn get_kv(&self, table: &str, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(&format!("SELECT value FROM {table} WHERE key = ?1"), [key], |row| {
                row.get(0)
            })
            .optional()?;
        match value {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| PipelineError::Store(format!("corrupt {table} value: {e}"))),
            None => Ok(None),
        }
    }
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(4)?;
    let final_action: Option<String> = row.get(6)?;
    Ok(Session {
        id: row.get(0)?,
        device_id: row.get(1)?,
        created_at: row.get::<_, i64>(2)? as u64,
        last_updated_at: row.get::<_, i64>(3)? as u64,
        status: SessionStatus::from_name(&status).unwrap_or(SessionStatus::Error),
        risk_score: row.get(5)?,
        final_action: final_action.as_deref().and_then(FinalAction::from_name),
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
