// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem layout under the single `data/` root.
//!
//! Only five subdirectories are legal write destinations: `snaps/`,
//! `tts/`, `tmp/`, `logs/`, `members/`. All writes go through
//! [`atomic_write`] (sibling temp file, fsync, rename). Nothing is ever
//! deleted automatically.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Subdirectories permitted under the data root.
pub const PERMITTED_SUBDIRS: &[&str] = &["snaps", "tts", "tmp", "logs", "members"];

/// Typed handle to the data root. Hands out paths inside the permitted
/// subdirectories only.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Open the data root, creating it and the permitted subdirectories.
    pub fn create(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        for sub in PERMITTED_SUBDIRS {
            std::fs::create_dir_all(root.join(sub))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the single-file SQL store.
    pub fn db_path(&self) -> PathBuf {
        self.root.join("db")
    }

    /// `snaps/<session>.jpg`
    pub fn snapshot_path(&self, session_id: &str) -> PathBuf {
        self.root.join("snaps").join(format!("{session_id}.jpg"))
    }

    /// `tts/<session>.wav`
    pub fn tts_wav_path(&self, session_id: &str) -> PathBuf {
        self.root.join("tts").join(format!("{session_id}.wav"))
    }

    /// `tts/<session>.txt` — sanitized text preview.
    pub fn tts_text_path(&self, session_id: &str) -> PathBuf {
        self.root.join("tts").join(format!("{session_id}.txt"))
    }

    /// `tmp/<session>/<ts>.wav` — audio in flight. Creates the per-session
    /// directory.
    pub fn tmp_audio_path(&self, session_id: &str, ts: u64) -> std::io::Result<PathBuf> {
        let dir = self.root.join("tmp").join(session_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{ts}.wav")))
    }

    /// `logs/<agent>.log` — append-only operational log.
    pub fn log_path(&self, agent: &str) -> PathBuf {
        self.root.join("logs").join(format!("{agent}.log"))
    }

    /// `members/` directory for the member-directory collaborator.
    pub fn members_dir(&self) -> PathBuf {
        self.root.join("members")
    }

    /// Whether `path` lives under one of the permitted subdirectories.
    pub fn is_permitted(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return false;
        };
        match rel.components().next() {
            Some(std::path::Component::Normal(first)) => PERMITTED_SUBDIRS
                .iter()
                .any(|sub| first.to_str() == Some(sub)),
            _ => false,
        }
    }
}

/// Write `bytes` to `path` atomically: sibling temp file, fsync, rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = sibling_tmp(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Validate a caller-supplied session id for use as a path component:
/// non-empty, at most 64 chars, drawn from `[A-Za-z0-9._-]`, and not a
/// dot-only name.
pub fn valid_session_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 64 {
        return false;
    }
    if id.chars().all(|c| c == '.') {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
#[path = "assets_tests.rs"]
mod tests;
