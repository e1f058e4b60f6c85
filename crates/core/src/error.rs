// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed error taxonomy for the pipeline core.
//!
//! Each variant carries its recovery contract: transient provider errors
//! degrade locally, store errors get one retry, back-pressure surfaces at
//! ingress, and cancellation is cooperative.

use std::fmt;

/// Errors produced inside the pipeline core.
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// Provider timeout or transport failure. Recovered locally via
    /// bounded retry then degraded fallback; never fatal to the session.
    TransientProvider(String),
    /// A provider or caller returned data failing schema/invariants.
    /// First occurrence in a session is treated as transient.
    ContractViolation(String),
    /// Store write conflict or I/O failure. The stage retries once with a
    /// fresh transaction before failing the session.
    Store(String),
    /// Per-session queue full. Surfaced at ingress as HTTP 429.
    BackPressure,
    /// Cooperative shutdown or per-session cancellation.
    Cancelled,
    /// A reply generator produced forbidden output; the response was
    /// replaced by the canned safe line and the incident audited.
    SecurityContract(String),
}

impl PipelineError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientProvider(_) => "TRANSIENT_PROVIDER",
            Self::ContractViolation(_) => "CONTRACT_VIOLATION",
            Self::Store(_) => "STORE",
            Self::BackPressure => "BACK_PRESSURE",
            Self::Cancelled => "CANCELLED",
            Self::SecurityContract(_) => "SECURITY_CONTRACT",
        }
    }

    /// Whether the error is recoverable without failing the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientProvider(_) | Self::SecurityContract(_))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientProvider(msg) => write!(f, "transient provider error: {msg}"),
            Self::ContractViolation(msg) => write!(f, "contract violation: {msg}"),
            Self::Store(msg) => write!(f, "store error: {msg}"),
            Self::BackPressure => f.write_str("per-session queue full"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::SecurityContract(msg) => write!(f, "security contract breach: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
