// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy mapped to the recovery policy table (§7).

use thiserror::Error;

/// The benign-expiry literal set. Matched exactly, including the source typo
/// (`EXOIRED`) — do not normalize, per the open question this carries forward.
pub const BENIGN_EXPIRY_MARKERS: &[&str] = &[
    "FAIL_SYS_TOKEN_EXOIRED::令牌过期",
    "FAIL_SYS_TOKEN_EXPIRED::令牌过期",
    "FAIL_SYS_SESSION_EXPIRED::Session过期",
    "令牌过期",
    "Session过期",
    "Token定时刷新失败，将自动重试",
];

/// Classifies a failure string into the error taxonomy of §7. Shared by C3
/// and C4 so the benign-expiry literal set lives in exactly one place.
pub fn classify_failure_text(text: &str) -> EngineError {
    if BENIGN_EXPIRY_MARKERS.iter().any(|marker| text.contains(marker)) {
        EngineError::BenignExpiry(text.to_owned())
    } else {
        EngineError::PersistentAuthFailure(text.to_owned())
    }
}

/// Error taxonomy for the engine. Each variant carries the §7 recovery
/// policy implicitly via the component that matches on it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient network error: {0}")]
    Transient(String),

    #[error("benign auth expiry: {0}")]
    BenignExpiry(String),

    #[error("persistent auth failure: {0}")]
    PersistentAuthFailure(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("no matching policy")]
    PolicyMiss,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("fatal init error: {0}")]
    FatalInit(String),
}

impl EngineError {
    pub fn is_benign(&self) -> bool {
        matches!(self, EngineError::BenignExpiry(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
