// SPDX-License-Identifier: MIT

//! Application error types.
//!
//! The refresh subsystem has a strict containment policy: only
//! `InvalidCredential` propagates far enough to change account state
//! (cascade deletion). Everything else is contained at the smallest
//! possible scope: per plan, per row, or per notification.

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Upstream redirected the request away from the data endpoint,
    /// meaning the skey is no longer accepted. Triggers account deletion.
    #[error("Credential rejected by upstream (redirected to login)")]
    InvalidCredential,

    /// Network-level failure talking to the statement provider after
    /// retries were exhausted. The caller makes no state change; the next
    /// scheduled pass retries naturally.
    #[error("Transient upstream failure: {0}")]
    TransientUpstream(String),

    /// A single statement row failed to parse. Skipped, never fatal to
    /// the batch.
    #[error("Malformed statement row: {0}")]
    MalformedRow(String),

    /// The notification provider could not be reached or rejected the
    /// dispatch. Logged only; never affects reconciliation.
    #[error("Notification dispatch failed: {0}")]
    NotificationDispatch(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the error means the credential itself is bad, as opposed
    /// to a transient or local failure.
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, AppError::InvalidCredential)
    }

    /// True when the error is safe to retry on a later pass with no state
    /// change now.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientUpstream(_))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
