//! Error types surfaced to the UI collaborator.

use std::time::SystemTime;

use serde::Serialize;
use tabs_security::{DenialReason, InvalidIdentifier};

/// Failure of a tab operation.
///
/// Every variant is recoverable: the host renders [`TabError::message`] and
/// offers a retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TabError {
    /// The raw id is not a well-formed identifier.
    #[error("Invalid tab identifier: {0}")]
    InvalidIdentifier(#[from] InvalidIdentifier),

    /// No visible tab has this id.
    #[error("Tab '{0}' not found")]
    NotFound(String),

    /// The tab exists but is disabled.
    #[error("Tab '{0}' is disabled")]
    Disabled(String),

    /// The tab exists but the caller may not open it.
    #[error("Access denied to tab '{tab_id}': {reason}")]
    AccessDenied {
        tab_id: String,
        reason: DenialReason,
    },

    /// Too many switch attempts in the current window.
    #[error("Too many attempts for tab '{tab_id}'")]
    RateLimited { tab_id: String, reset_at: SystemTime },

    /// A hook vetoed the operation.
    #[error("{0}")]
    Cancelled(String),

    /// Content production failed and no fallback was supplied.
    #[error("{0}")]
    ProductionFailed(String),
}

/// Copyable tag for a [`TabError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIdentifier,
    NotFound,
    Disabled,
    AccessDenied,
    RateLimited,
    Cancelled,
    ProductionFailed,
}

impl TabError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Disabled(_) => ErrorKind::Disabled,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::ProductionFailed(_) => ErrorKind::ProductionFailed,
        }
    }

    /// Human-readable message for the UI.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Build the error for a denied access decision.
    pub(crate) fn denied(tab_id: &str, reason: DenialReason) -> Self {
        match reason {
            DenialReason::Disabled => Self::Disabled(tab_id.to_owned()),
            reason => Self::AccessDenied {
                tab_id: tab_id.to_owned(),
                reason,
            },
        }
    }
}
