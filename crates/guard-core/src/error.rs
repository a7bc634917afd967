// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for guarded execution
//!
//! Every failure a handle can report maps onto one of these variants so that
//! callers can tell a policy denial apart from an engine failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DenyReason;

/// The statement text could not be turned into exactly one statement
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ClassificationError {
    #[error("Statement is empty")]
    Empty,

    #[error("Multiple statements not allowed ({count} found), use multi_query()")]
    MultipleStatements { count: usize },

    #[error("Unterminated {what} starting at byte {offset}")]
    Unterminated { what: String, offset: usize },
}

impl ClassificationError {
    pub fn unterminated(what: impl Into<String>, offset: usize) -> Self {
        Self::Unterminated {
            what: what.into(),
            offset,
        }
    }

    /// The policy reason equivalent to this failure, if there is one
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::MultipleStatements { .. } => Some(DenyReason::MultipleStatementsNotAllowed),
            _ => None,
        }
    }
}

/// Unified error type for all guarded operations
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum GuardError {
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Security error: {reason} (statement: {statement})")]
    Security { reason: DenyReason, statement: String },

    #[error("Execution error: {message}")]
    Execution {
        message: String,
        statement: Option<String>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },
}

impl GuardError {
    pub fn security(reason: DenyReason, statement: impl Into<String>) -> Self {
        Self::Security {
            reason,
            statement: statement.into(),
        }
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            statement: None,
        }
    }

    pub fn execution_in(msg: impl Into<String>, statement: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            statement: Some(statement.into()),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { message: msg.into() }
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io { message: msg.into() }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }

    /// The deny reason carried by a security failure (or an equivalent
    /// classification failure)
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Security { reason, .. } => Some(*reason),
            Self::Classification(err) => err.deny_reason(),
            _ => None,
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security { .. })
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, Self::Classification(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

/// Result type alias for guarded operations
pub type GuardResult<T> = Result<T, GuardError>;
