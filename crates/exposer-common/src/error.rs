//! Error types shared by the exposer crates
//!
//! Infrastructure failures (Kubernetes, database, messaging) are kept
//! distinct from validation failures so the HTTP layer can map them to
//! 500 and 400 respectively.

use thiserror::Error;

/// Main error type for exposer infrastructure operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Relational store error
    #[error("database error: {source}")]
    Database {
        /// The underlying sqlx error
        #[from]
        source: sqlx::Error,
    },

    /// Messaging (request/reply) error
    #[error("messaging error on {subject}: {message}")]
    Messaging {
        /// Subject the request was sent on
        subject: String,
        /// Description of what failed
        message: String,
    },

    /// Validation error for an inbound job
    #[error("validation error for {invocation}: {message}")]
    Validation {
        /// Invocation id of the offending job
        invocation: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error: {message}")]
    Internal {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error for a specific invocation
    pub fn validation_for(invocation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            invocation: invocation.into(),
            message: msg.into(),
        }
    }

    /// Create a messaging error for a subject
    pub fn messaging(subject: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Messaging {
            subject: subject.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
