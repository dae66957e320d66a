//! Error types for the ticket store.

use crate::types::{OwnerId, TicketId};
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum TicketError {
    /// The ticket is absent, belongs to another owner, or is not in the
    /// lifecycle state the operation requires. These cases are reported
    /// identically so callers cannot tell existence or state apart.
    #[error("Ticket not found: {0}")]
    NotFound(TicketId),

    #[error("Ticket already exists for client id: {client_id}")]
    Conflict { client_id: String },

    #[error("Photo quota exceeded for owner {owner} (quota {quota})")]
    QuotaExceeded { owner: OwnerId, quota: u32 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

/// Coarse error classes a transport layer maps to responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    QuotaExceeded,
    Validation,
    Store,
}

impl TicketError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketError::NotFound(_) => ErrorKind::NotFound,
            TicketError::Conflict { .. } => ErrorKind::Conflict,
            TicketError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            TicketError::Validation(_) => ErrorKind::Validation,
            TicketError::Io(_)
            | TicketError::Serialization(_)
            | TicketError::Deserialization(_)
            | TicketError::Corruption(_)
            | TicketError::ChecksumMismatch { .. }
            | TicketError::Locked
            | TicketError::NotInitialized
            | TicketError::InvalidFormat(_) => ErrorKind::Store,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        TicketError::Validation(message.into())
    }
}

impl From<serde_json::Error> for TicketError {
    fn from(e: serde_json::Error) -> Self {
        TicketError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for TicketError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        TicketError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for TicketError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        TicketError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, TicketError>;
