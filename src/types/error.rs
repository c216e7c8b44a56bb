//! Error types for the settlement engine
//!
//! Every rule violation of the payment state machine has its own variant so a
//! caller can render a precise message. Storage and input failures are kept
//! apart from rule violations.
//!
//! # Error Categories
//!
//! - **Lookup Errors**: unknown ids, participants outside the event
//! - **State Machine Errors**: already claimed, already confirmed, not confirmed
//! - **Authorization Errors**: actor may not confirm or reopen a payment
//! - **Suggestion Errors**: malformed or stale suggestions
//! - **Storage and Input Errors**: store failures, I/O and CSV parsing

use super::event::{EventId, PaymentId, UserId};
use super::settlement::SuggestionKey;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SettlementError>;

/// Main error type for the settlement engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    /// Entity referenced by id does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity ("event", "expense", "payment", ...)
        entity: String,
        id: i64,
    },

    /// Participant or group is not part of the event
    #[error("{role} {id} is not a member of event {event}")]
    NotAMember {
        event: EventId,
        /// Participant or group id
        id: i64,
        /// What the id was used as ("claimant", "debtor", "participant", ...)
        role: String,
    },

    /// A payment matching the same suggestion already exists
    #[error("Suggestion {key} was already claimed by payment {payment}")]
    AlreadyClaimed { key: SuggestionKey, payment: PaymentId },

    #[error("Payment {payment} is already confirmed")]
    AlreadyConfirmed { payment: PaymentId },

    #[error("Payment {payment} is not confirmed")]
    NotConfirmed { payment: PaymentId },

    /// Actor lacks permission for the requested transition
    #[error("Actor {actor} is not authorized to {action} payment {payment}")]
    NotAuthorized {
        /// Participant id for confirm, user id for unconfirm
        actor: i64,
        action: String,
        payment: PaymentId,
    },

    /// Suggestion is structurally invalid
    #[error("Invalid suggestion: {reason}")]
    InvalidSuggestion { reason: String },

    /// Suggestion no longer matches the freshly recomputed list
    #[error("Suggestion {key} no longer matches the current settlement of event {event}; refresh and retry")]
    InconsistentSuggestion { event: EventId, key: SuggestionKey },

    /// Malformed or missing required fields
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Delete blocked because payments still reference the entity
    #[error("{entity} {id} is referenced by {payments} payment(s) of event {event}")]
    Referenced {
        entity: String,
        id: i64,
        event: EventId,
        payments: usize,
    },

    /// Insert with an id that is already taken
    #[error("{entity} {id} already exists")]
    Conflict { entity: String, id: i64 },

    /// Failure of a fallible persistence backend
    ///
    /// `MemoryStore` never produces it; database-backed stores map their
    /// driver errors here.
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse { line: Option<u64>, message: String },
}

impl From<std::io::Error> for SettlementError {
    fn from(error: std::io::Error) -> Self {
        SettlementError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for SettlementError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        SettlementError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl SettlementError {
    pub fn not_found(entity: &str, id: i64) -> Self {
        SettlementError::NotFound {
            entity: entity.to_string(),
            id,
        }
    }

    pub fn not_a_member(event: EventId, id: i64, role: &str) -> Self {
        SettlementError::NotAMember {
            event,
            id,
            role: role.to_string(),
        }
    }

    pub fn already_claimed(key: SuggestionKey, payment: PaymentId) -> Self {
        SettlementError::AlreadyClaimed { key, payment }
    }

    pub fn already_confirmed(payment: PaymentId) -> Self {
        SettlementError::AlreadyConfirmed { payment }
    }

    pub fn not_confirmed(payment: PaymentId) -> Self {
        SettlementError::NotConfirmed { payment }
    }

    pub fn not_authorized(actor: i64, action: &str, payment: PaymentId) -> Self {
        SettlementError::NotAuthorized {
            actor,
            action: action.to_string(),
            payment,
        }
    }

    /// Unconfirm is checked against user accounts rather than participants
    pub fn user_not_authorized(user: UserId, action: &str, payment: PaymentId) -> Self {
        Self::not_authorized(user, action, payment)
    }

    pub fn invalid_suggestion(reason: impl Into<String>) -> Self {
        SettlementError::InvalidSuggestion {
            reason: reason.into(),
        }
    }

    pub fn inconsistent_suggestion(event: EventId, key: SuggestionKey) -> Self {
        SettlementError::InconsistentSuggestion { event, key }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SettlementError::Validation {
            message: message.into(),
        }
    }

    pub fn referenced(entity: &str, id: i64, event: EventId, payments: usize) -> Self {
        SettlementError::Referenced {
            entity: entity.to_string(),
            id,
            event,
            payments,
        }
    }

    pub fn conflict(entity: &str, id: i64) -> Self {
        SettlementError::Conflict {
            entity: entity.to_string(),
            id,
        }
    }
}
