//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `event`: identifiers, participants, events and sub-groups
//! - `expense`: expenses and participations
//! - `balance`: derived participant and group balances
//! - `settlement`: suggestions, payments and their matching key
//! - `money`: fixed-point rounding helpers
//! - `command`: journal commands replayed by the CLI
//! - `error`: error types for the settlement engine

pub mod balance;
pub mod command;
pub mod error;
pub mod event;
pub mod expense;
pub mod money;
pub mod settlement;

pub use balance::{Balance, GroupBalance, NetPosition};
pub use command::{LedgerCommand, SharedId};
pub use error::{Result, SettlementError};
pub use event::{
    solo_group_id, solo_participant, Event, EventId, EventStatus, ExpenseId, Participant,
    ParticipantId, PaymentId, SubGroup, SubGroupId, UserId,
};
pub use expense::{Expense, Participation};
pub use money::RoundingMode;
pub use settlement::{
    NewPayment, Payment, PaymentState, SettlementSuggestion, SuggestionKey, SuggestionKind,
    SuggestionStatus,
};
