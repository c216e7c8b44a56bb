//! Journal commands replayed against the engine
//!
//! The CLI reads an event ledger as a journal of commands, one per CSV row,
//! and applies them in order. Every command belongs to exactly one event, which
//! is what the async strategy partitions on. Participant, sub-group and expense
//! ids are global, so commands of different events that name the same one are
//! kept in the same partition.

use super::event::{EventId, ExpenseId, ParticipantId, SubGroupId, UserId};
use super::settlement::{SuggestionKey, SuggestionKind};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// An id drawn from a registry shared by all events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedId {
    Participant(ParticipantId),
    SubGroup(SubGroupId),
    Expense(ExpenseId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    /// Create an event organized by `organizer`
    OpenEvent {
        event: EventId,
        organizer: UserId,
        date: NaiveDate,
    },

    /// Register the participant if needed and add them to the event
    Join {
        event: EventId,
        participant: ParticipantId,
        user: Option<UserId>,
        name: String,
    },

    CreateSubGroup {
        event: EventId,
        group: SubGroupId,
        name: String,
    },

    /// Move a member into a sub-group
    Assign {
        event: EventId,
        participant: ParticipantId,
        group: SubGroupId,
    },

    /// New expense without participations; `payer == None` is a placeholder
    AddExpense {
        event: EventId,
        expense: ExpenseId,
        payer: Option<ParticipantId>,
        total: Decimal,
        description: String,
    },

    /// Include or exclude a member from an expense
    ToggleParticipation {
        event: EventId,
        expense: ExpenseId,
        participant: ParticipantId,
    },

    SetTotal {
        event: EventId,
        expense: ExpenseId,
        total: Decimal,
    },

    /// Remove a member from the event, re-splitting their expenses
    Leave {
        event: EventId,
        participant: ParticipantId,
    },

    DeleteExpense {
        event: EventId,
        expense: ExpenseId,
    },

    /// Claim a suggestion as paid in full
    Claim {
        event: EventId,
        key: SuggestionKey,
        claimant: ParticipantId,
    },

    /// Confirm the open claim for `from -> to`
    Confirm {
        event: EventId,
        kind: SuggestionKind,
        from_id: i64,
        to_id: i64,
        confirmer: ParticipantId,
    },

    /// Reopen the confirmed claim for `from -> to`
    Unconfirm {
        event: EventId,
        kind: SuggestionKind,
        from_id: i64,
        to_id: i64,
        user: UserId,
    },

    Cancel {
        event: EventId,
    },
}

impl LedgerCommand {
    /// Event the command applies to
    pub fn event(&self) -> EventId {
        match self {
            LedgerCommand::OpenEvent { event, .. }
            | LedgerCommand::Join { event, .. }
            | LedgerCommand::CreateSubGroup { event, .. }
            | LedgerCommand::Assign { event, .. }
            | LedgerCommand::AddExpense { event, .. }
            | LedgerCommand::ToggleParticipation { event, .. }
            | LedgerCommand::SetTotal { event, .. }
            | LedgerCommand::Leave { event, .. }
            | LedgerCommand::DeleteExpense { event, .. }
            | LedgerCommand::Claim { event, .. }
            | LedgerCommand::Confirm { event, .. }
            | LedgerCommand::Unconfirm { event, .. }
            | LedgerCommand::Cancel { event } => *event,
        }
    }

    /// Global id this command registers or resolves, if any
    ///
    /// Joining registers the participant on first sight; creating a sub-group
    /// or an expense claims its id. Later commands look the id up and check
    /// which event owns it.
    pub fn shared_id(&self) -> Option<SharedId> {
        match self {
            LedgerCommand::Join { participant, .. } => Some(SharedId::Participant(*participant)),
            LedgerCommand::CreateSubGroup { group, .. } | LedgerCommand::Assign { group, .. } => {
                Some(SharedId::SubGroup(*group))
            }
            LedgerCommand::AddExpense { expense, .. }
            | LedgerCommand::ToggleParticipation { expense, .. }
            | LedgerCommand::SetTotal { expense, .. }
            | LedgerCommand::DeleteExpense { expense, .. } => Some(SharedId::Expense(*expense)),
            LedgerCommand::OpenEvent { .. }
            | LedgerCommand::Leave { .. }
            | LedgerCommand::Claim { .. }
            | LedgerCommand::Confirm { .. }
            | LedgerCommand::Unconfirm { .. }
            | LedgerCommand::Cancel { .. } => None,
        }
    }
}
