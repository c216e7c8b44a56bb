//! Expense ledger types
//!
//! An expense is the source of truth for balances: its payer is credited with
//! the total and each participation debits one participant's share.

use super::event::{EventId, ExpenseId, ParticipantId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A single expense of an event
#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: ExpenseId,
    pub event: EventId,
    pub description: String,

    /// Total amount with 2 decimal places
    pub total: Decimal,

    /// Who paid. `None` marks a placeholder expense, which is excluded from
    /// balance computation until a payer is set.
    pub payer: Option<ParticipantId>,

    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        id: ExpenseId,
        event: EventId,
        description: impl Into<String>,
        total: Decimal,
        payer: Option<ParticipantId>,
    ) -> Self {
        Expense {
            id,
            event,
            description: description.into(),
            total,
            payer,
            created_at: Utc::now(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.payer.is_none()
    }
}

/// One participant's owed share of one expense
///
/// Participations are owned by their expense and kept in persisted order; the
/// first one absorbs the rounding remainder of an even split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participation {
    pub expense: ExpenseId,
    pub participant: ParticipantId,
    pub amount_owed: Decimal,
}

impl Participation {
    pub fn new(expense: ExpenseId, participant: ParticipantId) -> Self {
        Participation {
            expense,
            participant,
            amount_owed: Decimal::ZERO,
        }
    }
}
