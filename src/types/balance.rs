//! Derived balance types
//!
//! Balances are never persisted; they are recomputed from the expense ledger
//! on every read. A positive `net` means the party is owed money.

use super::event::{ParticipantId, SubGroupId};
use rust_decimal::Decimal;

/// Anything the settlement optimizer can net against other parties
pub trait NetPosition {
    /// Participant id or group id, depending on the balance level
    fn party_id(&self) -> i64;

    /// Display name carried into suggestions
    fn label(&self) -> &str;

    fn net(&self) -> Decimal;
}

/// Net position of one participant
#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub participant: ParticipantId,
    pub name: String,
    pub total_paid: Decimal,
    pub total_owed: Decimal,
    /// `total_paid - total_owed`
    pub net: Decimal,
}

impl Balance {
    pub fn new(participant: ParticipantId, name: impl Into<String>) -> Self {
        Balance {
            participant,
            name: name.into(),
            total_paid: Decimal::ZERO,
            total_owed: Decimal::ZERO,
            net: Decimal::ZERO,
        }
    }

    /// Participants that neither paid nor owe anything are left out of reports
    pub fn is_untouched(&self) -> bool {
        self.total_paid.is_zero() && self.total_owed.is_zero()
    }
}

impl NetPosition for Balance {
    fn party_id(&self) -> i64 {
        self.participant
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn net(&self) -> Decimal {
        self.net
    }
}

/// Net position of a sub-group, or of a solo participant as a singleton group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBalance {
    /// Positive for real sub-groups, negated participant id for solo members
    pub group: SubGroupId,
    pub name: String,
    pub members: Vec<ParticipantId>,
    pub total_paid: Decimal,
    pub total_owed: Decimal,
    pub net: Decimal,
}

impl GroupBalance {
    pub fn is_solo(&self) -> bool {
        self.group < 0
    }

    pub fn is_untouched(&self) -> bool {
        self.total_paid.is_zero() && self.total_owed.is_zero()
    }
}

impl NetPosition for GroupBalance {
    fn party_id(&self) -> i64 {
        self.group
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn net(&self) -> Decimal {
        self.net
    }
}
