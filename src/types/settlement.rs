//! Settlement suggestion and payment types
//!
//! Suggestions are recomputed on every read and have no persisted id. A
//! [`Payment`] records that a suggestion was honored and is matched back to the
//! live suggestion list through its [`SuggestionKey`]: the kind, both endpoint
//! ids and the amount. Display names never take part in matching.

use super::event::{EventId, ParticipantId, PaymentId};
use super::money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Level at which a transfer is suggested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SuggestionKind {
    /// Endpoints are participant ids
    Individual,
    /// Endpoints are sub-group ids (negative for solo participants)
    BetweenGroups,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionKind::Individual => f.write_str("INDIVIDUAL"),
            SuggestionKind::BetweenGroups => f.write_str("BETWEEN_GROUPS"),
        }
    }
}

impl FromStr for SuggestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" | "" => Ok(SuggestionKind::Individual),
            "between_groups" | "groups" | "group" => Ok(SuggestionKind::BetweenGroups),
            other => Err(format!("unknown suggestion kind '{}'", other)),
        }
    }
}

/// A recommended transfer from a debtor to a creditor
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementSuggestion {
    pub kind: SuggestionKind,
    pub from_id: i64,
    pub from: String,
    pub to_id: i64,
    pub to: String,
    /// Rounded to cents
    pub amount: Decimal,
}

impl SettlementSuggestion {
    /// Identity tuple used for payment matching
    pub fn key(&self) -> SuggestionKey {
        SuggestionKey {
            kind: self.kind,
            from_id: self.from_id,
            to_id: self.to_id,
            amount: self.amount,
        }
    }
}

/// `(kind, from, to, amount)`: how a payment refers to a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionKey {
    pub kind: SuggestionKind,
    pub from_id: i64,
    pub to_id: i64,
    pub amount: Decimal,
}

impl SuggestionKey {
    pub fn new(kind: SuggestionKind, from_id: i64, to_id: i64, amount: Decimal) -> Self {
        SuggestionKey {
            kind,
            from_id,
            to_id,
            amount,
        }
    }

    /// Same kind and endpoints, amount within `tolerance`
    pub fn matches(&self, other: &SuggestionKey, tolerance: Decimal) -> bool {
        self.kind == other.kind
            && self.from_id == other.from_id
            && self.to_id == other.to_id
            && money::within(self.amount, other.amount, tolerance)
    }
}

impl From<&SettlementSuggestion> for SuggestionKey {
    fn from(suggestion: &SettlementSuggestion) -> Self {
        suggestion.key()
    }
}

impl fmt::Display for SuggestionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({:.2})",
            self.kind, self.from_id, self.to_id, self.amount
        )
    }
}

/// Claim that a suggestion was paid, plus its confirmation state
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: PaymentId,
    pub event: EventId,
    pub kind: SuggestionKind,
    pub from_id: i64,
    pub to_id: i64,

    /// Amount of the suggestion at claim time
    pub suggested_amount: Decimal,

    /// Amount the claimant says was transferred, rounded to cents
    pub amount_paid: Decimal,

    pub initiated_by: ParticipantId,
    pub confirmed_by: Option<ParticipantId>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn key(&self) -> SuggestionKey {
        SuggestionKey::new(self.kind, self.from_id, self.to_id, self.suggested_amount)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    pub fn state(&self) -> PaymentState {
        if self.is_confirmed() {
            PaymentState::Confirmed
        } else {
            PaymentState::Claimed
        }
    }

    /// Whether this payment mentions `participant` in any role
    pub fn involves_participant(&self, participant: ParticipantId) -> bool {
        let as_endpoint = match self.kind {
            SuggestionKind::Individual => self.from_id == participant || self.to_id == participant,
            SuggestionKind::BetweenGroups => {
                self.from_id == -participant || self.to_id == -participant
            }
        };
        as_endpoint || self.initiated_by == participant || self.confirmed_by == Some(participant)
    }
}

/// Unsaved claim handed to the payment ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub event: EventId,
    pub key: SuggestionKey,
    pub amount_paid: Decimal,
    pub initiated_by: ParticipantId,
}

/// Pay/confirm status of a live suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentState {
    Unpaid,
    Claimed,
    Confirmed,
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentState::Unpaid => f.write_str("UNPAID"),
            PaymentState::Claimed => f.write_str("CLAIMED"),
            PaymentState::Confirmed => f.write_str("CONFIRMED"),
        }
    }
}

/// A live suggestion annotated with the payment that matches it, if any
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionStatus {
    /// Position in the optimizer output; informational only
    pub index: usize,
    pub suggestion: SettlementSuggestion,
    pub state: PaymentState,
    pub payment: Option<Payment>,
}
