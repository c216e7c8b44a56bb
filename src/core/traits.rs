//! Core traits for persistence, authorization and settlement strategies
//!
//! The four engine components never reach for global state. Each operation is
//! handed the store it works against, so the same code runs on the in-memory
//! [`MemoryStore`](crate::core::MemoryStore) in tests and on a database-backed
//! implementation in a service.

use crate::types::{
    Event, EventId, EventStatus, Expense, ExpenseId, NetPosition, NewPayment, Participant,
    ParticipantId, Participation, Payment, PaymentId, Result, SettlementSuggestion, SubGroup,
    SubGroupId, SuggestionKind, UserId,
};
use rust_decimal::Decimal;

/// Events, participants, memberships and sub-groups
pub trait Directory: Send + Sync {
    /// Insert a new event; fails with `Conflict` if the id is taken
    fn insert_event(&self, event: Event) -> Result<()>;

    fn event(&self, event: EventId) -> Result<Option<Event>>;

    fn set_event_status(&self, event: EventId, status: EventStatus) -> Result<()>;

    /// Insert a participant or return the existing record with the same id
    fn upsert_participant(&self, participant: Participant) -> Result<Participant>;

    fn participant(&self, participant: ParticipantId) -> Result<Option<Participant>>;

    /// Event members in insertion order
    fn members(&self, event: EventId) -> Result<Vec<ParticipantId>>;

    fn is_member(&self, event: EventId, participant: ParticipantId) -> Result<bool>;

    /// Add a membership; returns `false` if the participant was already a member
    fn add_member(&self, event: EventId, participant: ParticipantId) -> Result<bool>;

    /// Drop a membership and any sub-group assignment in that event
    fn remove_member(&self, event: EventId, participant: ParticipantId) -> Result<bool>;

    fn insert_subgroup(&self, group: SubGroup) -> Result<()>;

    fn remove_subgroup(&self, group: SubGroupId) -> Result<bool>;

    /// Sub-groups of an event, ordered by id
    fn subgroups(&self, event: EventId) -> Result<Vec<SubGroup>>;

    /// Place `participant` in `group`, leaving any other sub-group of the same event
    fn assign_subgroup(&self, group: SubGroupId, participant: ParticipantId) -> Result<()>;
}

/// Expenses and their participations
pub trait ExpenseLedger: Send + Sync {
    /// Insert a new expense without participations
    fn insert_expense(&self, expense: Expense) -> Result<()> {
        self.insert_expense_with(expense, Vec::new())
    }

    /// Insert a new expense together with its participations
    ///
    /// The expense's participations stay locked until both are written, so a
    /// failed insert leaves nothing behind. Fails with `Conflict` if the id is
    /// taken.
    fn insert_expense_with(&self, expense: Expense, participations: Vec<Participation>) -> Result<()>;

    fn expense(&self, expense: ExpenseId) -> Result<Option<Expense>>;

    /// Expenses of an event ordered by id
    fn expenses(&self, event: EventId) -> Result<Vec<Expense>>;

    fn set_expense_total(&self, expense: ExpenseId, total: Decimal) -> Result<Expense>;

    /// Delete an expense together with its participations
    fn delete_expense(&self, expense: ExpenseId) -> Result<bool>;

    /// Participations of an expense in persisted order
    fn participations(&self, expense: ExpenseId) -> Result<Vec<Participation>>;

    /// Run `f` on a working copy of an expense's participations
    ///
    /// The expense's participations are locked for the duration of `f`, so two
    /// updates of the same expense never interleave. The expense is read after
    /// the lock is taken, so `f` sees the latest total. The working copy
    /// replaces the stored participations only if `f` returns `Ok`; an error
    /// leaves the store untouched. Returns `Ok(None)` if the expense does not
    /// exist.
    fn with_participations<T, F>(&self, expense: ExpenseId, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Expense, &mut Vec<Participation>) -> Result<T>;
}

/// Durable payment claims
pub trait PaymentLedger: Send + Sync {
    /// Persist a claim unless one with a matching key already exists
    ///
    /// The duplicate check and the insert happen under one lock scoped to
    /// `(event, kind, from, to)`, so concurrent claims of the same suggestion
    /// cannot both succeed. Amounts match within `tolerance`.
    fn insert_claim(&self, claim: NewPayment, tolerance: Decimal) -> Result<Payment>;

    fn payment(&self, payment: PaymentId) -> Result<Option<Payment>>;

    /// Apply `f` to a payment atomically; an error leaves it unchanged
    fn update_payment<F>(&self, payment: PaymentId, f: F) -> Result<Payment>
    where
        F: FnOnce(&mut Payment) -> Result<()>;

    /// Payments of an event ordered by id, optionally of one kind
    fn payments(&self, event: EventId, kind: Option<SuggestionKind>) -> Result<Vec<Payment>>;
}

/// Everything the engine needs from its persistence collaborator
pub trait SettlementStore: Directory + ExpenseLedger + PaymentLedger {}

impl<T> SettlementStore for T where T: Directory + ExpenseLedger + PaymentLedger {}

/// "Is this user an authorized actor for the event" predicate
pub trait AccessPolicy: Send + Sync {
    fn is_event_admin(&self, event: &Event, user: UserId) -> bool;
}

/// Only the organizer administers an event
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizerPolicy;

impl AccessPolicy for OrganizerPolicy {
    fn is_event_admin(&self, event: &Event, user: UserId) -> bool {
        event.organizer == user
    }
}

/// Turns balances into suggested transfers
///
/// Implementations must emit transfers that, replayed against the input,
/// bring every position within the tolerance of zero. The number of transfers
/// is up to the strategy.
pub trait SettlementStrategy: Send + Sync {
    fn settle<P: NetPosition>(
        &self,
        positions: &[P],
        kind: SuggestionKind,
    ) -> Vec<SettlementSuggestion>;
}
