//! Settlement engine
//!
//! This module provides the `SettlementEngine`, the facade that orchestrates
//! the four components against one store:
//!
//! - [`ParticipationRecalculator`] keeps every expense's split exact
//! - [`BalanceCalculator`] derives participant and group balances
//! - a [`SettlementStrategy`] turns balances into suggested transfers
//! - [`PaymentMatcher`] runs the claim/confirm state machine
//!
//! The engine enforces the ledger rules around them:
//! - Ledger mutations require an `OPEN` event
//! - Only event members can pay, owe, claim or be assigned to sub-groups
//! - Participants and sub-groups referenced by payments cannot be removed

use crate::config::EngineConfig;
use crate::core::balance_calculator::BalanceCalculator;
use crate::core::optimizer::GreedySettlement;
use crate::core::payment_matcher::PaymentMatcher;
use crate::core::recalculator::ParticipationRecalculator;
use crate::core::traits::{AccessPolicy, OrganizerPolicy, SettlementStore, SettlementStrategy};
use crate::types::money;
use crate::types::{
    Balance, Event, EventId, EventStatus, Expense, ExpenseId, GroupBalance, LedgerCommand,
    Participant, ParticipantId, Participation, Payment, PaymentId, Result, SettlementError,
    SettlementSuggestion, SubGroup, SubGroupId, SuggestionKey, SuggestionKind, SuggestionStatus,
    UserId,
};
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Settlement engine
///
/// Thread-safe as long as the store is, so one engine can be shared across
/// tasks behind an `Arc`. Operations that check membership or payment
/// references and then write run under a per-event lock, so a claim can never
/// slip in between the reference check and the removal of its endpoint.
pub struct SettlementEngine<S, O = GreedySettlement> {
    store: Arc<S>,
    event_locks: DashMap<EventId, Arc<Mutex<()>>>,
    config: EngineConfig,
    policy: Arc<dyn AccessPolicy>,
    optimizer: O,
    recalculator: ParticipationRecalculator,
    balances: BalanceCalculator,
    matcher: PaymentMatcher,
}

impl<S: SettlementStore> SettlementEngine<S, GreedySettlement> {
    /// Create an engine with the greedy optimizer and organizer-only admin
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let optimizer = GreedySettlement::from_config(&config);
        Self::with_parts(store, config, Arc::new(OrganizerPolicy), optimizer)
    }
}

impl<S: SettlementStore, O: SettlementStrategy> SettlementEngine<S, O> {
    /// Create an engine from explicit collaborators
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for events, expenses and payments
    /// * `config` - Rounding mode and amount tolerance
    /// * `policy` - Decides who administers an event (may reopen payments)
    /// * `optimizer` - Strategy turning balances into transfers
    pub fn with_parts(
        store: Arc<S>,
        config: EngineConfig,
        policy: Arc<dyn AccessPolicy>,
        optimizer: O,
    ) -> Self {
        SettlementEngine {
            store,
            event_locks: DashMap::new(),
            config,
            policy,
            optimizer,
            recalculator: ParticipationRecalculator::new(config.rounding),
            balances: BalanceCalculator,
            matcher: PaymentMatcher::new(config.tolerance, config.rounding),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ----- events and membership -----

    pub fn open_event(&self, event: Event) -> Result<()> {
        let id = event.id;
        self.store.insert_event(event)?;
        info!(event = id, "event opened");
        Ok(())
    }

    pub fn event(&self, event: EventId) -> Result<Event> {
        self.store
            .event(event)?
            .ok_or_else(|| SettlementError::not_found("event", event))
    }

    /// Register a participant; an existing record with the same id wins
    pub fn register_participant(&self, participant: Participant) -> Result<Participant> {
        self.store.upsert_participant(participant)
    }

    /// Add a registered participant to an event
    ///
    /// Returns `false` if they were already a member.
    pub fn join_event(&self, event: EventId, participant: ParticipantId) -> Result<bool> {
        self.open_event_record(event)?;
        if self.store.participant(participant)?.is_none() {
            return Err(SettlementError::not_found("participant", participant));
        }
        self.store.add_member(event, participant)
    }

    /// Create a sub-group, assigning the members it lists
    pub fn create_subgroup(&self, group: SubGroup) -> Result<()> {
        let (id, event) = (group.id, group.event);
        self.with_event_lock(event, || {
            self.open_event_record(event)?;
            for &member in &group.members {
                self.require_member(event, member, "participant")?;
            }

            let members = group.members.clone();
            self.store.insert_subgroup(SubGroup::new(id, event, group.name))?;
            for member in members {
                self.store.assign_subgroup(id, member)?;
            }

            debug!(event, group = id, "sub-group created");
            Ok(())
        })
    }

    /// Move a member into `group`, leaving any other sub-group of the event
    pub fn assign_subgroup(
        &self,
        event: EventId,
        participant: ParticipantId,
        group: SubGroupId,
    ) -> Result<()> {
        self.with_event_lock(event, || {
            self.open_event_record(event)?;
            self.require_member(event, participant, "participant")?;
            self.require_subgroup(event, group)?;
            self.store.assign_subgroup(group, participant)
        })
    }

    /// Remove a member from an event
    ///
    /// The participant is dropped from every expense of the event, and each
    /// affected expense is re-split over the remaining participants. Expenses
    /// they paid stay in the ledger unattributed.
    ///
    /// # Errors
    ///
    /// - `NotAMember` if the participant is not in the event
    /// - `Referenced` if any payment of the event mentions the participant
    pub fn remove_member(&self, event: EventId, participant: ParticipantId) -> Result<()> {
        self.with_event_lock(event, || {
            self.open_event_record(event)?;
            self.require_member(event, participant, "participant")?;

            let references = self
                .store
                .payments(event, None)?
                .iter()
                .filter(|payment| payment.involves_participant(participant))
                .count();
            if references > 0 {
                return Err(SettlementError::referenced(
                    "participant",
                    participant,
                    event,
                    references,
                ));
            }

            let mut resplit = 0;
            for expense in self.store.expenses(event)? {
                if self.recalculator.exclude(self.store.as_ref(), expense.id, participant)? {
                    resplit += 1;
                }
            }
            self.store.remove_member(event, participant)?;

            info!(event, participant, resplit, "member removed");
            Ok(())
        })
    }

    /// Delete a sub-group; its members become solo at the group level
    pub fn remove_subgroup(&self, event: EventId, group: SubGroupId) -> Result<()> {
        self.with_event_lock(event, || {
            self.open_event_record(event)?;
            self.require_subgroup(event, group)?;

            let references = self
                .store
                .payments(event, Some(SuggestionKind::BetweenGroups))?
                .iter()
                .filter(|payment| payment.from_id == group || payment.to_id == group)
                .count();
            if references > 0 {
                return Err(SettlementError::referenced("sub-group", group, event, references));
            }

            self.store.remove_subgroup(group)?;
            info!(event, group, "sub-group removed");
            Ok(())
        })
    }

    /// Mark an event as cancelled; it will never be considered settled
    pub fn cancel_event(&self, event: EventId) -> Result<()> {
        self.event(event)?;
        self.store.set_event_status(event, EventStatus::Cancelled)?;
        info!(event, "event cancelled");
        Ok(())
    }

    /// Close an open event if it is settled as of `today`
    ///
    /// Returns whether the event was closed by this call.
    pub fn close_if_settled(&self, event: EventId, today: NaiveDate) -> Result<bool> {
        let record = self.event(event)?;
        if record.status != EventStatus::Open || !self.is_settled(event, today)? {
            return Ok(false);
        }

        self.store.set_event_status(event, EventStatus::Closed)?;
        info!(event, "event closed as settled");
        Ok(true)
    }

    // ----- expenses -----

    /// Record an expense and split it evenly over `participants`
    ///
    /// Validation happens before anything is written: the payer (if any) and
    /// every participant must be members, and the total must not be negative.
    /// The total is rounded to cents.
    ///
    /// # Returns
    ///
    /// The participations written, in persisted order
    pub fn add_expense(
        &self,
        mut expense: Expense,
        participants: &[ParticipantId],
    ) -> Result<Vec<Participation>> {
        let (id, event) = (expense.id, expense.event);
        self.with_event_lock(event, || {
            self.open_event_record(event)?;
            expense.total = self.checked_total(expense.total)?;
            if let Some(payer) = expense.payer {
                self.require_member(event, payer, "payer")?;
            }
            for &participant in participants {
                self.require_member(event, participant, "participant")?;
            }

            let participations = self.recalculator.split_new(&expense, participants)?;
            self.store.insert_expense_with(expense, participations.clone())?;

            debug!(event, expense = id, "expense added");
            Ok(participations)
        })
    }

    /// Change an expense's total and re-split it
    pub fn set_expense_total(&self, expense: ExpenseId, total: Decimal) -> Result<Expense> {
        let current = self.expense(expense)?;
        self.open_event_record(current.event)?;
        let total = self.checked_total(total)?;

        let updated = self.store.set_expense_total(expense, total)?;
        self.recalculator.recalculate(self.store.as_ref(), expense)?;
        Ok(updated)
    }

    /// Replace an expense's participants wholesale
    ///
    /// Duplicate ids keep their first occurrence; non-members are rejected with
    /// `NotAMember` and nothing is written.
    pub fn replace_participations(
        &self,
        expense: ExpenseId,
        participants: &[ParticipantId],
    ) -> Result<Vec<ParticipantId>> {
        let current = self.expense(expense)?;
        self.with_event_lock(current.event, || {
            self.open_event_record(current.event)?;
            self.recalculator
                .replace(self.store.as_ref(), expense, participants, |participant| {
                    self.require_member(current.event, participant, "participant")
                })
        })
    }

    /// Include or exclude one member; returns whether they are now included
    pub fn toggle_participation(&self, expense: ExpenseId, participant: ParticipantId) -> Result<bool> {
        let current = self.expense(expense)?;
        self.with_event_lock(current.event, || {
            self.open_event_record(current.event)?;
            self.require_member(current.event, participant, "participant")?;
            self.recalculator
                .toggle(self.store.as_ref(), expense, participant)
        })
    }

    pub fn recalculate_participations(&self, expense: ExpenseId) -> Result<()> {
        self.recalculator.recalculate(self.store.as_ref(), expense)
    }

    /// Delete an expense together with its participations
    pub fn delete_expense(&self, expense: ExpenseId) -> Result<()> {
        let current = self.expense(expense)?;
        self.open_event_record(current.event)?;
        if !self.store.delete_expense(expense)? {
            return Err(SettlementError::not_found("expense", expense));
        }
        debug!(event = current.event, expense, "expense deleted");
        Ok(())
    }

    pub fn expense(&self, expense: ExpenseId) -> Result<Expense> {
        self.store
            .expense(expense)?
            .ok_or_else(|| SettlementError::not_found("expense", expense))
    }

    // ----- balances and suggestions -----

    pub fn participant_balances(&self, event: EventId) -> Result<Vec<Balance>> {
        self.balances.participant_balances(self.store.as_ref(), event)
    }

    pub fn group_balances(&self, event: EventId) -> Result<Vec<GroupBalance>> {
        self.balances.group_balances(self.store.as_ref(), event)
    }

    pub fn optimize_individual(&self, balances: &[Balance]) -> Vec<SettlementSuggestion> {
        self.optimizer.settle(balances, SuggestionKind::Individual)
    }

    pub fn optimize_groups(&self, balances: &[GroupBalance]) -> Vec<SettlementSuggestion> {
        self.optimizer.settle(balances, SuggestionKind::BetweenGroups)
    }

    /// Current suggestions of one kind, computed from balances sorted by id
    pub fn suggestions(
        &self,
        event: EventId,
        kind: SuggestionKind,
    ) -> Result<Vec<SettlementSuggestion>> {
        match kind {
            SuggestionKind::Individual => {
                let mut balances = self.participant_balances(event)?;
                balances.sort_by_key(|balance| balance.participant);
                Ok(self.optimize_individual(&balances))
            }
            SuggestionKind::BetweenGroups => {
                let mut balances = self.group_balances(event)?;
                balances.sort_by_key(|balance| balance.group);
                Ok(self.optimize_groups(&balances))
            }
        }
    }

    /// Current suggestions annotated with their matching payment
    pub fn payment_statuses(
        &self,
        event: EventId,
        kind: SuggestionKind,
    ) -> Result<Vec<SuggestionStatus>> {
        let suggestions = self.suggestions(event, kind)?;
        let payments = self.store.payments(event, Some(kind))?;
        Ok(self.matcher.annotate(suggestions, &payments))
    }

    // ----- payments -----

    /// Claim that the suggestion identified by `key` was paid
    ///
    /// The suggestion list is recomputed first; a key that no longer appears
    /// in it is rejected with `InconsistentSuggestion`.
    pub fn claim_payment(
        &self,
        event: EventId,
        key: SuggestionKey,
        claimant: ParticipantId,
        amount_paid: Decimal,
    ) -> Result<Payment> {
        self.with_event_lock(event, || {
            let record = self.open_event_record(event)?;
            let current = self.suggestions(event, key.kind)?;
            self.matcher
                .claim(self.store.as_ref(), &record, key, claimant, amount_paid, &current)
        })
    }

    /// Confirm a claimed payment as its creditor
    ///
    /// Runs under the payment's event lock, since the confirmer becomes a
    /// reference that blocks their removal.
    pub fn confirm_payment(&self, payment: PaymentId, confirmer: ParticipantId) -> Result<Payment> {
        let event = self
            .store
            .payment(payment)?
            .map(|current| current.event)
            .ok_or_else(|| SettlementError::not_found("payment", payment))?;
        self.with_event_lock(event, || {
            self.matcher.confirm(self.store.as_ref(), payment, confirmer)
        })
    }

    pub fn unconfirm_payment(&self, payment: PaymentId, user: UserId) -> Result<Payment> {
        self.matcher
            .unconfirm(self.store.as_ref(), self.policy.as_ref(), payment, user)
    }

    pub fn list_payments(
        &self,
        event: EventId,
        kind: Option<SuggestionKind>,
    ) -> Result<Vec<Payment>> {
        self.event(event)?;
        self.store.payments(event, kind)
    }

    /// Every current suggestion has a confirmed payment
    ///
    /// With no kind filter both the individual and the group suggestion sets
    /// must be fully confirmed.
    pub fn is_fully_confirmed(&self, event: EventId, kind: Option<SuggestionKind>) -> Result<bool> {
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => vec![SuggestionKind::Individual, SuggestionKind::BetweenGroups],
        };

        for kind in kinds {
            let suggestions = self.suggestions(event, kind)?;
            let payments = self.store.payments(event, Some(kind))?;
            if !self.matcher.is_fully_confirmed(&suggestions, &payments) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Oldest unconfirmed claim for `from -> to`
    pub fn find_open_claim(
        &self,
        event: EventId,
        kind: SuggestionKind,
        from_id: i64,
        to_id: i64,
    ) -> Result<Option<Payment>> {
        self.find_claim(event, kind, from_id, to_id, false)
    }

    /// Oldest confirmed claim for `from -> to`
    pub fn find_confirmed_claim(
        &self,
        event: EventId,
        kind: SuggestionKind,
        from_id: i64,
        to_id: i64,
    ) -> Result<Option<Payment>> {
        self.find_claim(event, kind, from_id, to_id, true)
    }

    /// Finalization rule
    ///
    /// A cancelled event, or one scheduled after `today`, is never settled.
    /// Otherwise the event is settled when every participant and group balance
    /// is within the tolerance of zero, or when both suggestion sets are fully
    /// confirmed.
    pub fn is_settled(&self, event: EventId, today: NaiveDate) -> Result<bool> {
        let record = self.event(event)?;
        if record.status == EventStatus::Cancelled || record.date > today {
            return Ok(false);
        }

        let tolerance = self.config.tolerance;
        let balanced = self
            .participant_balances(event)?
            .iter()
            .all(|balance| money::is_negligible(balance.net, tolerance))
            && self
                .group_balances(event)?
                .iter()
                .all(|balance| money::is_negligible(balance.net, tolerance));

        if balanced {
            return Ok(true);
        }
        self.is_fully_confirmed(event, None)
    }

    // ----- journal replay -----

    /// Apply one journal command
    ///
    /// Confirm and unconfirm commands name the suggestion rather than a
    /// payment id and act on the oldest matching claim.
    pub fn apply(&self, command: LedgerCommand) -> Result<()> {
        match command {
            LedgerCommand::OpenEvent {
                event,
                organizer,
                date,
            } => self.open_event(Event::new(event, format!("event {}", event), organizer, date)),
            LedgerCommand::Join {
                event,
                participant,
                user,
                name,
            } => {
                let mut record = Participant::new(participant, name);
                record.user = user;
                self.register_participant(record)?;
                self.join_event(event, participant).map(|_| ())
            }
            LedgerCommand::CreateSubGroup { event, group, name } => {
                self.create_subgroup(SubGroup::new(group, event, name))
            }
            LedgerCommand::Assign {
                event,
                participant,
                group,
            } => self.assign_subgroup(event, participant, group),
            LedgerCommand::AddExpense {
                event,
                expense,
                payer,
                total,
                description,
            } => self
                .add_expense(Expense::new(expense, event, description, total, payer), &[])
                .map(|_| ()),
            LedgerCommand::ToggleParticipation {
                event,
                expense,
                participant,
            } => {
                self.expense_of(event, expense)?;
                self.toggle_participation(expense, participant).map(|_| ())
            }
            LedgerCommand::SetTotal {
                event,
                expense,
                total,
            } => {
                self.expense_of(event, expense)?;
                self.set_expense_total(expense, total).map(|_| ())
            }
            LedgerCommand::Leave { event, participant } => self.remove_member(event, participant),
            LedgerCommand::DeleteExpense { event, expense } => {
                self.expense_of(event, expense)?;
                self.delete_expense(expense)
            }
            LedgerCommand::Claim {
                event,
                key,
                claimant,
            } => self
                .claim_payment(event, key, claimant, key.amount)
                .map(|_| ()),
            LedgerCommand::Confirm {
                event,
                kind,
                from_id,
                to_id,
                confirmer,
            } => {
                let payment = self
                    .find_open_claim(event, kind, from_id, to_id)?
                    .ok_or_else(|| unclaimed("open", kind, from_id, to_id))?;
                self.confirm_payment(payment.id, confirmer).map(|_| ())
            }
            LedgerCommand::Unconfirm {
                event,
                kind,
                from_id,
                to_id,
                user,
            } => {
                let payment = self
                    .find_confirmed_claim(event, kind, from_id, to_id)?
                    .ok_or_else(|| unclaimed("confirmed", kind, from_id, to_id))?;
                self.unconfirm_payment(payment.id, user).map(|_| ())
            }
            LedgerCommand::Cancel { event } => self.cancel_event(event),
        }
    }

    // ----- helpers -----

    /// Run `f` holding the event's lock
    ///
    /// Not reentrant: `f` must not call another locking operation.
    fn with_event_lock<T>(&self, event: EventId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = Arc::clone(self.event_locks.entry(event).or_default().value());
        let _guard = lock.lock();
        f()
    }

    fn open_event_record(&self, event: EventId) -> Result<Event> {
        let record = self.event(event)?;
        if record.status != EventStatus::Open {
            return Err(SettlementError::validation(format!(
                "event {} is {}",
                event, record.status
            )));
        }
        Ok(record)
    }

    fn require_member(&self, event: EventId, participant: ParticipantId, role: &str) -> Result<()> {
        if self.store.is_member(event, participant)? {
            Ok(())
        } else {
            Err(SettlementError::not_a_member(event, participant, role))
        }
    }

    fn require_subgroup(&self, event: EventId, group: SubGroupId) -> Result<()> {
        if self.store.subgroups(event)?.iter().any(|g| g.id == group) {
            Ok(())
        } else {
            Err(SettlementError::not_found("sub-group", group))
        }
    }

    /// The expense, provided it belongs to `event`
    fn expense_of(&self, event: EventId, expense: ExpenseId) -> Result<Expense> {
        let record = self.expense(expense)?;
        if record.event != event {
            return Err(SettlementError::not_found("expense", expense));
        }
        Ok(record)
    }

    fn checked_total(&self, total: Decimal) -> Result<Decimal> {
        if total < Decimal::ZERO {
            return Err(SettlementError::validation(format!(
                "expense total must not be negative, got {}",
                total
            )));
        }
        Ok(money::to_cents(total, self.config.rounding))
    }

    fn find_claim(
        &self,
        event: EventId,
        kind: SuggestionKind,
        from_id: i64,
        to_id: i64,
        confirmed: bool,
    ) -> Result<Option<Payment>> {
        Ok(self
            .list_payments(event, Some(kind))?
            .into_iter()
            .find(|payment| {
                payment.from_id == from_id
                    && payment.to_id == to_id
                    && payment.is_confirmed() == confirmed
            }))
    }
}

/// Reads as "open INDIVIDUAL claim 2 -> 1 not found"
fn unclaimed(state: &str, kind: SuggestionKind, from_id: i64, to_id: i64) -> SettlementError {
    SettlementError::not_found(&format!("{} {} claim {} ->", state, kind, from_id), to_id)
}
