//! Thread-safe in-memory store
//!
//! This module provides the `MemoryStore` struct, which implements every
//! persistence trait of the engine on top of `DashMap`.
//!
//! # Design
//!
//! `DashMap` entry locks stand in for the row locks and transactions a database
//! would provide:
//!
//! - **Participations** are keyed by expense. `with_participations` holds the
//!   expense's entry for the whole update, reads the expense under it and
//!   writes back only on success, so a failed recalculation leaves no partial
//!   split behind and a deleted expense is never resurrected.
//!   `insert_expense_with` holds the same entry while it writes the expense.
//! - **Claims** are indexed by `(event, kind, from, to)`. `insert_claim` holds
//!   that index entry while it checks for a duplicate and inserts, which closes
//!   the check-then-insert race between concurrent claims.
//!
//! # Thread Safety
//!
//! No method holds a lock on one map while locking an entry of the same map,
//! and closures passed in by callers never run against the store itself.

use crate::core::traits::{Directory, ExpenseLedger, PaymentLedger};
use crate::types::money;
use crate::types::{
    Event, EventId, EventStatus, Expense, ExpenseId, NewPayment, Participant, ParticipantId,
    Participation, Payment, PaymentId, Result, SettlementError, SubGroup, SubGroupId,
    SuggestionKind,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};

/// Lock scope of the duplicate-claim guard
type ClaimIndexKey = (EventId, SuggestionKind, i64, i64);

/// In-memory implementation of [`Directory`], [`ExpenseLedger`] and [`PaymentLedger`]
#[derive(Debug)]
pub struct MemoryStore {
    events: DashMap<EventId, Event>,
    participants: DashMap<ParticipantId, Participant>,
    /// Event members in insertion order
    members: DashMap<EventId, Vec<ParticipantId>>,
    subgroups: DashMap<SubGroupId, SubGroup>,
    expenses: DashMap<ExpenseId, Expense>,
    participations: DashMap<ExpenseId, Vec<Participation>>,
    payments: DashMap<PaymentId, Payment>,
    /// Suggested amounts already claimed per endpoint pair
    claims: DashMap<ClaimIndexKey, Vec<(PaymentId, Decimal)>>,
    next_payment: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            participants: DashMap::new(),
            members: DashMap::new(),
            subgroups: DashMap::new(),
            expenses: DashMap::new(),
            participations: DashMap::new(),
            payments: DashMap::new(),
            claims: DashMap::new(),
            next_payment: AtomicI64::new(1),
        }
    }

    /// All event ids, sorted
    pub fn event_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.events.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for MemoryStore {
    fn insert_event(&self, event: Event) -> Result<()> {
        let id = event.id;
        let mut inserted = false;
        self.events.entry(id).or_insert_with(|| {
            inserted = true;
            event
        });

        if inserted {
            Ok(())
        } else {
            Err(SettlementError::conflict("event", id))
        }
    }

    fn event(&self, event: EventId) -> Result<Option<Event>> {
        Ok(self.events.get(&event).map(|entry| entry.value().clone()))
    }

    fn set_event_status(&self, event: EventId, status: EventStatus) -> Result<()> {
        let mut entry = self
            .events
            .get_mut(&event)
            .ok_or_else(|| SettlementError::not_found("event", event))?;
        entry.value_mut().status = status;
        Ok(())
    }

    fn upsert_participant(&self, participant: Participant) -> Result<Participant> {
        if participant.id <= 0 {
            return Err(SettlementError::validation(format!(
                "participant ids must be positive, got {}",
                participant.id
            )));
        }

        Ok(self
            .participants
            .entry(participant.id)
            .or_insert(participant)
            .value()
            .clone())
    }

    fn participant(&self, participant: ParticipantId) -> Result<Option<Participant>> {
        Ok(self
            .participants
            .get(&participant)
            .map(|entry| entry.value().clone()))
    }

    fn members(&self, event: EventId) -> Result<Vec<ParticipantId>> {
        Ok(self
            .members
            .get(&event)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn is_member(&self, event: EventId, participant: ParticipantId) -> Result<bool> {
        Ok(self
            .members
            .get(&event)
            .is_some_and(|entry| entry.value().contains(&participant)))
    }

    fn add_member(&self, event: EventId, participant: ParticipantId) -> Result<bool> {
        if !self.events.contains_key(&event) {
            return Err(SettlementError::not_found("event", event));
        }
        if !self.participants.contains_key(&participant) {
            return Err(SettlementError::not_found("participant", participant));
        }

        let mut entry = self.members.entry(event).or_default();
        if entry.value().contains(&participant) {
            return Ok(false);
        }
        entry.value_mut().push(participant);
        Ok(true)
    }

    fn remove_member(&self, event: EventId, participant: ParticipantId) -> Result<bool> {
        let removed = match self.members.get_mut(&event) {
            Some(mut entry) => {
                let members = entry.value_mut();
                let before = members.len();
                members.retain(|&member| member != participant);
                members.len() != before
            }
            None => false,
        };

        for mut group in self.subgroups.iter_mut() {
            if group.event == event {
                group.members.retain(|&member| member != participant);
            }
        }

        Ok(removed)
    }

    fn insert_subgroup(&self, group: SubGroup) -> Result<()> {
        if group.id <= 0 {
            return Err(SettlementError::validation(format!(
                "sub-group ids must be positive, got {}",
                group.id
            )));
        }
        if !self.events.contains_key(&group.event) {
            return Err(SettlementError::not_found("event", group.event));
        }

        let id = group.id;
        let mut inserted = false;
        self.subgroups.entry(id).or_insert_with(|| {
            inserted = true;
            group
        });

        if inserted {
            Ok(())
        } else {
            Err(SettlementError::conflict("sub-group", id))
        }
    }

    fn remove_subgroup(&self, group: SubGroupId) -> Result<bool> {
        Ok(self.subgroups.remove(&group).is_some())
    }

    fn subgroups(&self, event: EventId) -> Result<Vec<SubGroup>> {
        let mut groups: Vec<SubGroup> = self
            .subgroups
            .iter()
            .filter(|entry| entry.value().event == event)
            .map(|entry| entry.value().clone())
            .collect();
        groups.sort_by_key(|group| group.id);
        Ok(groups)
    }

    fn assign_subgroup(&self, group: SubGroupId, participant: ParticipantId) -> Result<()> {
        let event = self
            .subgroups
            .get(&group)
            .map(|entry| entry.value().event)
            .ok_or_else(|| SettlementError::not_found("sub-group", group))?;

        // At most one sub-group per participant and event
        for mut other in self.subgroups.iter_mut() {
            if other.event == event && other.id != group {
                other.members.retain(|&member| member != participant);
            }
        }

        let mut entry = self
            .subgroups
            .get_mut(&group)
            .ok_or_else(|| SettlementError::not_found("sub-group", group))?;
        if !entry.value().contains(participant) {
            entry.value_mut().members.push(participant);
        }
        Ok(())
    }
}

impl ExpenseLedger for MemoryStore {
    fn insert_expense_with(&self, expense: Expense, participations: Vec<Participation>) -> Result<()> {
        if !self.events.contains_key(&expense.event) {
            return Err(SettlementError::not_found("event", expense.event));
        }

        let id = expense.id;
        let Entry::Vacant(slot) = self.participations.entry(id) else {
            return Err(SettlementError::conflict("expense", id));
        };

        let mut inserted = false;
        self.expenses.entry(id).or_insert_with(|| {
            inserted = true;
            expense
        });
        if !inserted {
            return Err(SettlementError::conflict("expense", id));
        }

        slot.insert(participations);
        Ok(())
    }

    fn expense(&self, expense: ExpenseId) -> Result<Option<Expense>> {
        Ok(self.expenses.get(&expense).map(|entry| entry.value().clone()))
    }

    fn expenses(&self, event: EventId) -> Result<Vec<Expense>> {
        let mut expenses: Vec<Expense> = self
            .expenses
            .iter()
            .filter(|entry| entry.value().event == event)
            .map(|entry| entry.value().clone())
            .collect();
        expenses.sort_by_key(|expense| expense.id);
        Ok(expenses)
    }

    fn set_expense_total(&self, expense: ExpenseId, total: Decimal) -> Result<Expense> {
        let mut entry = self
            .expenses
            .get_mut(&expense)
            .ok_or_else(|| SettlementError::not_found("expense", expense))?;
        entry.value_mut().total = total;
        Ok(entry.value().clone())
    }

    fn delete_expense(&self, expense: ExpenseId) -> Result<bool> {
        let removed = self.expenses.remove(&expense).is_some();
        self.participations.remove(&expense);
        Ok(removed)
    }

    fn participations(&self, expense: ExpenseId) -> Result<Vec<Participation>> {
        Ok(self
            .participations
            .get(&expense)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn with_participations<T, F>(&self, expense: ExpenseId, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Expense, &mut Vec<Participation>) -> Result<T>,
    {
        match self.participations.entry(expense) {
            Entry::Occupied(mut slot) => {
                let Some(current) = self.expense(expense)? else {
                    // Deleted while we waited for the lock
                    slot.remove();
                    return Ok(None);
                };
                let mut working = slot.get().clone();
                let outcome = f(&current, &mut working)?;
                *slot.get_mut() = working;
                Ok(Some(outcome))
            }
            Entry::Vacant(slot) => {
                let Some(current) = self.expense(expense)? else {
                    return Ok(None);
                };
                let mut working = Vec::new();
                let outcome = f(&current, &mut working)?;
                slot.insert(working);
                Ok(Some(outcome))
            }
        }
    }
}

impl PaymentLedger for MemoryStore {
    fn insert_claim(&self, claim: NewPayment, tolerance: Decimal) -> Result<Payment> {
        let index_key = (claim.event, claim.key.kind, claim.key.from_id, claim.key.to_id);
        let mut claimed = self.claims.entry(index_key).or_default();

        if let Some((existing, _)) = claimed
            .value()
            .iter()
            .find(|(_, amount)| money::within(*amount, claim.key.amount, tolerance))
        {
            return Err(SettlementError::already_claimed(claim.key, *existing));
        }

        let id = self.next_payment.fetch_add(1, Ordering::SeqCst);
        let payment = Payment {
            id,
            event: claim.event,
            kind: claim.key.kind,
            from_id: claim.key.from_id,
            to_id: claim.key.to_id,
            suggested_amount: claim.key.amount,
            amount_paid: claim.amount_paid,
            initiated_by: claim.initiated_by,
            confirmed_by: None,
            confirmed_at: None,
            created_at: Utc::now(),
        };

        self.payments.insert(id, payment.clone());
        claimed.value_mut().push((id, claim.key.amount));

        Ok(payment)
    }

    fn payment(&self, payment: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.get(&payment).map(|entry| entry.value().clone()))
    }

    fn update_payment<F>(&self, payment: PaymentId, f: F) -> Result<Payment>
    where
        F: FnOnce(&mut Payment) -> Result<()>,
    {
        let mut entry = self
            .payments
            .get_mut(&payment)
            .ok_or_else(|| SettlementError::not_found("payment", payment))?;

        let mut working = entry.value().clone();
        f(&mut working)?;
        *entry.value_mut() = working.clone();

        Ok(working)
    }

    fn payments(&self, event: EventId, kind: Option<SuggestionKind>) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| {
                let payment = entry.value();
                payment.event == event && kind.map_or(true, |kind| payment.kind == kind)
            })
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by_key(|payment| payment.id);
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recalculator::ParticipationRecalculator;
    use crate::types::SuggestionKey;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn store_with_event() -> MemoryStore {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        store.insert_event(Event::new(1, "Trip", 100, date)).unwrap();
        for (id, name) in [(1, "Ana"), (2, "Bruno"), (3, "Carla")] {
            store.upsert_participant(Participant::new(id, name)).unwrap();
            store.add_member(1, id).unwrap();
        }
        store
    }

    fn claim(amount: Decimal) -> NewPayment {
        NewPayment {
            event: 1,
            key: SuggestionKey::new(SuggestionKind::Individual, 2, 1, amount),
            amount_paid: amount,
            initiated_by: 2,
        }
    }

    #[test]
    fn test_duplicate_event_is_a_conflict() {
        let store = store_with_event();
        let date = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let result = store.insert_event(Event::new(1, "Other", 100, date));
        assert!(matches!(result, Err(SettlementError::Conflict { .. })));
        // the original is untouched
        assert_eq!(store.event(1).unwrap().unwrap().name, "Trip");
    }

    #[test]
    fn test_members_keep_insertion_order_and_dedupe() {
        let store = store_with_event();
        assert!(!store.add_member(1, 2).unwrap());
        assert_eq!(store.members(1).unwrap(), vec![1, 2, 3]);
        assert!(store.remove_member(1, 2).unwrap());
        assert_eq!(store.members(1).unwrap(), vec![1, 3]);
        assert!(!store.is_member(1, 2).unwrap());
    }

    #[test]
    fn test_add_member_requires_known_participant() {
        let store = store_with_event();
        let result = store.add_member(1, 42);
        assert!(matches!(result, Err(SettlementError::NotFound { .. })));
    }

    #[test]
    fn test_assign_subgroup_moves_between_groups() {
        let store = store_with_event();
        store.insert_subgroup(SubGroup::new(10, 1, "Family A")).unwrap();
        store.insert_subgroup(SubGroup::new(11, 1, "Family B")).unwrap();

        store.assign_subgroup(10, 1).unwrap();
        store.assign_subgroup(11, 1).unwrap();

        let groups = store.subgroups(1).unwrap();
        assert!(groups[0].members.is_empty());
        assert_eq!(groups[1].members, vec![1]);
    }

    #[test]
    fn test_with_participations_commits_on_success() {
        let store = store_with_event();
        store
            .insert_expense(Expense::new(5, 1, "Dinner", Decimal::new(9000, 2), Some(1)))
            .unwrap();

        let result = store
            .with_participations(5, |_, parts| {
                parts.push(Participation::new(5, 1));
                parts.push(Participation::new(5, 2));
                Ok(parts.len())
            })
            .unwrap();

        assert_eq!(result, Some(2));
        assert_eq!(store.participations(5).unwrap().len(), 2);
    }

    #[test]
    fn test_with_participations_discards_on_error() {
        let store = store_with_event();
        store
            .insert_expense(Expense::new(5, 1, "Dinner", Decimal::new(9000, 2), Some(1)))
            .unwrap();
        store
            .with_participations(5, |_, parts| {
                parts.push(Participation::new(5, 1));
                Ok(())
            })
            .unwrap();

        let result: Result<Option<()>> = store.with_participations(5, |_, parts| {
            parts.clear();
            Err(SettlementError::validation("boom"))
        });

        assert!(result.is_err());
        assert_eq!(store.participations(5).unwrap().len(), 1);
    }

    #[test]
    fn test_with_participations_missing_expense() {
        let store = store_with_event();
        let result = store.with_participations(99, |_, _| Ok(())).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_delete_expense_cascades_participations() {
        let store = store_with_event();
        store
            .insert_expense(Expense::new(5, 1, "Dinner", Decimal::new(9000, 2), Some(1)))
            .unwrap();
        store
            .with_participations(5, |_, parts| {
                parts.push(Participation::new(5, 1));
                Ok(())
            })
            .unwrap();

        assert!(store.delete_expense(5).unwrap());
        assert!(store.participations(5).unwrap().is_empty());
        assert!(store.expense(5).unwrap().is_none());
    }

    #[test]
    fn test_insert_expense_with_conflict_keeps_original() {
        let store = store_with_event();
        let dinner = Expense::new(5, 1, "Dinner", Decimal::new(9000, 2), Some(1));
        store
            .insert_expense_with(dinner.clone(), vec![Participation::new(5, 1), Participation::new(5, 2)])
            .unwrap();

        let result = store.insert_expense_with(
            Expense::new(5, 1, "Taxi", Decimal::new(100, 2), Some(2)),
            vec![Participation::new(5, 3)],
        );

        assert!(matches!(result, Err(SettlementError::Conflict { .. })));
        assert_eq!(store.expense(5).unwrap(), Some(dinner));
        assert_eq!(store.participations(5).unwrap().len(), 2);
    }

    #[test]
    fn test_with_participations_after_delete_leaves_no_entry() {
        let store = store_with_event();
        store
            .insert_expense_with(
                Expense::new(5, 1, "Dinner", Decimal::new(9000, 2), Some(1)),
                vec![Participation::new(5, 1)],
            )
            .unwrap();
        store.delete_expense(5).unwrap();

        let result = store
            .with_participations(5, |_, parts| {
                parts.push(Participation::new(5, 2));
                Ok(())
            })
            .unwrap();

        assert!(result.is_none());
        assert!(!store.participations.contains_key(&5));
    }

    #[test]
    fn test_concurrent_recalculations_of_one_expense_stay_consistent() {
        let store = store_with_event();
        store
            .insert_expense_with(
                Expense::new(5, 1, "Dinner", Decimal::new(10000, 2), Some(1)),
                vec![Participation::new(5, 1)],
            )
            .unwrap();
        let recalculator = ParticipationRecalculator::default();

        thread::scope(|scope| {
            let toggler = scope.spawn(|| {
                for round in 0..200 {
                    recalculator.toggle(&store, 5, round % 3 + 1).unwrap();
                }
            });
            let editor = scope.spawn(|| {
                for cents in 10_000..10_200 {
                    store.set_expense_total(5, Decimal::new(cents, 2)).unwrap();
                    recalculator.recalculate(&store, 5).unwrap();
                }
            });
            toggler.join().unwrap();
            editor.join().unwrap();
        });

        let total = store.expense(5).unwrap().unwrap().total;
        let participations = store.participations(5).unwrap();
        let owed: Decimal = participations.iter().map(|p| p.amount_owed).sum();
        assert_eq!(owed, total);

        let ids: HashSet<ParticipantId> = participations.iter().map(|p| p.participant).collect();
        assert_eq!(ids.len(), participations.len());
        // 1 toggled 67 times, 2 toggled 67 times, 3 toggled 66 times
        assert_eq!(ids, HashSet::from([2]));
    }

    #[test]
    fn test_insert_claim_rejects_duplicate_within_tolerance() {
        let store = store_with_event();
        let first = store.insert_claim(claim(Decimal::new(3000, 2)), money::ONE_CENT).unwrap();

        let result = store.insert_claim(claim(Decimal::new(3001, 2)), money::ONE_CENT);
        assert!(matches!(
            result,
            Err(SettlementError::AlreadyClaimed { payment, .. }) if payment == first.id
        ));

        // a different amount on the same pair is a different suggestion
        assert!(store
            .insert_claim(claim(Decimal::new(1500, 2)), money::ONE_CENT)
            .is_ok());
        assert_eq!(store.payments(1, None).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_claims_only_one_wins() {
        let store = Arc::new(store_with_event());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.insert_claim(claim(Decimal::new(3000, 2)), money::ONE_CENT))
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(store.payments(1, Some(SuggestionKind::Individual)).unwrap().len(), 1);
    }

    #[test]
    fn test_update_payment_discards_on_error() {
        let store = store_with_event();
        let payment = store.insert_claim(claim(Decimal::new(3000, 2)), money::ONE_CENT).unwrap();

        let result = store.update_payment(payment.id, |p| {
            p.confirmed_by = Some(1);
            Err(SettlementError::validation("nope"))
        });

        assert!(result.is_err());
        assert_eq!(store.payment(payment.id).unwrap().unwrap().confirmed_by, None);
    }

    #[test]
    fn test_payments_filtered_by_kind() {
        let store = store_with_event();
        store.insert_claim(claim(Decimal::new(3000, 2)), money::ONE_CENT).unwrap();
        store
            .insert_claim(
                NewPayment {
                    event: 1,
                    key: SuggestionKey::new(SuggestionKind::BetweenGroups, -2, -1, Decimal::new(3000, 2)),
                    amount_paid: Decimal::new(3000, 2),
                    initiated_by: 2,
                },
                money::ONE_CENT,
            )
            .unwrap();

        assert_eq!(store.payments(1, None).unwrap().len(), 2);
        assert_eq!(store.payments(1, Some(SuggestionKind::BetweenGroups)).unwrap().len(), 1);
        assert!(store.payments(2, None).unwrap().is_empty());
    }
}
