//! Balance computation
//!
//! Aggregates the expense ledger of an event into per-participant and
//! per-group balances. Nothing is cached: every call reads the current
//! expenses and participations.
//!
//! Placeholder expenses (no payer) contribute nothing. Amounts attached to
//! someone who is no longer a member of the event cannot be attributed to any
//! tracked balance; they are logged and skipped.

use crate::core::traits::{Directory, ExpenseLedger};
use crate::types::{
    solo_group_id, Balance, EventId, GroupBalance, ParticipantId, Result, SettlementError,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Stateless balance calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceCalculator;

impl BalanceCalculator {
    /// Per-participant balances in membership order
    ///
    /// Members who neither paid nor owe anything are omitted.
    pub fn participant_balances<S>(&self, store: &S, event: EventId) -> Result<Vec<Balance>>
    where
        S: Directory + ExpenseLedger,
    {
        Ok(self
            .all_member_balances(store, event)?
            .into_iter()
            .filter(|balance| !balance.is_untouched())
            .collect())
    }

    /// Per-group balances: real sub-groups by id, then solo members as
    /// singleton groups in membership order
    ///
    /// Groups whose members neither paid nor owe anything are omitted.
    pub fn group_balances<S>(&self, store: &S, event: EventId) -> Result<Vec<GroupBalance>>
    where
        S: Directory + ExpenseLedger,
    {
        let balances = self.all_member_balances(store, event)?;
        let by_participant: HashMap<ParticipantId, &Balance> = balances
            .iter()
            .map(|balance| (balance.participant, balance))
            .collect();

        let mut groups = Vec::new();
        let mut grouped: HashSet<ParticipantId> = HashSet::new();

        for subgroup in store.subgroups(event)? {
            let mut group = GroupBalance {
                group: subgroup.id,
                name: subgroup.name.clone(),
                members: Vec::with_capacity(subgroup.members.len()),
                total_paid: Decimal::ZERO,
                total_owed: Decimal::ZERO,
                net: Decimal::ZERO,
            };

            for member in &subgroup.members {
                let Some(balance) = by_participant.get(member) else {
                    warn!(event, group = subgroup.id, participant = member, "sub-group member is not an event member");
                    continue;
                };
                group.members.push(*member);
                group.total_paid += balance.total_paid;
                group.total_owed += balance.total_owed;
                grouped.insert(*member);
            }

            group.net = group.total_paid - group.total_owed;
            groups.push(group);
        }

        for balance in &balances {
            if grouped.contains(&balance.participant) {
                continue;
            }
            groups.push(GroupBalance {
                group: solo_group_id(balance.participant),
                name: balance.name.clone(),
                members: vec![balance.participant],
                total_paid: balance.total_paid,
                total_owed: balance.total_owed,
                net: balance.net,
            });
        }

        groups.retain(|group| !group.is_untouched());
        Ok(groups)
    }

    /// Balances of every member, untouched ones included
    fn all_member_balances<S>(&self, store: &S, event: EventId) -> Result<Vec<Balance>>
    where
        S: Directory + ExpenseLedger,
    {
        if store.event(event)?.is_none() {
            return Err(SettlementError::not_found("event", event));
        }

        let mut balances = Vec::new();
        let mut index: HashMap<ParticipantId, usize> = HashMap::new();
        for member in store.members(event)? {
            let name = store
                .participant(member)?
                .map(|participant| participant.name)
                .unwrap_or_default();
            index.insert(member, balances.len());
            balances.push(Balance::new(member, name));
        }

        for expense in store.expenses(event)? {
            let Some(payer) = expense.payer else {
                continue;
            };

            match index.get(&payer) {
                Some(&slot) => balances[slot].total_paid += expense.total,
                None => warn!(
                    event,
                    expense = expense.id,
                    payer,
                    "payer is not an event member, amount paid left unattributed"
                ),
            }

            for participation in store.participations(expense.id)? {
                match index.get(&participation.participant) {
                    Some(&slot) => balances[slot].total_owed += participation.amount_owed,
                    None => warn!(
                        event,
                        expense = expense.id,
                        participant = participation.participant,
                        "participation of a non-member, amount owed left unattributed"
                    ),
                }
            }
        }

        for balance in &mut balances {
            balance.net = balance.total_paid - balance.total_owed;
        }

        Ok(balances)
    }
}
