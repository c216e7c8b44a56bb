//! Participation recalculation
//!
//! Keeps every expense's participations consistent with its total: the total is
//! divided evenly, rounded to cents, and whatever the rounding left over is
//! added to the first participation so the shares always sum to the total.
//!
//! Recalculation never decides *who* participates; membership edits go through
//! [`ParticipationRecalculator::replace`] and [`ParticipationRecalculator::toggle`],
//! which change the set and re-split inside the same atomic unit.

use crate::core::traits::ExpenseLedger;
use crate::types::money::{self, RoundingMode};
use crate::types::{Expense, ExpenseId, ParticipantId, Participation, Result, SettlementError};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

/// Even-split recalculator for expense participations
#[derive(Debug, Clone, Copy, Default)]
pub struct ParticipationRecalculator {
    rounding: RoundingMode,
}

impl ParticipationRecalculator {
    pub fn new(rounding: RoundingMode) -> Self {
        Self { rounding }
    }

    /// Re-split an expense's total over its current participations
    ///
    /// A missing expense or an expense without participations is a no-op. The
    /// update is all-or-nothing.
    pub fn recalculate<L: ExpenseLedger>(&self, ledger: &L, expense: ExpenseId) -> Result<()> {
        let rounding = self.rounding;
        let outcome = ledger.with_participations(expense, |current, participations| {
            split_evenly(current.total, participations, rounding)
        })?;

        match outcome {
            None => debug!(expense, "recalculation skipped, expense no longer exists"),
            Some(0) => debug!(expense, "recalculation skipped, no participations"),
            Some(count) => debug!(expense, count, "participations recalculated"),
        }

        Ok(())
    }

    /// Participations of an expense that is not stored yet, split evenly
    ///
    /// Duplicate ids keep their first occurrence.
    pub fn split_new(
        &self,
        expense: &Expense,
        participants: &[ParticipantId],
    ) -> Result<Vec<Participation>> {
        let mut participations: Vec<Participation> = dedupe_first(participants)
            .into_iter()
            .map(|participant| Participation::new(expense.id, participant))
            .collect();
        split_evenly(expense.total, &mut participations, self.rounding)?;
        Ok(participations)
    }

    /// Replace an expense's participants wholesale and re-split
    ///
    /// Duplicate ids are dropped, keeping the first occurrence. Returns the
    /// resulting participant list.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the expense does not exist, or whatever `accept`
    /// returns for a rejected participant; nothing is written in either case.
    pub fn replace<L, A>(
        &self,
        ledger: &L,
        expense: ExpenseId,
        participants: &[ParticipantId],
        accept: A,
    ) -> Result<Vec<ParticipantId>>
    where
        L: ExpenseLedger,
        A: Fn(ParticipantId) -> Result<()>,
    {
        let unique = dedupe_first(participants);
        for &participant in &unique {
            accept(participant)?;
        }

        let rounding = self.rounding;
        let written = ledger
            .with_participations(expense, |current, participations| {
                *participations = unique
                    .iter()
                    .map(|&participant| Participation::new(current.id, participant))
                    .collect();
                split_evenly(current.total, participations, rounding)?;
                Ok(unique.clone())
            })?
            .ok_or_else(|| SettlementError::not_found("expense", expense))?;

        debug!(expense, count = written.len(), "participations replaced");
        Ok(written)
    }

    /// Include or exclude one participant and re-split
    ///
    /// Returns `true` if the participant is included afterwards.
    pub fn toggle<L: ExpenseLedger>(
        &self,
        ledger: &L,
        expense: ExpenseId,
        participant: ParticipantId,
    ) -> Result<bool> {
        let rounding = self.rounding;
        let included = ledger
            .with_participations(expense, |current, participations| {
                let before = participations.len();
                participations.retain(|p| p.participant != participant);
                let included = participations.len() == before;
                if included {
                    participations.push(Participation::new(current.id, participant));
                }
                split_evenly(current.total, participations, rounding)?;
                Ok(included)
            })?
            .ok_or_else(|| SettlementError::not_found("expense", expense))?;

        debug!(expense, participant, included, "participation toggled");
        Ok(included)
    }

    /// Drop one participant from an expense, if present, and re-split
    ///
    /// Returns `true` if a participation was removed.
    pub fn exclude<L: ExpenseLedger>(
        &self,
        ledger: &L,
        expense: ExpenseId,
        participant: ParticipantId,
    ) -> Result<bool> {
        let rounding = self.rounding;
        let removed = ledger
            .with_participations(expense, |current, participations| {
                let before = participations.len();
                participations.retain(|p| p.participant != participant);
                if participations.len() == before {
                    return Ok(false);
                }
                split_evenly(current.total, participations, rounding)?;
                Ok(true)
            })?
            .unwrap_or(false);

        Ok(removed)
    }
}

/// Divide `total` evenly over `participations` in place
///
/// Every share is `round(total / n, 2)`; the remainder `total - n * share` goes
/// to the first participation, so the shares sum to `total` exactly. Returns
/// the number of participations.
pub fn split_evenly(
    total: Decimal,
    participations: &mut [Participation],
    rounding: RoundingMode,
) -> Result<usize> {
    let count = participations.len();
    if count == 0 {
        return Ok(0);
    }

    let divisor = Decimal::from(count as u64);
    let share = total
        .checked_div(divisor)
        .map(|raw| money::to_cents(raw, rounding))
        .ok_or_else(|| SettlementError::validation(format!("cannot split {} by {}", total, count)))?;

    let remainder = share
        .checked_mul(divisor)
        .and_then(|allocated| total.checked_sub(allocated))
        .ok_or_else(|| SettlementError::validation(format!("cannot split {} by {}", total, count)))?;

    for participation in participations.iter_mut() {
        participation.amount_owed = share;
    }
    if !remainder.is_zero() {
        participations[0].amount_owed = share + remainder;
    }

    Ok(count)
}

fn dedupe_first(participants: &[ParticipantId]) -> Vec<ParticipantId> {
    let mut seen = HashSet::with_capacity(participants.len());
    participants
        .iter()
        .copied()
        .filter(|participant| seen.insert(*participant))
        .collect()
}
