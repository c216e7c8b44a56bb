//! Payment matching and the confirmation state machine
//!
//! A suggestion moves `UNPAID -> CLAIMED -> CONFIRMED`, and an authorized
//! actor may move it back from `CONFIRMED` to `CLAIMED`. Claims are never
//! deleted. Payments are tied to live suggestions by
//! [`SuggestionKey`](crate::types::SuggestionKey), so the link survives the
//! suggestion list being recomputed on every read.

use crate::core::traits::{AccessPolicy, Directory, PaymentLedger};
use crate::types::money;
use crate::types::{
    solo_participant, Event, NewPayment, ParticipantId, Payment, PaymentId, PaymentState, Result,
    RoundingMode, SettlementError, SettlementSuggestion, SuggestionKey, SuggestionKind,
    SuggestionStatus, UserId,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

/// Claim/confirm/unconfirm rules with a configurable amount tolerance
#[derive(Debug, Clone, Copy)]
pub struct PaymentMatcher {
    tolerance: Decimal,
    /// Applied to the amount a claimant reports as paid
    rounding: RoundingMode,
}

impl Default for PaymentMatcher {
    fn default() -> Self {
        Self::new(money::ONE_CENT, RoundingMode::default())
    }
}

impl PaymentMatcher {
    pub fn new(tolerance: Decimal, rounding: RoundingMode) -> Self {
        Self {
            tolerance,
            rounding,
        }
    }

    /// Record that the suggestion identified by `key` was paid
    ///
    /// `current` is the freshly recomputed suggestion list of the same kind;
    /// the key must still appear in it.
    ///
    /// # Errors
    ///
    /// - `NotAMember` if the claimant or an endpoint is not part of the event
    /// - `InvalidSuggestion` if the key is self-referential or not positive
    /// - `Validation` if `amount_paid` is not positive
    /// - `AlreadyClaimed` if a payment with a matching key exists
    /// - `InconsistentSuggestion` if the key is absent from `current`
    pub fn claim<S>(
        &self,
        store: &S,
        event: &Event,
        key: SuggestionKey,
        claimant: ParticipantId,
        amount_paid: Decimal,
        current: &[SettlementSuggestion],
    ) -> Result<Payment>
    where
        S: Directory + PaymentLedger,
    {
        if !store.is_member(event.id, claimant)? {
            return Err(SettlementError::not_a_member(event.id, claimant, "claimant"));
        }
        self.check_endpoint(store, event, key.kind, key.from_id, "debtor")?;
        self.check_endpoint(store, event, key.kind, key.to_id, "creditor")?;

        if key.from_id == key.to_id {
            return Err(SettlementError::invalid_suggestion(format!(
                "debtor and creditor are both {}",
                key.from_id
            )));
        }
        if key.amount <= Decimal::ZERO {
            return Err(SettlementError::invalid_suggestion(format!(
                "amount must be positive, got {}",
                key.amount
            )));
        }
        if amount_paid <= Decimal::ZERO {
            return Err(SettlementError::validation(format!(
                "amount paid must be positive, got {}",
                amount_paid
            )));
        }

        if let Some(existing) = store
            .payments(event.id, Some(key.kind))?
            .into_iter()
            .find(|payment| payment.key().matches(&key, self.tolerance))
        {
            return Err(SettlementError::already_claimed(key, existing.id));
        }

        if !current
            .iter()
            .any(|suggestion| suggestion.key().matches(&key, self.tolerance))
        {
            return Err(SettlementError::inconsistent_suggestion(event.id, key));
        }

        // The ledger repeats the duplicate check under its own lock
        let payment = store.insert_claim(
            NewPayment {
                event: event.id,
                key,
                amount_paid: money::to_cents(amount_paid, self.rounding),
                initiated_by: claimant,
            },
            self.tolerance,
        )?;

        info!(
            event = event.id,
            payment = payment.id,
            claimant,
            suggestion = %key,
            "payment claimed"
        );
        Ok(payment)
    }

    /// Mark a claimed payment as received
    ///
    /// Individual payments are confirmed by the creditor. Group payments are
    /// confirmed by any member of the credited sub-group, or by the solo
    /// participant behind a negative group id.
    pub fn confirm<S>(&self, store: &S, payment: PaymentId, confirmer: ParticipantId) -> Result<Payment>
    where
        S: Directory + PaymentLedger,
    {
        let current = store
            .payment(payment)?
            .ok_or_else(|| SettlementError::not_found("payment", payment))?;

        if current.is_confirmed() {
            return Err(SettlementError::already_confirmed(payment));
        }
        if !self.may_confirm(store, &current, confirmer)? {
            return Err(SettlementError::not_authorized(confirmer, "confirm", payment));
        }

        let confirmed = store.update_payment(payment, |stored| {
            if stored.is_confirmed() {
                return Err(SettlementError::already_confirmed(stored.id));
            }
            stored.confirmed_by = Some(confirmer);
            stored.confirmed_at = Some(Utc::now());
            Ok(())
        })?;

        info!(event = confirmed.event, payment, confirmer, "payment confirmed");
        Ok(confirmed)
    }

    /// Reopen a confirmed payment
    ///
    /// Allowed for event admins and for the user behind the confirming
    /// participant.
    pub fn unconfirm<S>(
        &self,
        store: &S,
        policy: &dyn AccessPolicy,
        payment: PaymentId,
        user: UserId,
    ) -> Result<Payment>
    where
        S: Directory + PaymentLedger,
    {
        let current = store
            .payment(payment)?
            .ok_or_else(|| SettlementError::not_found("payment", payment))?;

        let Some(confirmed_by) = current.confirmed_by.filter(|_| current.is_confirmed()) else {
            return Err(SettlementError::not_confirmed(payment));
        };

        let event = store
            .event(current.event)?
            .ok_or_else(|| SettlementError::not_found("event", current.event))?;

        let is_confirmer = store
            .participant(confirmed_by)?
            .and_then(|participant| participant.user)
            == Some(user);

        if !policy.is_event_admin(&event, user) && !is_confirmer {
            return Err(SettlementError::user_not_authorized(user, "unconfirm", payment));
        }

        let reopened = store.update_payment(payment, |stored| {
            if !stored.is_confirmed() {
                return Err(SettlementError::not_confirmed(stored.id));
            }
            stored.confirmed_by = None;
            stored.confirmed_at = None;
            Ok(())
        })?;

        info!(event = reopened.event, payment, user, "payment confirmation withdrawn");
        Ok(reopened)
    }

    /// Pair every live suggestion with the payment matching its key
    pub fn annotate(
        &self,
        suggestions: Vec<SettlementSuggestion>,
        payments: &[Payment],
    ) -> Vec<SuggestionStatus> {
        suggestions
            .into_iter()
            .enumerate()
            .map(|(index, suggestion)| {
                let payment = self.matching_payment(&suggestion, payments).cloned();
                let state = payment
                    .as_ref()
                    .map_or(PaymentState::Unpaid, Payment::state);
                SuggestionStatus {
                    index,
                    suggestion,
                    state,
                    payment,
                }
            })
            .collect()
    }

    /// Every suggestion has a confirmed payment; vacuously true when empty
    pub fn is_fully_confirmed(
        &self,
        suggestions: &[SettlementSuggestion],
        payments: &[Payment],
    ) -> bool {
        suggestions.iter().all(|suggestion| {
            payments.iter().any(|payment| {
                payment.is_confirmed() && payment.key().matches(&suggestion.key(), self.tolerance)
            })
        })
    }

    /// Confirmed payments win over open claims for the same key
    fn matching_payment<'a>(
        &self,
        suggestion: &SettlementSuggestion,
        payments: &'a [Payment],
    ) -> Option<&'a Payment> {
        let key = suggestion.key();
        let mut matching = payments
            .iter()
            .filter(|payment| payment.key().matches(&key, self.tolerance));
        let first = matching.next()?;
        if first.is_confirmed() {
            return Some(first);
        }
        Some(matching.find(|payment| payment.is_confirmed()).unwrap_or(first))
    }

    fn check_endpoint<S: Directory>(
        &self,
        store: &S,
        event: &Event,
        kind: SuggestionKind,
        id: i64,
        role: &str,
    ) -> Result<()> {
        let valid = match kind {
            SuggestionKind::Individual => store.is_member(event.id, id)?,
            SuggestionKind::BetweenGroups => match solo_participant(id) {
                Some(participant) => store.is_member(event.id, participant)?,
                None => store.subgroups(event.id)?.iter().any(|group| group.id == id),
            },
        };

        if valid {
            Ok(())
        } else {
            Err(SettlementError::not_a_member(event.id, id, role))
        }
    }

    fn may_confirm<S: Directory>(
        &self,
        store: &S,
        payment: &Payment,
        confirmer: ParticipantId,
    ) -> Result<bool> {
        match payment.kind {
            SuggestionKind::Individual => Ok(payment.to_id == confirmer),
            SuggestionKind::BetweenGroups => match solo_participant(payment.to_id) {
                Some(participant) => Ok(participant == confirmer),
                None => Ok(store
                    .subgroups(payment.event)?
                    .iter()
                    .any(|group| group.id == payment.to_id && group.contains(confirmer))),
            },
        }
    }
}
