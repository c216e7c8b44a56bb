//! Greedy settlement optimizer
//!
//! Pairs the largest remaining creditor with the largest remaining debtor
//! until one side runs out. The same routine serves participant-level and
//! group-level balances through [`NetPosition`].
//!
//! The heuristic does not guarantee the minimum number of transfers; any
//! strategy whose transfers replay every position to within the tolerance of
//! zero is an equally valid [`SettlementStrategy`].

use crate::config::EngineConfig;
use crate::core::traits::SettlementStrategy;
use crate::types::money::{self, ONE_CENT};
use crate::types::{NetPosition, RoundingMode, SettlementSuggestion, SuggestionKind};
use rust_decimal::Decimal;

/// Two-pointer greedy strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedySettlement {
    /// Transfers at or below this amount are not emitted
    tolerance: Decimal,
    rounding: RoundingMode,
}

impl Default for GreedySettlement {
    fn default() -> Self {
        Self {
            tolerance: ONE_CENT,
            rounding: RoundingMode::default(),
        }
    }
}

impl GreedySettlement {
    pub fn new(tolerance: Decimal, rounding: RoundingMode) -> Self {
        Self {
            tolerance,
            rounding,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.tolerance, config.rounding)
    }
}

struct Position<'a> {
    id: i64,
    label: &'a str,
    remaining: Decimal,
}

impl SettlementStrategy for GreedySettlement {
    fn settle<P: NetPosition>(
        &self,
        positions: &[P],
        kind: SuggestionKind,
    ) -> Vec<SettlementSuggestion> {
        let mut working: Vec<Position<'_>> = positions
            .iter()
            .map(|position| Position {
                id: position.party_id(),
                label: position.label(),
                remaining: position.net(),
            })
            .collect();

        // Stable: ties keep input order
        working.sort_by(|a, b| b.remaining.cmp(&a.remaining));

        let mut suggestions = Vec::new();
        if working.len() < 2 {
            return suggestions;
        }

        let mut creditor = 0;
        let mut debtor = working.len() - 1;

        while creditor < debtor {
            if working[creditor].remaining <= Decimal::ZERO
                || working[debtor].remaining >= Decimal::ZERO
            {
                break;
            }

            let transfer = working[creditor]
                .remaining
                .min(-working[debtor].remaining);

            if transfer > self.tolerance {
                suggestions.push(SettlementSuggestion {
                    kind,
                    from_id: working[debtor].id,
                    from: working[debtor].label.to_string(),
                    to_id: working[creditor].id,
                    to: working[creditor].label.to_string(),
                    amount: money::to_cents(transfer, self.rounding),
                });
            }

            working[creditor].remaining -= transfer;
            working[debtor].remaining += transfer;

            if money::is_negligible(working[creditor].remaining, self.tolerance) {
                creditor += 1;
            }
            if money::is_negligible(working[debtor].remaining, self.tolerance) {
                debtor -= 1;
            }
        }

        suggestions
    }
}
