//! Fixed-point money helpers
//!
//! All amounts are `Decimal` values carrying two fractional digits once they
//! are stored. Division results are brought back to cents with the configured
//! [`RoundingMode`].

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits of every stored amount
pub const CENTS_SCALE: u32 = 2;

/// One cent, the default comparison tolerance
pub const ONE_CENT: Decimal = Decimal::from_parts(1, 0, 0, false, CENTS_SCALE);

/// Rounding applied when a division does not land on a whole cent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    /// 0.005 rounds to 0.01, -0.005 rounds to -0.01
    #[default]
    HalfAwayFromZero,
    /// Banker's rounding: 0.005 rounds to 0.00, 0.015 rounds to 0.02
    HalfEven,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMode::HalfAwayFromZero => f.write_str("half-away"),
            RoundingMode::HalfEven => f.write_str("half-even"),
        }
    }
}

impl FromStr for RoundingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "half-away" | "half-away-from-zero" => Ok(RoundingMode::HalfAwayFromZero),
            "half-even" | "bankers" => Ok(RoundingMode::HalfEven),
            other => Err(format!("unknown rounding mode '{}'", other)),
        }
    }
}

/// Round an amount to cents with the given mode
pub fn to_cents(amount: Decimal, mode: RoundingMode) -> Decimal {
    amount.round_dp_with_strategy(CENTS_SCALE, mode.strategy())
}

/// Whether two amounts are within `tolerance` of each other
pub fn within(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}

/// Whether an amount is within `tolerance` of zero
pub fn is_negligible(amount: Decimal, tolerance: Decimal) -> bool {
    amount.abs() <= tolerance
}
