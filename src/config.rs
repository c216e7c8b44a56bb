//! Engine configuration
//!
//! The engine is tuned by two knobs: how an expense total is rounded when it
//! does not divide evenly, and the tolerance used whenever two amounts are
//! compared (dust threshold, duplicate claims, settled balances).

use crate::types::money::{RoundingMode, ONE_CENT};
use crate::types::{Result, SettlementError};
use rust_decimal::Decimal;

/// Largest tolerance accepted; anything above would merge distinct suggestions
const MAX_TOLERANCE: Decimal = Decimal::from_parts(100, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub rounding: RoundingMode,
    pub tolerance: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounding: RoundingMode::default(),
            tolerance: ONE_CENT,
        }
    }
}

impl EngineConfig {
    /// Build a validated configuration
    ///
    /// # Errors
    ///
    /// Returns a validation error if the tolerance is not in `(0, 1.00]`.
    pub fn new(rounding: RoundingMode, tolerance: Decimal) -> Result<Self> {
        if tolerance <= Decimal::ZERO || tolerance > MAX_TOLERANCE {
            return Err(SettlementError::validation(format!(
                "tolerance must be in (0, {}], got {}",
                MAX_TOLERANCE, tolerance
            )));
        }

        Ok(Self {
            rounding,
            tolerance,
        })
    }
}
