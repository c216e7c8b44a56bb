//! Event Settlement Engine Library
//! # Overview
//!
//! Shared-expense accounting for group events: participants record what they
//! paid and who shared each expense, the engine derives who owes whom, proposes
//! a short list of transfers, and tracks the claim/confirm lifecycle of the
//! payments that settle them. A CSV journal replay (sync or async) drives the
//! engine from the command line.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Event, Expense, Balance, Payment, etc.)
//! - [`config`] - Rounding mode and comparison tolerance
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Orchestration and event-level rules
//!   - [`core::recalculator`] - Even split of expense totals
//!   - [`core::balance_calculator`] - Participant and group balances
//!   - [`core::optimizer`] - Greedy debt settlement
//!   - [`core::payment_matcher`] - Claim, confirm and unconfirm
//!   - [`core::memory_store`] - In-memory persistence
//! - [`io`] - Journal readers and report writers
//! - [`strategy`] - Sync and async replay pipelines
//!
//! # Amounts
//!
//! Amounts are fixed-point decimals with two fractional digits. Two amounts
//! are considered equal when they differ by at most the configured tolerance
//! (one cent by default).
//!
//! # Payment States
//!
//! A suggestion is `UNPAID` until a matching payment is claimed, `CLAIMED`
//! while that payment awaits confirmation by the creditor, and `CONFIRMED`
//! afterwards. An event admin or the confirming participant can reopen a
//! confirmed payment.

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use config::EngineConfig;
pub use core::{GreedySettlement, MemoryStore, SettlementEngine};
pub use types::{
    Balance, Event, EventStatus, Expense, GroupBalance, LedgerCommand, Participant, Participation,
    Payment, PaymentState, RoundingMode, SettlementError, SettlementSuggestion, SubGroup,
    SuggestionKey, SuggestionKind, SuggestionStatus,
};
