//! Core business logic module
//!
//! This module contains the settlement components:
//! - `traits` - Persistence, authorization and optimizer seams
//! - `memory_store` - DashMap-backed store implementing every persistence trait
//! - `recalculator` - Even split of expense totals over participations
//! - `balance_calculator` - Participant and group balances
//! - `optimizer` - Greedy settlement strategy
//! - `payment_matcher` - Claim/confirm state machine and suggestion matching
//! - `engine` - Facade orchestrating the components
//! - `batch_processor` - Event-partitioned concurrent journal replay

pub mod balance_calculator;
pub mod batch_processor;
pub mod engine;
pub mod memory_store;
pub mod optimizer;
pub mod payment_matcher;
pub mod recalculator;
pub mod traits;

pub use balance_calculator::BalanceCalculator;
pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use engine::SettlementEngine;
pub use memory_store::MemoryStore;
pub use optimizer::GreedySettlement;
pub use payment_matcher::PaymentMatcher;
pub use recalculator::{split_evenly, ParticipationRecalculator};
pub use traits::{
    AccessPolicy, Directory, ExpenseLedger, OrganizerPolicy, PaymentLedger, SettlementStore,
    SettlementStrategy,
};
