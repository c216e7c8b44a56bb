//! Processing strategy module for journal replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! encompassing journal parsing, engine processing and report output. This
//! allows different implementations (synchronous, asynchronous batch) to be
//! selected at runtime.

use crate::cli::{ReportType, StrategyType};
use crate::config::EngineConfig;
use crate::core::{SettlementEngine, SettlementStore};
use crate::io::csv_format::{
    write_balances_csv, write_events_csv, write_group_balances_csv, write_suggestions_csv,
    EventSummary,
};
use crate::types::{EventId, SettlementError, SuggestionKind};
use chrono::NaiveDate;
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete replay pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Replay the journal at `input_path` and write the report to `output`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - The tokio runtime cannot be created (async strategy)
    /// - The report cannot be computed or written
    ///
    /// Malformed rows and rejected commands are logged and skipped; they do
    /// not make this method fail.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// What a replay computes once the journal is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    pub engine: EngineConfig,
    pub report: ReportType,
    /// "Today" for the settlement check of the events report
    pub as_of: NaiveDate,
}

impl ReplayOptions {
    pub fn new(engine: EngineConfig, report: ReportType, as_of: NaiveDate) -> Self {
        Self {
            engine,
            report,
            as_of,
        }
    }
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - Sync or Async
/// * `options` - Engine configuration and report selection
/// * `config` - Optional batch configuration (ignored for sync)
pub fn create_strategy(
    strategy_type: StrategyType,
    options: ReplayOptions,
    config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(options)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(options, config))
        }
    }
}

/// Render the selected report for `events`, in the order given
pub fn write_report<S: SettlementStore>(
    engine: &SettlementEngine<S>,
    events: &[EventId],
    options: &ReplayOptions,
    output: &mut dyn Write,
) -> Result<(), String> {
    match options.report {
        ReportType::Suggestions => {
            let mut rows = Vec::new();
            for &event in events {
                for kind in [SuggestionKind::Individual, SuggestionKind::BetweenGroups] {
                    let statuses = engine.payment_statuses(event, kind).map_err(failed(event))?;
                    rows.extend(statuses.into_iter().map(|status| (event, status)));
                }
            }
            write_suggestions_csv(&rows, output)
        }
        ReportType::Balances => {
            let mut rows = Vec::new();
            for &event in events {
                let balances = engine.participant_balances(event).map_err(failed(event))?;
                rows.extend(balances.into_iter().map(|balance| (event, balance)));
            }
            write_balances_csv(&rows, output)
        }
        ReportType::Groups => {
            let mut rows = Vec::new();
            for &event in events {
                let balances = engine.group_balances(event).map_err(failed(event))?;
                rows.extend(balances.into_iter().map(|balance| (event, balance)));
            }
            write_group_balances_csv(&rows, output)
        }
        ReportType::Events => {
            let mut rows = Vec::with_capacity(events.len());
            for &event in events {
                let record = engine.event(event).map_err(failed(event))?;
                rows.push(EventSummary {
                    event,
                    date: record.date,
                    status: record.status,
                    settled: engine
                        .is_settled(event, options.as_of)
                        .map_err(failed(event))?,
                    fully_confirmed: engine
                        .is_fully_confirmed(event, None)
                        .map_err(failed(event))?,
                });
            }
            write_events_csv(&rows, output)
        }
    }
}

fn failed(event: EventId) -> impl Fn(SettlementError) -> String {
    move |e| format!("Failed to build report for event {}: {}", event, e)
}
