use crate::config::EngineConfig;
use crate::strategy::{BatchConfig, ReplayOptions};
use crate::types::RoundingMode;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay event ledgers and report who owes whom
#[derive(Parser, Debug)]
#[command(name = "event-settlement-engine")]
#[command(about = "Replay event expense journals and compute settlements", long_about = None)]
pub struct CliArgs {
    /// Input CSV journal
    #[arg(value_name = "INPUT", help = "Path to the input CSV journal")]
    pub input_file: PathBuf,

    /// Processing strategy used to replay the journal
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for synchronous or 'async' for asynchronous"
    )]
    pub strategy: StrategyType,

    /// Number of commands per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of journal commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Number of worker threads replaying events (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    #[arg(
        long = "report",
        value_name = "REPORT",
        default_value = "suggestions",
        help = "Report written to stdout"
    )]
    pub report: ReportType,

    /// Date used by the settled check; defaults to the local date
    #[arg(long = "as-of", value_name = "YYYY-MM-DD")]
    pub as_of: Option<NaiveDate>,

    #[arg(
        long = "rounding",
        value_name = "MODE",
        default_value = "half-away",
        help = "Rounding of uneven splits: 'half-away' or 'half-even'"
    )]
    pub rounding: RoundingMode,

    #[arg(
        long = "tolerance",
        value_name = "AMOUNT",
        help = "Comparison tolerance in (0, 1.00] (default: 0.01)"
    )]
    pub tolerance: Option<Decimal>,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

/// Reports the CLI can print once the journal is replayed
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportType {
    /// Suggested transfers of both kinds with their payment state
    Suggestions,
    /// Per-participant paid, owed and net amounts
    Balances,
    /// Per-group paid, owed and net amounts, solo groups included
    Groups,
    /// Status, settled and fully-confirmed flags per event
    Events,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values fall back to the defaults; zero values are replaced by
    /// the defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Create the engine configuration from `--rounding` and `--tolerance`
    ///
    /// # Errors
    ///
    /// Returns an error message when the tolerance is out of range.
    pub fn to_engine_config(&self) -> Result<EngineConfig, String> {
        let default = EngineConfig::default();
        EngineConfig::new(self.rounding, self.tolerance.unwrap_or(default.tolerance))
            .map_err(|e| e.to_string())
    }

    /// Everything a strategy needs besides the batch configuration
    pub fn to_replay_options(&self) -> Result<ReplayOptions, String> {
        let as_of = self
            .as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        Ok(ReplayOptions::new(self.to_engine_config()?, self.report, as_of))
    }
}
