//! Event Settlement Engine CLI
//!
//! Replays a CSV journal of event ledger commands and prints a report.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- journal.csv > suggestions.csv
//! cargo run -- --report balances journal.csv > balances.csv
//! cargo run -- --strategy sync --report events --as-of 2026-06-01 journal.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 journal.csv
//! RUST_LOG=debug cargo run -- journal.csv
//! ```
//!
//! Diagnostics (skipped rows, rejected commands) go to stderr through
//! `tracing`; the report goes to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid configuration, file not found, report failure)

use event_settlement_engine::cli;
use event_settlement_engine::strategy;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let options = match args.to_replay_options() {
        Ok(options) => options,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };

    let strategy = {
        let config = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, options, config)
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        error!(error = %e, "replay failed");
        process::exit(1);
    }
}
