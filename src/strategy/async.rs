//! Asynchronous batch processing strategy
//!
//! Reads the journal in batches and replays each batch with one task per
//! event on a multi-threaded tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── BatchProcessor (event partitioning + tasks)
//!     └── SettlementEngine (shared through Arc)
//!         └── MemoryStore (DashMap-backed)
//! ```
//!
//! Batches are replayed one after the other, so an event whose commands span
//! several batches still sees them in journal order.

use crate::core::{BatchProcessor, MemoryStore, SettlementEngine};
use crate::io::async_reader::AsyncReader;
use crate::strategy::{write_report, ProcessingStrategy, ReplayOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for batch processing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of commands per batch
    pub batch_size: usize,
    /// Worker threads of the replay runtime
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a BatchConfig, replacing zero values with the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                fallback = default.batch_size,
                "invalid batch_size 0, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                fallback = default.max_concurrent_batches,
                "invalid max_concurrent_batches 0, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
///
/// Produces the same report as [`super::SyncProcessingStrategy`] for any
/// journal. Batches run one after another; within a batch, commands of one
/// event are never reordered, and events that share a participant, sub-group
/// or expense id replay in the same task (see
/// [`BatchProcessor::partition_by_event`]).
#[derive(Debug, Clone, Copy)]
pub struct AsyncProcessingStrategy {
    options: ReplayOptions,
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(options: ReplayOptions, config: BatchConfig) -> Self {
        Self { options, config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let engine = Arc::new(SettlementEngine::new(
                Arc::clone(&store),
                self.options.engine,
            ));
            let processor = BatchProcessor::new(Arc::clone(&engine));

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;

            // csv-async reads through the futures AsyncRead traits
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            let mut batches = 0usize;
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                batches += 1;
                processor.process_batch(batch).await;
            }
            debug!(batches, "journal replayed");

            write_report(&engine, &store.event_ids(), &self.options, output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ReportType;
    use crate::config::EngineConfig;
    use crate::strategy::SyncProcessingStrategy;
    use chrono::NaiveDate;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "type,event,id,participant,target,amount,actor,label\n";

    fn create_temp_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(format!("{}{}", HEADER, rows).as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn options(report: ReportType) -> ReplayOptions {
        ReplayOptions::new(
            EngineConfig::default(),
            report,
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        )
    }

    // Two events interleaved; event 2 settles its only debt
    const TWO_EVENTS: &str = "event,1,,,,,100,2026-05-10\n\
                              event,2,,,,,100,2026-05-11\n\
                              join,1,,1,,,201,A\n\
                              join,2,,4,,,204,D\n\
                              join,1,,2,,,202,B\n\
                              join,2,,5,,,205,E\n\
                              expense,1,1,1,,90.00,,Dinner\n\
                              expense,2,2,4,,50.00,,Taxi\n\
                              split,1,1,1,,,,\n\
                              split,2,2,4,,,,\n\
                              split,1,1,2,,,,\n\
                              split,2,2,5,,,,\n\
                              claim,2,,5,4,25.00,5,\n\
                              confirm,2,,5,4,25.00,4,\n";

    #[test]
    fn test_async_strategy_reports_suggestions() {
        let file = create_temp_csv(TWO_EVENTS);
        let strategy = AsyncProcessingStrategy::new(options(ReportType::Suggestions), BatchConfig::default());
        let mut output = Vec::new();

        strategy.process(file.path(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("1,INDIVIDUAL,0,2,B,1,A,45.00,UNPAID"));
        assert!(text.contains("2,INDIVIDUAL,0,5,E,4,D,25.00,CONFIRMED"));
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy = AsyncProcessingStrategy::new(options(ReportType::Balances), BatchConfig::default());
        let mut output = Vec::new();

        let result = strategy.process(Path::new("nonexistent.csv"), &mut output);
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[rstest]
    #[case::one_per_batch(1)]
    #[case::uneven_batches(3)]
    #[case::single_batch(1000)]
    fn test_async_matches_sync_for_any_batch_size(
        #[case] batch_size: usize,
        #[values(ReportType::Suggestions, ReportType::Balances, ReportType::Events)]
        report: ReportType,
    ) {
        let file = create_temp_csv(TWO_EVENTS);

        let mut expected = Vec::new();
        SyncProcessingStrategy::new(options(report))
            .process(file.path(), &mut expected)
            .unwrap();

        let mut actual = Vec::new();
        AsyncProcessingStrategy::new(options(report), BatchConfig::new(batch_size, 2))
            .process(file.path(), &mut actual)
            .unwrap();

        assert_eq!(String::from_utf8(actual).unwrap(), String::from_utf8(expected).unwrap());
    }

    #[test]
    fn test_batch_config_zero_values_fall_back() {
        let config = BatchConfig::new(0, 0);
        assert_eq!(config, BatchConfig::default());
    }
}
