//! Synchronous processing strategy
//!
//! Single-threaded replay: the `SyncReader` streams commands one row at a
//! time and each is applied to the engine before the next is read. Memory is
//! bounded by the ledger state, not by the journal length.

use crate::core::{MemoryStore, SettlementEngine};
use crate::io::sync_reader::SyncReader;
use crate::strategy::{write_report, ProcessingStrategy, ReplayOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Synchronous processing strategy
///
/// ```no_run
/// use event_settlement_engine::cli::ReportType;
/// use event_settlement_engine::config::EngineConfig;
/// use event_settlement_engine::strategy::{ProcessingStrategy, ReplayOptions, SyncProcessingStrategy};
/// use chrono::NaiveDate;
/// use std::path::Path;
///
/// let options = ReplayOptions::new(
///     EngineConfig::default(),
///     ReportType::Suggestions,
///     NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
/// );
/// let strategy = SyncProcessingStrategy::new(options);
/// strategy
///     .process(Path::new("journal.csv"), &mut std::io::stdout())
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SyncProcessingStrategy {
    options: ReplayOptions,
}

impl SyncProcessingStrategy {
    pub fn new(options: ReplayOptions) -> Self {
        Self { options }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let store = Arc::new(MemoryStore::new());
        let engine = SettlementEngine::new(Arc::clone(&store), self.options.engine);

        let reader = SyncReader::new(input_path)?;

        for result in reader {
            match result {
                Ok(command) => {
                    let event = command.event();
                    if let Err(e) = engine.apply(command) {
                        warn!(event, error = %e, "command rejected");
                    }
                }
                Err(e) => warn!(error = %e, "journal record skipped"),
            }
        }

        write_report(&engine, &store.event_ids(), &self.options, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ReportType;
    use crate::config::EngineConfig;
    use chrono::NaiveDate;
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

    fn strategy(report: ReportType) -> SyncProcessingStrategy {
        SyncProcessingStrategy::new(ReplayOptions::new(
            EngineConfig::default(),
            report,
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        ))
    }

    const DINNER: &str = "event,1,,,,,100,2026-05-10\n\
                          join,1,,1,,,201,A\n\
                          join,1,,2,,,202,B\n\
                          join,1,,3,,,203,C\n\
                          expense,1,1,1,,90.00,,Dinner\n\
                          split,1,1,1,,,,\n\
                          split,1,1,2,,,,\n\
                          split,1,1,3,,,,\n";

    #[test]
    fn test_sync_strategy_reports_balances() {
        let file = create_temp_csv(DINNER);
        let mut output = Vec::new();

        strategy(ReportType::Balances)
            .process(file.path(), &mut output)
            .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "event,participant,name,paid,owed,net\n\
             1,1,A,90.00,30.00,60.00\n\
             1,2,B,0.00,30.00,-30.00\n\
             1,3,C,0.00,30.00,-30.00\n"
        );
    }

    #[test]
    fn test_sync_strategy_handles_missing_file() {
        let mut output = Vec::new();
        let result = strategy(ReportType::Balances).process(Path::new("nonexistent.csv"), &mut output);
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_sync_strategy_continues_after_rejections() {
        // Malformed amount, then a claim by a non-member
        let rows = format!(
            "{}total,1,1,,,lots,,\nclaim,1,,2,1,30.00,9,\nclaim,1,,3,1,30.00,3,\n",
            DINNER
        );
        let file = create_temp_csv(&rows);
        let mut output = Vec::new();

        strategy(ReportType::Suggestions)
            .process(file.path(), &mut output)
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("1,INDIVIDUAL,0,3,C,1,A,30.00,CLAIMED"));
        assert!(text.contains("1,INDIVIDUAL,1,2,B,1,A,30.00,UNPAID"));
    }

    #[test]
    fn test_sync_strategy_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncProcessingStrategy>();
    }
}
