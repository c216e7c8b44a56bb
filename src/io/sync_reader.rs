//! Synchronous journal reader with iterator interface
//!
//! Streams ledger commands from a CSV journal one row at a time, delegating
//! row conversion to the csv_format module.
//!
//! ```no_run
//! use event_settlement_engine::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("journal.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(command) => println!("Replaying: {:?}", command),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found) are returned from `new()`
//! - Row parsing errors are yielded as `Err` items carrying the line number

use crate::io::csv_format::{convert_journal_record, JournalRecord};
use crate::types::{LedgerCommand, SettlementError};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// Streaming journal reader
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl SyncReader {
    /// Open a journal file
    ///
    /// Fields are trimmed and rows may omit trailing columns.
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<LedgerCommand, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<JournalRecord>();
        let row = deserializer.next()?;

        // Header is line 1
        self.line_num += 1;
        let line = self.line_num + 1;

        Some(match row {
            Ok(record) => convert_journal_record(record).map_err(|e| format!("Line {}: {}", line, e)),
            Err(e) => Err(SettlementError::Parse {
                line: Some(line as u64),
                message: e.to_string(),
            }
            .to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SuggestionKind;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "type,event,id,participant,target,amount,actor,label\n";

    fn create_temp_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(HEADER.as_bytes())
            .and_then(|_| file.write_all(rows.as_bytes()))
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_sync_reader_iterates_commands() {
        let file = create_temp_csv(
            "event,1,,,,,100,2026-05-10\n\
             join,1,,1,,,201,Ana\n\
             expense,1,7,1,,90.00,,Dinner\n\
             confirm,1,,2,1,,1,\n",
        );

        let commands: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(commands.len(), 4);
        assert!(matches!(commands[0], Ok(LedgerCommand::OpenEvent { event: 1, .. })));
        assert_eq!(
            commands[1],
            Ok(LedgerCommand::Join {
                event: 1,
                participant: 1,
                user: Some(201),
                name: "Ana".to_string(),
            })
        );
        assert!(matches!(
            &commands[2],
            Ok(LedgerCommand::AddExpense { total, payer: Some(1), .. }) if *total == Decimal::new(9000, 2)
        ));
        assert!(matches!(
            commands[3],
            Ok(LedgerCommand::Confirm { kind: SuggestionKind::Individual, from_id: 2, to_id: 1, confirmer: 1, .. })
        ));
    }

    #[test]
    fn test_sync_reader_accepts_short_rows() {
        let file = create_temp_csv("cancel,3\nleave,3,,5\n");

        let commands: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(commands[0], Ok(LedgerCommand::Cancel { event: 3 }));
        assert_eq!(
            commands[1],
            Ok(LedgerCommand::Leave {
                event: 3,
                participant: 5
            })
        );
    }

    #[test]
    fn test_sync_reader_includes_line_numbers_in_errors() {
        let file = create_temp_csv(
            "event,1,,,,,100,2026-05-10\n\
             total,1,7,,,lots,,\n\
             event,x,,,,,100,2026-05-10\n\
             cancel,1\n",
        );

        let commands: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(commands.len(), 4);
        assert!(commands[0].is_ok());
        let conversion = commands[1].as_ref().unwrap_err();
        assert!(conversion.contains("Line 3"));
        assert!(conversion.contains("Invalid amount"));
        let parse = commands[2].as_ref().unwrap_err();
        assert!(parse.contains("CSV parse error at line 4"));
        assert!(commands[3].is_ok());
    }

    #[test]
    fn test_sync_reader_handles_whitespace() {
        let file = create_temp_csv("  split , 1 , 7 , 2 ,,,,\n");

        let commands: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(
            commands[0],
            Ok(LedgerCommand::ToggleParticipation {
                event: 1,
                expense: 7,
                participant: 2
            })
        );
    }
}
