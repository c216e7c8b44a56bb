//! Asynchronous journal reader with batch interface
//!
//! Reads ledger commands from a CSV journal in batches using csv-async.
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of LedgerCommands
//!                  ↓
//!           csv_format module
//!           (JournalRecord, convert_journal_record)
//! ```

use crate::io::csv_format::{convert_journal_record, JournalRecord};
use crate::types::LedgerCommand;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Batch-oriented journal reader
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    line_num: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            line_num: 0,
        }
    }

    /// Read up to `batch_size` commands
    ///
    /// Rows that fail to parse or convert are logged and skipped. Returns an
    /// empty vector at end of input.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<LedgerCommand> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<JournalRecord>();

        while batch.len() < batch_size {
            let Some(row) = records.next().await else {
                break;
            };
            self.line_num += 1;
            let line = self.line_num + 1;

            match row {
                Ok(record) => match convert_journal_record(record) {
                    Ok(command) => batch.push(command),
                    Err(e) => warn!(line, error = %e, "journal record rejected"),
                },
                Err(e) => warn!(line, error = %e, "journal row could not be parsed"),
            }
        }

        batch
    }
}
