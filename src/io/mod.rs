//! I/O module
//!
//! Handles journal parsing and report output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (journal conversion, report serialization)
//! - `sync_reader` - Synchronous journal reader with iterator interface
//! - `async_reader` - Asynchronous journal reader with batch reading interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_journal_record, write_balances_csv, write_events_csv, write_group_balances_csv,
    write_suggestions_csv, EventSummary, JournalRecord,
};
pub use sync_reader::SyncReader;
