//! Spreadsheet data connector.
//!
//! Resolves a data source from configuration, fetches tabular data from a
//! backend proxy, the spreadsheet batch API or a published CSV, caches it
//! with a TTL and a rate-limit cooldown, and normalizes it into per-year
//! financial series.

pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod normalize;
pub mod range;
pub mod source;
pub mod state;
pub mod store;
pub mod table;

pub use cache::{CacheEntry, Clock, ManualClock, SheetCache, SystemClock};
pub use config::{ConfigResolver, SheetsConfig, SourceMode};
pub use connector::SheetsConnector;
pub use error::SheetsError;
pub use normalize::{normalize, parse_number, ColumnRole, NormalizedDataset};
pub use range::normalize_range;
pub use source::{ApiSource, BackendSource, CsvSource, SheetSource};
pub use state::{KpiState, TableState};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use table::{clean_header_cell, ColumnMatcher, RawTable, SheetTable};
