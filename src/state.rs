// src/state.rs

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tracing::{debug, warn};

use crate::connector::SheetsConnector;
use crate::normalize::NormalizedDataset;
use crate::table::{ColumnMatcher, SheetTable};

/// Clears the busy flag when the load finishes, however it finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Check-then-set: two callers racing between the check and the store both
/// get through.
fn enter(flag: &AtomicBool) -> Option<BusyGuard<'_>> {
    if flag.load(Ordering::SeqCst) {
        return None;
    }
    flag.store(true, Ordering::SeqCst);
    Some(BusyGuard(flag))
}

/// Shared dataset state for a dashboard session.
///
/// A failed load records a message and leaves the last good dataset in place.
pub struct KpiState {
    connector: Arc<SheetsConnector>,
    loading: AtomicBool,
    error: Mutex<String>,
    data: Mutex<NormalizedDataset>,
}

impl KpiState {
    pub fn new(connector: Arc<SheetsConnector>) -> Self {
        Self {
            connector,
            loading: AtomicBool::new(false),
            error: Mutex::new(String::new()),
            data: Mutex::new(NormalizedDataset::default()),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Last error message; empty after a successful load.
    pub fn error(&self) -> String {
        self.error.lock().unwrap().clone()
    }

    pub fn data(&self) -> NormalizedDataset {
        self.data.lock().unwrap().clone()
    }

    pub fn totals(&self) -> Vec<f64> {
        self.data.lock().unwrap().totals()
    }

    /// Load once per session: no-op while loading or once data is present.
    pub async fn load(&self) {
        let Some(_busy) = enter(&self.loading) else {
            debug!("dataset load already in flight");
            return;
        };
        if !self.data.lock().unwrap().is_empty() {
            return;
        }
        self.fetch(false).await;
    }

    /// Drop every cached sheet entry and refetch.
    pub async fn refresh(&self) {
        let Some(_busy) = enter(&self.loading) else {
            debug!("refresh skipped, load in flight");
            return;
        };
        self.connector.clear_all();
        self.fetch(true).await;
    }

    async fn fetch(&self, force: bool) {
        self.error.lock().unwrap().clear();
        match self.connector.load_dataset(force).await {
            Ok(data) => *self.data.lock().unwrap() = data,
            Err(e) => {
                warn!(error = %e, force, "dataset load failed");
                *self.error.lock().unwrap() = e.to_string();
            }
        }
    }
}

/// State for one table bound to a range.
pub struct TableState {
    connector: Arc<SheetsConnector>,
    range: Mutex<String>,
    loading: AtomicBool,
    error: Mutex<String>,
    table: Mutex<SheetTable>,
}

impl TableState {
    pub fn new(connector: Arc<SheetsConnector>, range: impl Into<String>) -> Self {
        Self {
            connector,
            range: Mutex::new(range.into()),
            loading: AtomicBool::new(false),
            error: Mutex::new(String::new()),
            table: Mutex::new(SheetTable::empty()),
        }
    }

    pub fn range(&self) -> String {
        self.range.lock().unwrap().clone()
    }

    /// Rebind to `range` and load it when non-blank.
    pub async fn set_range(&self, range: impl Into<String>) {
        let range = range.into();
        let load = !range.trim().is_empty();
        *self.range.lock().unwrap() = range;
        if load {
            self.load(false).await;
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> String {
        self.error.lock().unwrap().clone()
    }

    pub fn table(&self) -> SheetTable {
        self.table.lock().unwrap().clone()
    }

    pub async fn load(&self, force: bool) {
        let Some(_busy) = enter(&self.loading) else {
            debug!("table load already in flight");
            return;
        };
        self.error.lock().unwrap().clear();
        let range = self.range();
        match self.connector.load_table(&range, force).await {
            Ok(table) => *self.table.lock().unwrap() = table,
            Err(e) => {
                warn!(range = %range, error = %e, "table load failed");
                *self.error.lock().unwrap() = e.to_string();
            }
        }
    }

    /// Drop this range's cache entry and cooldown, then refetch.
    pub async fn refresh(&self) {
        self.connector.clear_table(&self.range());
        self.load(true).await;
    }

    pub fn col_index(&self, matchers: &[ColumnMatcher]) -> Option<usize> {
        self.table.lock().unwrap().col_index(matchers)
    }

    pub fn column(&self, matchers: &[ColumnMatcher]) -> Vec<String> {
        self.table.lock().unwrap().column(matchers)
    }

    pub fn numeric_column(&self, matchers: &[ColumnMatcher]) -> Vec<f64> {
        self.table.lock().unwrap().numeric_column(matchers)
    }
}
