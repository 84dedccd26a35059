// src/table.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// A header row plus data rows, as fetched. Rows may be shorter than the
/// header; missing cells read as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Split a value grid: first row is the header.
    pub fn from_values(values: Vec<Vec<String>>) -> Self {
        let mut it = values.into_iter();
        let header = it.next().unwrap_or_default();
        Self {
            header,
            rows: it.collect(),
        }
    }

    /// Back to a value grid. A table with neither header nor rows yields an
    /// empty grid.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        if self.is_empty() {
            return Vec::new();
        }
        std::iter::once(self.header.clone())
            .chain(self.rows.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    /// Cell `col` of `row`, empty when the row is short.
    pub fn cell(row: &[String], col: usize) -> &str {
        row.get(col).map_or("", String::as_str)
    }
}

/// Trim, lowercase and strip combining accents (NFD, U+0300..=U+036F).
pub fn clean_header_cell(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// The payload the table loader returns and caches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetTable {
    pub header: Vec<String>,
    pub header_norm: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// How a caller names a column: a substring of the normalized header, or a
/// pattern tested against it.
#[derive(Debug, Clone)]
pub enum ColumnMatcher {
    Contains(String),
    Pattern(Regex),
}

impl ColumnMatcher {
    pub fn contains(s: impl Into<String>) -> Self {
        ColumnMatcher::Contains(s.into())
    }

    fn matches(&self, header_norm: &str) -> bool {
        match self {
            ColumnMatcher::Contains(s) => header_norm.contains(&s.to_lowercase()),
            ColumnMatcher::Pattern(re) => re.is_match(header_norm),
        }
    }
}

impl SheetTable {
    /// The empty table served while a cooldown is active.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_raw(raw: RawTable) -> Self {
        let header_norm = raw.header.iter().map(|c| clean_header_cell(c)).collect();
        Self {
            header: raw.header,
            header_norm,
            rows: raw.rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    /// First column whose normalized header satisfies any matcher.
    pub fn col_index(&self, matchers: &[ColumnMatcher]) -> Option<usize> {
        self.header_norm
            .iter()
            .position(|h| matchers.iter().any(|m| m.matches(h)))
    }

    /// Cells of the matched column, one per row; empty when nothing matches.
    pub fn column(&self, matchers: &[ColumnMatcher]) -> Vec<String> {
        match self.col_index(matchers) {
            Some(i) => self
                .rows
                .iter()
                .map(|r| RawTable::cell(r, i).to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Like [`SheetTable::column`], with each cell parsed as a number.
    pub fn numeric_column(&self, matchers: &[ColumnMatcher]) -> Vec<f64> {
        match self.col_index(matchers) {
            Some(i) => self
                .rows
                .iter()
                .map(|r| crate::normalize::parse_number(RawTable::cell(r, i)))
                .collect(),
            None => Vec::new(),
        }
    }
}
