//! Turns a loosely structured sheet into per-year financial series.
//!
//! Columns are found by fuzzy header matching, cells are parsed with a
//! locale-tolerant number reader, and rows sharing a year are summed.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::table::{clean_header_cell, RawTable};

/// Semantic role of a sheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Year,
    Remuneration,
    Allowance,
    Dividend,
    Reimbursement,
    Rent,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 6] = [
        ColumnRole::Year,
        ColumnRole::Remuneration,
        ColumnRole::Allowance,
        ColumnRole::Dividend,
        ColumnRole::Reimbursement,
        ColumnRole::Rent,
    ];

    /// Substrings tested, in order, against normalized header cells.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            ColumnRole::Year => &["annee", "year", "date"],
            ColumnRole::Remuneration => &["remuneration", "salaire", "pay"],
            ColumnRole::Allowance => &["indem", "km"],
            ColumnRole::Dividend => &["divid"],
            ColumnRole::Reimbursement => &["remb", "frais"],
            ColumnRole::Rent => &["loyer", "location", "rent"],
        }
    }

    /// Index of the first normalized header cell matching this role.
    pub fn find(self, header_norm: &[String]) -> Option<usize> {
        let candidates = self.candidates();
        header_norm
            .iter()
            .position(|h| candidates.iter().any(|c| h.contains(c)))
    }
}

/// Resolved column index per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub year: Option<usize>,
    pub remuneration: Option<usize>,
    pub allowance: Option<usize>,
    pub dividend: Option<usize>,
    pub reimbursement: Option<usize>,
    pub rent: Option<usize>,
}

impl ColumnMap {
    pub fn resolve(header_norm: &[String]) -> Self {
        Self {
            year: ColumnRole::Year.find(header_norm),
            remuneration: ColumnRole::Remuneration.find(header_norm),
            allowance: ColumnRole::Allowance.find(header_norm),
            dividend: ColumnRole::Dividend.find(header_norm),
            reimbursement: ColumnRole::Reimbursement.find(header_norm),
            rent: ColumnRole::Rent.find(header_norm),
        }
    }

    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        match role {
            ColumnRole::Year => self.year,
            ColumnRole::Remuneration => self.remuneration,
            ColumnRole::Allowance => self.allowance,
            ColumnRole::Dividend => self.dividend,
            ColumnRole::Reimbursement => self.reimbursement,
            ColumnRole::Rent => self.rent,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct YearBucket {
    remuneration: f64,
    allowance: f64,
    dividend: f64,
    reimbursement: f64,
    rent: f64,
}

impl YearBucket {
    /// Add `amount` to the sum for `role`. Year is the bucket key, not a sum.
    fn add(&mut self, role: ColumnRole, amount: f64) {
        match role {
            ColumnRole::Year => {}
            ColumnRole::Remuneration => self.remuneration += amount,
            ColumnRole::Allowance => self.allowance += amount,
            ColumnRole::Dividend => self.dividend += amount,
            ColumnRole::Reimbursement => self.reimbursement += amount,
            ColumnRole::Rent => self.rent += amount,
        }
    }
}

/// Per-year series, every category aligned with `years`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDataset {
    pub years: Vec<String>,
    pub remuneration: Vec<f64>,
    pub allowances: Vec<f64>,
    pub dividends: Vec<f64>,
    pub reimbursements: Vec<f64>,
    pub rent: Vec<f64>,
}

impl NormalizedDataset {
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Remuneration + allowances + dividends + reimbursements per year.
    /// Rent is reported separately and left out.
    pub fn totals(&self) -> Vec<f64> {
        let len = self
            .remuneration
            .len()
            .max(self.allowances.len())
            .max(self.dividends.len())
            .max(self.reimbursements.len());
        let at = |v: &[f64], i: usize| v.get(i).copied().unwrap_or(0.0);
        (0..len)
            .map(|i| {
                at(&self.remuneration, i)
                    + at(&self.allowances, i)
                    + at(&self.dividends, i)
                    + at(&self.reimbursements, i)
            })
            .collect()
    }
}

/// Locale-tolerant number reader: keeps digits, `,`, `.` and `-`, reads `,`
/// as the decimal point. Empty or malformed input is 0.
pub fn parse_number(cell: &str) -> f64 {
    let s = cell.trim();
    if s.is_empty() {
        return 0.0;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Numeric reading of a year key for sorting; NaN when not a number.
fn year_sort_key(year: &str) -> f64 {
    year.parse::<f64>().unwrap_or(f64::NAN)
}

/// Normalize a raw table into year-aligned series.
pub fn normalize(raw: &RawTable) -> NormalizedDataset {
    if raw.is_empty() {
        return NormalizedDataset::default();
    }

    let header_norm: Vec<String> = raw.header.iter().map(|c| clean_header_cell(c)).collect();
    let cols = ColumnMap::resolve(&header_norm);

    let value = |row: &[String], col: Option<usize>| -> f64 {
        col.map_or(0.0, |i| parse_number(RawTable::cell(row, i)))
    };

    let mut by_year: IndexMap<String, YearBucket> = IndexMap::new();
    for row in &raw.rows {
        let year = cols
            .get(ColumnRole::Year)
            .map_or("", |i| RawTable::cell(row, i))
            .trim();
        if year.is_empty() {
            continue;
        }
        let bucket = by_year.entry(year.to_string()).or_default();
        for role in ColumnRole::ALL {
            bucket.add(role, value(row, cols.get(role)));
        }
    }

    // stable sort; non-numeric keys compare equal to everything
    let mut years: Vec<&String> = by_year.keys().collect();
    years.sort_by(|a, b| {
        year_sort_key(a)
            .partial_cmp(&year_sort_key(b))
            .unwrap_or(Ordering::Equal)
    });

    let mut out = NormalizedDataset::default();
    for year in years {
        let b = by_year[year];
        out.years.push(year.clone());
        out.remuneration.push(b.remuneration);
        out.allowances.push(b.allowance);
        out.dividends.push(b.dividend);
        out.reimbursements.push(b.reimbursement);
        out.rent.push(b.rent);
    }
    out
}
