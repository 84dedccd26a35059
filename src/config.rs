// src/config.rs

use anyhow::{Context, Result};
use std::{collections::HashMap, env, fs, path::Path};

pub const MODE: &str = "SHEETS_MODE";
pub const BACKEND_URL: &str = "BACKEND_URL";
pub const SHEETS_ID: &str = "SHEETS_ID";
pub const API_KEY: &str = "SHEETS_API_KEY";
pub const RANGES: &str = "SHEETS_RANGES";
pub const CSV_URL: &str = "SHEETS_CSV_URL";
pub const CACHE_TTL_MS: &str = "SHEETS_CACHE_TTL_MS";
pub const SHEET_NAME: &str = "SHEETS_SHEET_NAME";
pub const API_URL: &str = "SHEETS_API_URL";

pub const DEFAULT_MODE: &str = "api";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3001";
pub const DEFAULT_RANGES: &str = "A1:Z100";
pub const DEFAULT_CACHE_TTL_MS: &str = "300000";
pub const DEFAULT_SHEET_NAME: &str = "Rémunération annuelle";
pub const DEFAULT_API_URL: &str = "https://sheets.googleapis.com/v4";

/// A tier of named string values.
pub trait ValueSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// The live process environment.
pub struct ProcessEnv;

impl ValueSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl ValueSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Resolves configuration values: live source, then injected values, then
/// the caller's default. A value present in a tier wins even when empty.
pub struct ConfigResolver {
    live: Option<Box<dyn ValueSource>>,
    injected: HashMap<String, String>,
}

impl ConfigResolver {
    pub fn new(live: Option<Box<dyn ValueSource>>, injected: HashMap<String, String>) -> Self {
        Self { live, injected }
    }

    /// Process environment as the live tier, no injected values.
    pub fn from_env() -> Self {
        Self::new(Some(Box::new(ProcessEnv)), HashMap::new())
    }

    /// Replace the injected tier.
    pub fn with_injected(mut self, injected: HashMap<String, String>) -> Self {
        self.injected = injected;
        self
    }

    /// Load the injected tier from a flat JSON object. Non-string JSON values
    /// are kept in their JSON text form.
    pub fn load_injected(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading injected config {}", path.display()))?;
        let obj: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)
            .with_context(|| format!("parsing injected config {}", path.display()))?;
        Ok(obj
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect())
    }

    pub fn resolve(&self, name: &str, default: &str) -> String {
        self.live
            .as_ref()
            .and_then(|live| live.get(name))
            .or_else(|| self.injected.get(name).cloned())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Which source adapter a load call dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    Backend,
    Api,
    Csv,
    Unknown(String),
}

impl SourceMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "backend" => SourceMode::Backend,
            "api" => SourceMode::Api,
            "csv" => SourceMode::Csv,
            other => SourceMode::Unknown(other.to_string()),
        }
    }
}

/// Connector settings, resolved once per load call.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub mode: SourceMode,
    pub backend_url: String,
    pub spreadsheet_id: String,
    pub api_key: String,
    pub ranges: Vec<String>,
    pub csv_url: String,
    pub cache_ttl_ms: i64,
    pub sheet_name: String,
    pub api_url: String,
}

impl SheetsConfig {
    pub fn resolve(resolver: &ConfigResolver) -> Self {
        Self {
            mode: SourceMode::parse(&resolver.resolve(MODE, DEFAULT_MODE)),
            backend_url: resolver.resolve(BACKEND_URL, DEFAULT_BACKEND_URL),
            spreadsheet_id: resolver.resolve(SHEETS_ID, ""),
            api_key: resolver.resolve(API_KEY, ""),
            ranges: split_ranges(&resolver.resolve(RANGES, DEFAULT_RANGES)),
            csv_url: resolver.resolve(CSV_URL, ""),
            cache_ttl_ms: parse_ttl(&resolver.resolve(CACHE_TTL_MS, DEFAULT_CACHE_TTL_MS)),
            sheet_name: resolver.resolve(SHEET_NAME, DEFAULT_SHEET_NAME),
            api_url: resolver.resolve(API_URL, DEFAULT_API_URL),
        }
    }
}

/// Comma-separated range list; blank entries dropped.
pub fn split_ranges(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Milliseconds as a decimal number; anything unparsable means 0 (caching off).
pub fn parse_ttl(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => v as i64,
        _ => 0,
    }
}
