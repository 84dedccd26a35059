//! Serves datasets and tables through the cache, cooldown and source
//! adapters, choosing the adapter from configuration on every call.

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::{future::Future, time::Duration};
use tracing::{debug, info, instrument, warn};

use crate::cache::SheetCache;
use crate::config::{ConfigResolver, SheetsConfig, SourceMode, DEFAULT_RANGES};
use crate::error::SheetsError;
use crate::normalize::{normalize, NormalizedDataset};
use crate::range::{normalize_range, qualify_range};
use crate::source::{ApiSource, BackendSource, CsvSource, SheetSource, ValueRange};
use crate::table::{RawTable, SheetTable};

/// Prefix shared by every key this connector writes.
pub const CACHE_PREFIX: &str = "sheets:";

/// How long a rate-limited key stays off limits.
pub const COOLDOWN_WINDOW: Duration = Duration::from_secs(30);

/// HTTP client with a cookie store, so backend session cookies stick.
pub fn http_client() -> Result<Client, SheetsError> {
    Ok(Client::builder().cookie_store(true).build()?)
}

pub struct SheetsConnector {
    resolver: ConfigResolver,
    cache: SheetCache,
    client: Client,
    session_cookie: Option<String>,
}

impl SheetsConnector {
    pub fn new(resolver: ConfigResolver, cache: SheetCache, client: Client) -> Self {
        Self {
            resolver,
            cache,
            client,
            session_cookie: None,
        }
    }

    /// Session cookie forwarded to the backend proxy.
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Settings as they resolve right now.
    pub fn config(&self) -> SheetsConfig {
        SheetsConfig::resolve(&self.resolver)
    }

    fn backend(&self, cfg: &SheetsConfig) -> BackendSource {
        let source = BackendSource::new(self.client.clone(), cfg.backend_url.clone());
        match &self.session_cookie {
            Some(cookie) => source.with_session_cookie(cookie.clone()),
            None => source,
        }
    }

    fn api(&self, cfg: &SheetsConfig) -> ApiSource {
        ApiSource::new(
            self.client.clone(),
            cfg.spreadsheet_id.clone(),
            cfg.api_key.clone(),
        )
        .with_api_url(cfg.api_url.clone())
    }

    /// Load the financial dataset for the configured source.
    ///
    /// The cache holds the raw grid; normalization runs on every call, hit or
    /// miss. An unknown mode yields an empty dataset without fetching.
    #[instrument(level = "info", skip(self))]
    pub async fn load_dataset(&self, force: bool) -> Result<NormalizedDataset, SheetsError> {
        let cfg = self.config();
        let ttl = cfg.cache_ttl_ms;

        let raw = match &cfg.mode {
            SourceMode::Backend => {
                let first = cfg.ranges.first().map_or(DEFAULT_RANGES, String::as_str);
                let range = qualify_range(&cfg.sheet_name, first);
                let key = format!("{CACHE_PREFIX}backend:{range}");
                let source = self.backend(&cfg);
                self.cached_grid(&key, ttl, force, || source.fetch_raw(&range))
                    .await?
            }
            SourceMode::Api => {
                let ranges: Vec<String> = cfg
                    .ranges
                    .iter()
                    .map(|r| qualify_range(&cfg.sheet_name, r))
                    .collect();
                let key = format!(
                    "{CACHE_PREFIX}{}:{}",
                    cfg.spreadsheet_id,
                    ranges.join("|")
                );
                let source = self.api(&cfg);
                self.cached_grid(&key, ttl, force, || async {
                    // only the first range feeds the dataset
                    let first = source.batch_get(&ranges).await?.into_iter().next();
                    Ok::<_, SheetsError>(first.map(ValueRange::into_raw).unwrap_or_default())
                })
                .await?
            }
            SourceMode::Csv => {
                let key = format!("{CACHE_PREFIX}csv:{}", cfg.csv_url);
                let source = CsvSource::new(self.client.clone(), cfg.csv_url.clone());
                self.cached_grid(&key, ttl, force, || source.fetch_raw(""))
                    .await?
            }
            SourceMode::Unknown(mode) => {
                warn!(mode = %mode, "unknown sheets mode; no data");
                RawTable::default()
            }
        };

        let dataset = normalize(&raw);
        info!(years = dataset.years.len(), "dataset ready");
        Ok(dataset)
    }

    /// Load an arbitrary range as a table. The backend proxy serves it in
    /// backend mode; every other mode goes to the spreadsheet API.
    #[instrument(level = "info", skip(self))]
    pub async fn load_table(&self, range: &str, force: bool) -> Result<SheetTable, SheetsError> {
        let cfg = self.config();
        let range = normalize_range(range);
        let key = table_key(&cfg, &range);

        let source: Box<dyn SheetSource> = if cfg.mode == SourceMode::Backend {
            Box::new(self.backend(&cfg))
        } else {
            Box::new(self.api(&cfg))
        };
        debug!(source = source.name(), key = %key, "table source selected");
        let table = self
            .cached(&key, cfg.cache_ttl_ms, force, || async {
                Ok::<_, SheetsError>(SheetTable::from_raw(source.fetch_raw(&range).await?))
            })
            .await?;
        info!(rows = table.rows.len(), "table ready");
        Ok(table)
    }

    /// Drop every cached entry and cooldown written by this connector.
    pub fn clear_all(&self) -> usize {
        self.cache.clear_by_prefix(CACHE_PREFIX)
    }

    /// Drop the cached table for `range` and its cooldown.
    pub fn clear_table(&self, range: &str) {
        let key = table_key(&self.config(), &normalize_range(range));
        self.cache.clear_key(&key);
    }

    async fn cached_grid<F, Fut>(
        &self,
        key: &str,
        ttl: i64,
        force: bool,
        fetch: F,
    ) -> Result<RawTable, SheetsError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RawTable, SheetsError>>,
    {
        let grid: Vec<Vec<String>> = self
            .cached(key, ttl, force, || async {
                Ok::<_, SheetsError>(fetch().await?.to_values())
            })
            .await?;
        Ok(RawTable::from_values(grid))
    }

    /// Cache read (unless forced), cooldown gate, fetch, cache write.
    ///
    /// While a cooldown is active the fetch is skipped and `T::default()` is
    /// returned. A rate-limited fetch starts the cooldown and still fails.
    async fn cached<T, F, Fut>(
        &self,
        key: &str,
        ttl: i64,
        force: bool,
        fetch: F,
    ) -> Result<T, SheetsError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SheetsError>>,
    {
        if !force {
            if let Some(entry) = self.cache.get::<T>(key, ttl) {
                return Ok(entry.payload);
            }
        }

        if self.cache.cooldown_active(key) {
            info!(key, "rate-limit cooldown active; not contacting upstream");
            return Ok(T::default());
        }

        debug!(key, force, "fetching from source");
        match fetch().await {
            Ok(payload) => {
                self.cache.put(key, ttl, &payload);
                Ok(payload)
            }
            Err(e) => {
                if e.is_rate_limited() {
                    warn!(
                        key,
                        cooldown_ms = COOLDOWN_WINDOW.as_millis() as u64,
                        "rate limited; starting cooldown"
                    );
                    self.cache.set_cooldown(key, COOLDOWN_WINDOW);
                }
                Err(e)
            }
        }
    }
}

fn table_key(cfg: &SheetsConfig, range: &str) -> String {
    let scope = match cfg.mode {
        SourceMode::Backend => "backend",
        _ if cfg.spreadsheet_id.is_empty() => "api",
        _ => cfg.spreadsheet_id.as_str(),
    };
    format!("{CACHE_PREFIX}table:{scope}:{range}")
}
