// src/source/backend.rs

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use super::{cells_to_strings, send_checked, SheetSource};
use crate::error::SheetsError;
use crate::range::normalize_range;
use crate::table::RawTable;

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Fetches through the dashboard backend, which holds the upstream
/// credentials. Requests ride on the caller's session: the client should keep
/// a cookie store, and a session cookie can be supplied explicitly.
pub struct BackendSource {
    client: Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl BackendSource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session_cookie: None,
        }
    }

    /// Send `cookie` (e.g. `session=...`) with every request.
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    fn values_url(&self, range: &str) -> Result<Url, SheetsError> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/sheets/values")).map_err(|e| {
            SheetsError::InvalidResponse(format!("bad backend URL {}: {e}", self.base_url))
        })?;
        url.query_pairs_mut().append_pair("range", range);
        Ok(url)
    }
}

#[async_trait]
impl SheetSource for BackendSource {
    fn name(&self) -> &str {
        "backend"
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_raw(&self, range: &str) -> Result<RawTable, SheetsError> {
        let url = self.values_url(&normalize_range(range))?;
        let mut req = self.client.get(url);
        if let Some(cookie) = &self.session_cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let resp = send_checked(req).await?;
        let body: ValuesResponse = resp
            .json()
            .await
            .map_err(|e| SheetsError::InvalidResponse(format!("backend values: {e}")))?;
        Ok(RawTable::from_values(cells_to_strings(body.values)))
    }
}
