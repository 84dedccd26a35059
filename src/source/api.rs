// src/source/api.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{cells_to_strings, send_checked, SheetSource};
use crate::config::{API_KEY, DEFAULT_API_URL, RANGES, SHEETS_ID};
use crate::error::SheetsError;
use crate::table::RawTable;

/// One range of a batch-get response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub major_dimension: Option<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl ValueRange {
    pub fn into_raw(self) -> RawTable {
        RawTable::from_values(cells_to_strings(self.values))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

/// Direct, key-authenticated calls to the spreadsheet values API.
pub struct ApiSource {
    client: Client,
    api_url: String,
    spreadsheet_id: String,
    api_key: String,
}

impl ApiSource {
    pub fn new(
        client: Client,
        spreadsheet_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Point at another API root (tests, proxies).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Settings that are required and absent for a batch over `ranges`.
    pub fn check_config(&self, ranges: &[String]) -> Result<(), SheetsError> {
        let mut missing = Vec::new();
        if self.spreadsheet_id.is_empty() {
            missing.push(SHEETS_ID.to_string());
        }
        if self.api_key.is_empty() {
            missing.push(API_KEY.to_string());
        }
        if ranges.is_empty() {
            missing.push(RANGES.to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SheetsError::ConfigIncomplete { missing })
        }
    }

    fn batch_url(&self, ranges: &[String]) -> Result<Url, SheetsError> {
        let root = self.api_url.trim_end_matches('/');
        let mut url = Url::parse(&format!(
            "{root}/spreadsheets/{}/values:batchGet",
            self.spreadsheet_id
        ))
        .map_err(|e| SheetsError::InvalidResponse(format!("bad API URL {root}: {e}")))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("key", &self.api_key);
            for r in ranges {
                q.append_pair("ranges", r);
            }
            q.append_pair("majorDimension", "ROWS");
        }
        Ok(url)
    }

    /// Fetch every range in one call, in request order. Incomplete
    /// configuration yields an empty list instead of an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn batch_get(&self, ranges: &[String]) -> Result<Vec<ValueRange>, SheetsError> {
        if let Err(e) = self.check_config(ranges) {
            warn!(error = %e, "sheets API not usable");
            return Ok(Vec::new());
        }
        let url = self.batch_url(ranges)?;
        let resp = send_checked(self.client.get(url)).await?;
        let body: BatchGetResponse = resp
            .json()
            .await
            .map_err(|e| SheetsError::InvalidResponse(format!("batchGet: {e}")))?;
        debug!(count = body.value_ranges.len(), "batchGet returned ranges");
        Ok(body.value_ranges)
    }
}

#[async_trait]
impl SheetSource for ApiSource {
    fn name(&self) -> &str {
        "api"
    }

    async fn fetch_raw(&self, range: &str) -> Result<RawTable, SheetsError> {
        let ranges = vec![range.to_string()];
        let first = self.batch_get(&ranges).await?.into_iter().next();
        Ok(first.map(ValueRange::into_raw).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> ApiSource {
        ApiSource::new(Client::new(), "sheet123", "key-1").with_api_url(server.uri())
    }

    #[tokio::test]
    async fn batch_get_sends_all_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/sheet123/values:batchGet"))
            .and(query_param("key", "key-1"))
            .and(query_param("majorDimension", "ROWS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "spreadsheetId": "sheet123",
                "valueRanges": [
                    { "range": "Kpis!A1:B2", "majorDimension": "ROWS", "values": [["annee", "pay"], ["2023", "10"]] },
                    { "range": "Autre!A1:A1", "majorDimension": "ROWS" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ranges = vec!["Kpis!A1:B2".to_string(), "Autre!A1:A1".to_string()];
        let out = source(&server).batch_get(&ranges).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].range.as_deref(), Some("Kpis!A1:B2"));
        assert!(out[1].clone().into_raw().is_empty());

        let requests = server.received_requests().await.unwrap();
        let sent: Vec<String> = requests[0]
            .url
            .query_pairs()
            .filter(|(k, _)| k == "ranges")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(sent, ranges);
    }

    #[tokio::test]
    async fn fetch_raw_takes_first_value_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/sheet123/values:batchGet"))
            .and(query_param("ranges", "'Rémunération annuelle'!A1:Z100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "valueRanges": [{ "values": [["annee"], ["2022"], ["2023"]] }]
            })))
            .mount(&server)
            .await;

        let raw = source(&server)
            .fetch_raw("'Rémunération annuelle'!A1:Z100")
            .await
            .unwrap();
        assert_eq!(raw.header, vec!["annee"]);
        assert_eq!(raw.rows.len(), 2);
    }

    #[tokio::test]
    async fn incomplete_config_returns_empty_without_calling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let no_key = ApiSource::new(Client::new(), "sheet123", "").with_api_url(server.uri());
        assert!(no_key.fetch_raw("A1:B2").await.unwrap().is_empty());

        let full = source(&server);
        assert!(full.batch_get(&[]).await.unwrap().is_empty());

        match no_key.check_config(&[]) {
            Err(SheetsError::ConfigIncomplete { missing }) => {
                assert_eq!(missing, vec![API_KEY.to_string(), RANGES.to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_surfaces_as_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Quota exceeded"))
            .mount(&server)
            .await;

        let err = source(&server).fetch_raw("A1:B2").await.unwrap_err();
        assert!(err.is_rate_limited());
    }
}
