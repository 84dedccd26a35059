// src/source/mod.rs

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SheetsError;
use crate::table::RawTable;

pub mod api;
pub mod backend;
pub mod csv;

pub use api::{ApiSource, ValueRange};
pub use backend::BackendSource;
pub use csv::{parse_csv_basic, CsvSource};

/// A place raw sheet values can be fetched from.
///
/// Sources know nothing about caching or cooldowns; the connector sits above
/// them.
#[async_trait]
pub trait SheetSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch `range` as a header row plus data rows. Sources that cannot be
    /// used for lack of configuration return an empty table.
    async fn fetch_raw(&self, range: &str) -> Result<RawTable, SheetsError>;
}

/// Send `req`, turning any non-success status into [`SheetsError::Upstream`]
/// carrying the response body.
pub(crate) async fn send_checked(req: RequestBuilder) -> Result<Response, SheetsError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        debug!(url = %resp.url(), %status, "upstream ok");
        return Ok(resp);
    }
    let url = resp.url().clone();
    let body = resp.text().await.unwrap_or_default();
    warn!(%url, %status, "upstream returned error status");
    Err(SheetsError::Upstream {
        status: status.as_u16(),
        body,
    })
}

/// JSON cells as text: strings verbatim, null as empty, anything else in its
/// JSON form.
pub(crate) fn cells_to_strings(values: Vec<Vec<Value>>) -> Vec<Vec<String>> {
    values
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}
