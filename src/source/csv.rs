// src/source/csv.rs

use async_trait::async_trait;
use reqwest::Client;
use tracing::{instrument, warn};

use super::{send_checked, SheetSource};
use crate::config::CSV_URL;
use crate::error::SheetsError;
use crate::table::RawTable;

/// Minimal CSV reader: lines split on `\r?\n`, fields split on `,`.
///
/// There is no quoting or escaping. A comma inside a field splits it in two
/// and quotes are kept as literal characters; published sheets meant for
/// this reader must avoid commas in cell text.
pub fn parse_csv_basic(text: &str) -> Vec<Vec<String>> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}

/// A sheet published to the web as CSV. The range argument is ignored: the
/// published document is the whole table.
pub struct CsvSource {
    client: Client,
    csv_url: String,
}

impl CsvSource {
    pub fn new(client: Client, csv_url: impl Into<String>) -> Self {
        Self {
            client,
            csv_url: csv_url.into(),
        }
    }
}

#[async_trait]
impl SheetSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    #[instrument(level = "debug", skip_all)]
    async fn fetch_raw(&self, _range: &str) -> Result<RawTable, SheetsError> {
        if self.csv_url.is_empty() {
            let e = SheetsError::ConfigIncomplete {
                missing: vec![CSV_URL.to_string()],
            };
            warn!(error = %e, "CSV source not usable");
            return Ok(RawTable::default());
        }
        let text = send_checked(self.client.get(&self.csv_url))
            .await?
            .text()
            .await?;
        Ok(RawTable::from_values(parse_csv_basic(&text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn splits_lines_and_commas() {
        let rows = parse_csv_basic("annee,remuneration\r\n2022,41965.0\n2023,48006.02\n\n");
        assert_eq!(
            rows,
            vec![
                vec!["annee", "remuneration"],
                vec!["2022", "41965.0"],
                vec!["2023", "48006.02"],
            ]
        );
    }

    #[test]
    fn quoted_commas_are_not_supported() {
        let rows = parse_csv_basic("a,b\n\"1,5\",2");
        assert_eq!(rows[1], vec!["\"1", "5\"", "2"]);
    }

    #[test]
    fn blank_text_has_no_rows() {
        assert!(parse_csv_basic("  \n ").is_empty());
        // inner blank lines survive as a single empty cell
        assert_eq!(parse_csv_basic("a\n\nb")[1], vec![""]);
    }

    #[tokio::test]
    async fn fetches_published_csv() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pub.csv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/csv")
                    .set_body_string("annee,dividendes\n2023,1011.6\n"),
            )
            .mount(&server)
            .await;

        let source = CsvSource::new(Client::new(), format!("{}/pub.csv", server.uri()));
        let raw = source.fetch_raw("ignored").await.unwrap();
        assert_eq!(raw.header, vec!["annee", "dividendes"]);
        assert_eq!(raw.rows, vec![vec!["2023", "1011.6"]]);
    }

    #[tokio::test]
    async fn missing_url_is_empty_and_errors_propagate() {
        let empty = CsvSource::new(Client::new(), "");
        assert!(empty.fetch_raw("").await.unwrap().is_empty());

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;
        let source = CsvSource::new(Client::new(), format!("{}/pub.csv", server.uri()));
        match source.fetch_raw("").await {
            Err(SheetsError::Upstream { status: 404, body }) => assert_eq!(body, "gone"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
