use thiserror::Error;

/// HTTP status the upstream uses to signal rate limiting.
pub const RATE_LIMIT_STATUS: u16 = 429;

/// Errors surfaced by the sheet sources and the connector.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// Required source settings are absent. Sources log this and return an
    /// empty table instead of failing the load.
    #[error("configuration incomplete: missing {}", missing.join(", "))]
    ConfigIncomplete { missing: Vec<String> },

    /// Non-success status from the proxy or the spreadsheet provider.
    #[error("HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SheetsError {
    /// True when the upstream answered with a rate-limit status.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SheetsError::Upstream { status, .. } if *status == RATE_LIMIT_STATUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_detected_from_status() {
        let err = SheetsError::Upstream {
            status: 429,
            body: "quota".into(),
        };
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "HTTP 429: quota");

        let err = SheetsError::Upstream {
            status: 500,
            body: String::new(),
        };
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn config_incomplete_lists_missing_settings() {
        let err = SheetsError::ConfigIncomplete {
            missing: vec!["SHEETS_ID".into(), "SHEETS_API_KEY".into()],
        };
        assert_eq!(
            err.to_string(),
            "configuration incomplete: missing SHEETS_ID, SHEETS_API_KEY"
        );
    }
}
