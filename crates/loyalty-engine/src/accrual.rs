//! Client for the external accrual service.
//!
//! The accrual system evaluates every uploaded order asynchronously. The
//! worker polls it through the [`AccrualSource`] trait; [`AccrualClient`] is
//! the production implementation against `GET {base}/api/orders/{number}`:
//!
//! ```json
//! { "order": "12345678903", "status": "PROCESSED", "accrual": 500.75 }
//! ```
//!
//! `status` is one of REGISTERED, PROCESSING, INVALID, PROCESSED. A 429
//! response carries a `Retry-After` header (seconds) and maps to
//! [`AccrualError::RateLimited`]; every other failure is transient and the
//! order is retried on the next cycle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when polling the accrual service.
#[derive(Debug, Error)]
pub enum AccrualError {
    /// Upstream asked us to slow down; all polling pauses for the duration.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream replied with an unexpected status code.
    #[error("accrual API error: status {status}, body: {body}")]
    Upstream { status: u16, body: String },

    /// Body did not match the documented contract.
    #[error("malformed accrual response: {0}")]
    Malformed(String),
}

/// Verdict reported by the accrual system for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualVerdict {
    /// Order registered, evaluation not started.
    Registered,
    /// Evaluation in progress.
    Processing,
    /// Order rejected; no points will ever accrue.
    Invalid,
    /// Evaluation finished with the given number of points.
    Processed(Decimal),
}

/// Polling seam between the worker and the accrual system.
#[async_trait]
pub trait AccrualSource: Send + Sync {
    /// Fetch the current verdict for one order number.
    async fn get_status(&self, number: &str) -> Result<AccrualVerdict, AccrualError>;
}

/// Wire format of the accrual response body.
#[derive(Debug, Deserialize)]
struct AccrualResponse {
    order: String,
    status: String,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    accrual: Option<Decimal>,
}

impl AccrualResponse {
    fn into_verdict(self) -> Result<AccrualVerdict, AccrualError> {
        match self.status.as_str() {
            "REGISTERED" => Ok(AccrualVerdict::Registered),
            "PROCESSING" => Ok(AccrualVerdict::Processing),
            "INVALID" => Ok(AccrualVerdict::Invalid),
            "PROCESSED" => Ok(AccrualVerdict::Processed(
                self.accrual.unwrap_or(Decimal::ZERO),
            )),
            other => Err(AccrualError::Malformed(format!(
                "unknown accrual status: {other}"
            ))),
        }
    }
}

/// Accepts the upstream's JSON number as well as a quoted decimal string,
/// without ever round-tripping the amount through f64.
fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Value> = serde::Deserialize::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(serde_json::Value::String(s)) if !s.is_empty() => s
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unexpected accrual value: {other}"
        ))),
    }
}

/// Parse a Retry-After header value given in whole seconds.
fn parse_retry_after(value: Option<&str>, fallback: Duration) -> Duration {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

/// HTTP client for the accrual API.
pub struct AccrualClient {
    http: Client,
    base_url: String,
    rate_limit_fallback: Duration,
}

impl AccrualClient {
    /// Create a new client against `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration, rate_limit_fallback: Duration) -> Self {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit_fallback,
        }
    }
}

#[async_trait]
impl AccrualSource for AccrualClient {
    async fn get_status(&self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);
        debug!(url = %url, "polling accrual service");

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
                self.rate_limit_fallback,
            );
            warn!(
                order = %number,
                retry_after_secs = retry_after.as_secs(),
                "accrual rate limit hit"
            );
            return Err(AccrualError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AccrualError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: AccrualResponse = response.json().await.map_err(|e| {
            AccrualError::Malformed(format!("failed to decode accrual response: {e}"))
        })?;
        debug!(order = %body.order, status = %body.status, "accrual verdict received");
        body.into_verdict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_processed_response() {
        let body = r#"{"order":"12345678903","status":"PROCESSED","accrual":500.75}"#;
        let response: AccrualResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.order, "12345678903");
        assert_eq!(
            response.into_verdict().unwrap(),
            AccrualVerdict::Processed(dec!(500.75))
        );
    }

    #[test]
    fn test_decode_processed_without_accrual_defaults_to_zero() {
        let body = r#"{"order":"1","status":"PROCESSED"}"#;
        let response: AccrualResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.into_verdict().unwrap(),
            AccrualVerdict::Processed(Decimal::ZERO)
        );
    }

    #[test]
    fn test_decode_accrual_as_string() {
        let body = r#"{"order":"1","status":"PROCESSED","accrual":"729.98"}"#;
        let response: AccrualResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.into_verdict().unwrap(),
            AccrualVerdict::Processed(dec!(729.98))
        );
    }

    #[test]
    fn test_decode_non_terminal_statuses() {
        let registered: AccrualResponse =
            serde_json::from_str(r#"{"order":"1","status":"REGISTERED"}"#).unwrap();
        assert_eq!(registered.into_verdict().unwrap(), AccrualVerdict::Registered);

        let processing: AccrualResponse =
            serde_json::from_str(r#"{"order":"1","status":"PROCESSING"}"#).unwrap();
        assert_eq!(processing.into_verdict().unwrap(), AccrualVerdict::Processing);

        let invalid: AccrualResponse =
            serde_json::from_str(r#"{"order":"1","status":"INVALID"}"#).unwrap();
        assert_eq!(invalid.into_verdict().unwrap(), AccrualVerdict::Invalid);
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        let response: AccrualResponse =
            serde_json::from_str(r#"{"order":"1","status":"DONE"}"#).unwrap();
        assert!(matches!(
            response.into_verdict(),
            Err(AccrualError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        let fallback = Duration::from_secs(60);
        assert_eq!(parse_retry_after(Some("5"), fallback), Duration::from_secs(5));
        assert_eq!(parse_retry_after(Some(" 120 "), fallback), Duration::from_secs(120));
        assert_eq!(parse_retry_after(Some("soon"), fallback), fallback);
        assert_eq!(parse_retry_after(None, fallback), fallback);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = AccrualClient::new(
            "http://localhost:8080/",
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
