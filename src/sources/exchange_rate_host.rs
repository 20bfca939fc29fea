//! exchangerate.host spot history source
//!
//! Free daily timeseries against USD, no API key required.

use super::SpotHistoryProvider;
use crate::error::{FxLensError, Result};
use crate::record::SpotObservation;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const EXCHANGE_RATE_HOST_BASE_URL: &str = "https://api.exchangerate.host/timeseries";

const PROVIDER: &str = "exchangerate.host";
// Provider error code for an exhausted usage quota
const USAGE_LIMIT_CODE: i64 = 104;

/// exchangerate.host data source
pub struct ExchangeRateHostSource {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<ProviderError>,
    /// date -> {code -> price}
    #[serde(default)]
    rates: BTreeMap<String, HashMap<String, Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default, alias = "type")]
    info: Option<String>,
}

impl ExchangeRateHostSource {
    /// Create a new exchangerate.host source
    pub fn new() -> Result<Self> {
        Self::with_options(EXCHANGE_RATE_HOST_BASE_URL.to_string(), Duration::from_secs(15))
    }

    /// Create a source against a custom endpoint and request timeout
    pub fn with_options(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxLensError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    /// Fetch daily closes for `currency_code` between two dates (inclusive)
    pub async fn fetch_timeseries(
        &self,
        currency_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SpotObservation>> {
        log::debug!("{} request: {} {}..{}", PROVIDER, currency_code, start, end);

        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("base", "USD"),
                ("symbols", currency_code),
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
            ])
            .send()
            .await
            .map_err(|e| unavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FxLensError::RateLimited {
                provider: PROVIDER.to_string(),
            });
        }
        if !status.is_success() {
            return Err(unavailable(format!("{} returned error: {}", PROVIDER, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("Failed to read response: {}", e)))?;

        parse_timeseries(&body, currency_code)
    }
}

impl SpotHistoryProvider for ExchangeRateHostSource {
    async fn get_spot_history(
        &self,
        currency_code: &str,
        window: chrono::Duration,
    ) -> Result<Vec<SpotObservation>> {
        let end = Utc::now().date_naive();
        let start = end - window;
        self.fetch_timeseries(currency_code, start, end).await
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

fn unavailable(message: String) -> FxLensError {
    FxLensError::ProviderUnavailable {
        provider: PROVIDER.to_string(),
        message,
    }
}

/// Parse a timeseries body into ascending observations
///
/// Dates without a price for the code are skipped.
fn parse_timeseries(body: &str, currency_code: &str) -> Result<Vec<SpotObservation>> {
    let data: TimeseriesResponse = serde_json::from_str(body)
        .map_err(|e| FxLensError::ValidationError(format!("Timeseries JSON parse error: {}", e)))?;

    if data.success == Some(false) {
        let (code, info) = data
            .error
            .map(|e| (e.code, e.info.unwrap_or_default()))
            .unwrap_or((None, String::new()));
        if code == Some(USAGE_LIMIT_CODE) {
            return Err(FxLensError::RateLimited {
                provider: PROVIDER.to_string(),
            });
        }
        return Err(unavailable(format!("Request rejected ({:?}): {}", code, info)));
    }

    let mut observations = Vec::with_capacity(data.rates.len());
    // BTreeMap keys are ISO dates, so iteration is already ascending
    for (date, prices) in &data.rates {
        let price = match prices.get(currency_code).copied().flatten() {
            Some(price) => price,
            None => continue,
        };
        if !price.is_finite() || price <= 0.0 {
            return Err(FxLensError::ValidationError(format!(
                "Invalid {} price {} on {}",
                currency_code, price, date
            )));
        }

        let timestamp = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| FxLensError::ValidationError(format!("Date parse error: {}", e)))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| FxLensError::ValidationError("Invalid time".to_string()))?;
        let timestamp = DateTime::from_naive_utc_and_offset(timestamp, Utc);

        observations.push(SpotObservation::new(timestamp, price));
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_creation() {
        let source = ExchangeRateHostSource::new();
        assert!(source.is_ok());
        assert_eq!(source.unwrap().name(), PROVIDER);
    }

    #[test]
    fn test_parse_timeseries() {
        let body = r#"{"success": true, "rates": {
            "2024-05-03": {"JPY": 153.0},
            "2024-05-01": {"JPY": 157.8},
            "2024-05-02": {"JPY": 155.6}
        }}"#;
        let obs = parse_timeseries(body, "JPY").unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].price, 157.8);
        assert_eq!(obs[2].price, 153.0);
        assert!(obs.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_parse_skips_missing_and_null() {
        let body = r#"{"rates": {
            "2024-05-01": {"JPY": 157.8},
            "2024-05-02": {},
            "2024-05-03": {"JPY": null},
            "2024-05-06": {"JPY": 153.9}
        }}"#;
        let obs = parse_timeseries(body, "JPY").unwrap();
        assert_eq!(obs.len(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_price() {
        let body = r#"{"rates": {"2024-05-01": {"JPY": -1.0}}}"#;
        assert!(matches!(
            parse_timeseries(body, "JPY"),
            Err(FxLensError::ValidationError(_))
        ));
    }

    #[test]
    fn test_parse_provider_errors() {
        let limited = r#"{"success": false, "error": {"code": 104, "info": "usage limit"}}"#;
        assert!(matches!(
            parse_timeseries(limited, "JPY"),
            Err(FxLensError::RateLimited { .. })
        ));

        let rejected = r#"{"success": false, "error": {"code": 101, "type": "missing_access_key"}}"#;
        assert!(matches!(
            parse_timeseries(rejected, "JPY"),
            Err(FxLensError::ProviderUnavailable { .. })
        ));
    }

    #[test]
    fn test_empty_rates_is_ok() {
        let obs = parse_timeseries(r#"{"success": true, "rates": {}}"#, "JPY").unwrap();
        assert!(obs.is_empty());
    }
}
