//! FRED policy-rate source
//!
//! Reads the most recent observation of each central bank's policy-rate
//! series from the St. Louis Fed API.

use super::RateProvider;
use crate::currency;
use crate::error::{FxLensError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub const FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

const PROVIDER: &str = "fred";
// A few rows so a trailing "." (not yet published) doesn't hide the last value
const OBSERVATION_LIMIT: &str = "5";
const OBSERVATION_START: &str = "2020-01-01";

/// FRED data source
pub struct FredRateProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_message: String,
}

impl FredRateProvider {
    /// Create a new FRED source
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_options(api_key, FRED_BASE_URL.to_string(), Duration::from_secs(10))
    }

    /// Create a source against a custom endpoint and request timeout
    pub fn with_options(api_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxLensError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url,
            client,
        })
    }

    /// Fetch the latest numeric value of a series
    pub async fn fetch_series(&self, currency_code: &str, series_id: &str) -> Result<f64> {
        log::debug!("FRED request: {} ({})", series_id, currency_code);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", OBSERVATION_LIMIT),
                ("observation_start", OBSERVATION_START),
            ])
            .send()
            .await
            .map_err(|e| unavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body, currency_code, series_id));
        }

        parse_latest(&body, series_id)
    }
}

impl RateProvider for FredRateProvider {
    async fn get_policy_rate(&self, currency_code: &str) -> Result<f64> {
        let series_id = currency::find(currency_code)
            .and_then(|spec| spec.series_id())
            .ok_or_else(|| FxLensError::SeriesNotFound {
                currency: currency_code.to_string(),
                series_id: "<none>".to_string(),
            })?;

        self.fetch_series(currency_code, series_id).await
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

/// Map a non-success HTTP response to the provider error taxonomy
fn classify_status(status: StatusCode, body: &str, currency_code: &str, series_id: &str) -> FxLensError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error_message)
        .unwrap_or_default();

    let series_missing = status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && message.to_ascii_lowercase().contains("series does not exist"));

    if status == StatusCode::TOO_MANY_REQUESTS {
        FxLensError::RateLimited {
            provider: PROVIDER.to_string(),
        }
    } else if series_missing {
        FxLensError::SeriesNotFound {
            currency: currency_code.to_string(),
            series_id: series_id.to_string(),
        }
    } else {
        unavailable(format!("FRED returned {}: {}", status, message))
    }
}

/// Latest numeric observation; FRED marks missing values with "."
fn parse_latest(body: &str, series_id: &str) -> Result<f64> {
    let data: ObservationsResponse = serde_json::from_str(body)
        .map_err(|e| FxLensError::ValidationError(format!("FRED JSON parse error: {}", e)))?;

    let mut observations = data.observations;
    // Newest first regardless of how the server honoured sort_order
    observations.sort_by(|a, b| b.date.cmp(&a.date));

    for obs in &observations {
        if obs.value.trim() == "." {
            continue;
        }
        let value: f64 = obs.value.trim().parse().map_err(|_| {
            FxLensError::ValidationError(format!(
                "Non-numeric FRED value {:?} for {} on {}",
                obs.value, series_id, obs.date
            ))
        })?;
        if !value.is_finite() {
            return Err(FxLensError::ValidationError(format!(
                "Non-finite FRED value for {} on {}",
                series_id, obs.date
            )));
        }
        return Ok(value);
    }

    Err(FxLensError::ValidationError(format!(
        "No numeric observation for {}",
        series_id
    )))
}
