//! In-memory providers
//!
//! Scripted rate and spot sources with per-currency failure injection,
//! artificial latency and a call log. Used by tests and by offline runs.

use super::{RateProvider, SpotHistoryProvider};
use crate::error::{FxLensError, Result};
use crate::record::SpotObservation;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hashbrown::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Failure an in-memory provider reports instead of data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Unavailable,
    RateLimited,
    SeriesNotFound,
    Malformed,
}

impl InjectedFailure {
    fn to_error(self, provider: &str, currency_code: &str) -> FxLensError {
        match self {
            InjectedFailure::Unavailable => FxLensError::ProviderUnavailable {
                provider: provider.to_string(),
                message: format!("injected outage for {}", currency_code),
            },
            InjectedFailure::RateLimited => FxLensError::RateLimited {
                provider: provider.to_string(),
            },
            InjectedFailure::SeriesNotFound => FxLensError::SeriesNotFound {
                currency: currency_code.to_string(),
                series_id: "<scripted>".to_string(),
            },
            InjectedFailure::Malformed => {
                FxLensError::ValidationError(format!("injected malformed body for {}", currency_code))
            }
        }
    }
}

#[derive(Debug, Default)]
struct Script<T> {
    values: HashMap<String, T>,
    failures: HashMap<String, InjectedFailure>,
    delays: HashMap<String, Duration>,
    fail_all: Option<InjectedFailure>,
    calls: Vec<String>,
}

impl<T: Clone> Script<T> {
    fn set_value(&mut self, code: &str, value: T) {
        self.values.insert(code.to_string(), value);
    }

    fn set_failure(&mut self, code: &str, failure: InjectedFailure) {
        self.failures.insert(code.to_string(), failure);
    }

    fn set_delay(&mut self, code: &str, delay: Duration) {
        self.delays.insert(code.to_string(), delay);
    }

    fn calls_for(&self, code: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == code).count()
    }

    /// Record the call and resolve its outcome
    fn resolve(&mut self, provider: &str, code: &str) -> (Option<Duration>, Result<T>) {
        self.calls.push(code.to_string());
        let delay = self.delays.get(code).copied();
        let failure = self.fail_all.or_else(|| self.failures.get(code).copied());

        let outcome = match failure {
            Some(failure) => Err(failure.to_error(provider, code)),
            None => self
                .values
                .get(code)
                .cloned()
                .ok_or_else(|| FxLensError::SeriesNotFound {
                    currency: code.to_string(),
                    series_id: "<unscripted>".to_string(),
                }),
        };
        (delay, outcome)
    }
}

/// Policy rates held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateProvider {
    script: Arc<RwLock<Script<f64>>>,
}

impl InMemoryRateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from `(code, rate)` pairs
    pub fn with_rates(rates: &[(&str, f64)]) -> Self {
        let provider = Self::new();
        for (code, rate) in rates {
            provider.set_rate(code, *rate);
        }
        provider
    }

    pub fn set_rate(&self, code: &str, rate: f64) {
        self.script.write().unwrap().set_value(code, rate);
    }

    pub fn fail(&self, code: &str, failure: InjectedFailure) {
        self.script.write().unwrap().set_failure(code, failure);
    }

    /// Every call fails, e.g. a total network outage
    pub fn fail_all(&self, failure: InjectedFailure) {
        self.script.write().unwrap().fail_all = Some(failure);
    }

    pub fn delay(&self, code: &str, delay: Duration) {
        self.script.write().unwrap().set_delay(code, delay);
    }

    pub fn calls_for(&self, code: &str) -> usize {
        self.script.read().unwrap().calls_for(code)
    }

    pub fn total_calls(&self) -> usize {
        self.script.read().unwrap().calls.len()
    }
}

impl RateProvider for InMemoryRateProvider {
    async fn get_policy_rate(&self, currency_code: &str) -> Result<f64> {
        let (delay, outcome) = self.script.write().unwrap().resolve("in-memory-rates", currency_code);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    fn name(&self) -> &str {
        "in-memory-rates"
    }
}

/// Spot histories held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySpotHistoryProvider {
    script: Arc<RwLock<Script<Vec<SpotObservation>>>>,
}

impl InMemorySpotHistoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, code: &str, history: Vec<SpotObservation>) {
        self.script.write().unwrap().set_value(code, history);
    }

    /// Store `prices` as consecutive daily closes ending at `end`
    pub fn set_daily_prices(&self, code: &str, end: DateTime<Utc>, prices: &[f64]) {
        let n = prices.len() as i64;
        let history = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| SpotObservation::new(end - ChronoDuration::days(n - 1 - i as i64), price))
            .collect();
        self.set_history(code, history);
    }

    pub fn fail(&self, code: &str, failure: InjectedFailure) {
        self.script.write().unwrap().set_failure(code, failure);
    }

    pub fn fail_all(&self, failure: InjectedFailure) {
        self.script.write().unwrap().fail_all = Some(failure);
    }

    pub fn delay(&self, code: &str, delay: Duration) {
        self.script.write().unwrap().set_delay(code, delay);
    }

    pub fn calls_for(&self, code: &str) -> usize {
        self.script.read().unwrap().calls_for(code)
    }

    pub fn total_calls(&self) -> usize {
        self.script.read().unwrap().calls.len()
    }
}

impl SpotHistoryProvider for InMemorySpotHistoryProvider {
    async fn get_spot_history(
        &self,
        currency_code: &str,
        window: ChronoDuration,
    ) -> Result<Vec<SpotObservation>> {
        let (delay, outcome) = self
            .script
            .write()
            .unwrap()
            .resolve("in-memory-spots", currency_code);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Trim to the requested window, anchored on the newest observation
        let history = outcome?;
        let cutoff = match history.last() {
            Some(last) => last.timestamp - window,
            None => return Ok(history),
        };
        Ok(history.into_iter().filter(|o| o.timestamp >= cutoff).collect())
    }

    fn name(&self) -> &str {
        "in-memory-spots"
    }
}
