//! Fetch cycle orchestration
//!
//! One call to [`FetchOrchestrator::run_cycle`] fetches, derives and persists
//! a record for every configured currency:
//!
//! ```text
//! Idle -> FetchingRates -> FetchingSpotHistories -> Computing -> Persisting -> Done
//!                                                       \-> Failed (no usable record)
//! ```
//!
//! `FetchingRates` resolves the USD baseline. `FetchingSpotHistories` runs the
//! bounded worker pool, where each floating currency fetches its own policy
//! rate alongside its spot history. Pegged currencies never touch a provider.
//! A failure for one currency only nulls that currency's fields.

use crate::analytics::volatility::{self, VolatilityCalculator};
use crate::analytics::{CarryCalculator, HistoricalRatioTable};
use crate::config::FxLensConfig;
use crate::currency::{self, CurrencySpec, Regime, BASE_CODE, CURRENCIES};
use crate::error::{FxLensError, Result};
use crate::record::{CurrencyRecord, SpotObservation};
use crate::sources::{
    ExchangeRateHostSource, FredRateProvider, PeggedRateSource, RateProvider, SpotHistoryProvider,
};
use crate::store::{RecordStore, SqliteStore};
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

// Extra wait for workers to notice the deadline before they are aborted
const ABORT_GRACE: Duration = Duration::from_millis(250);

/// Cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Idle,
    FetchingRates,
    FetchingSpotHistories,
    Computing,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::FetchingRates => "fetching_rates",
            CyclePhase::FetchingSpotHistories => "fetching_spot_histories",
            CyclePhase::Computing => "computing",
            CyclePhase::Persisting => "persisting",
            CyclePhase::Done => "done",
            CyclePhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A currency that produced no storable record this cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyFailure {
    pub currency_code: String,
    pub reasons: Vec<String>,
}

/// Outcome of one cycle, handed to the scheduling side
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub cycle_id: Uuid,
    /// Completion time, stamped on every record of the cycle
    pub fetched_at: DateTime<Utc>,
    pub phase: CyclePhase,
    pub succeeded_currencies: Vec<String>,
    pub failed_currencies: Vec<CurrencyFailure>,
    /// Floating currencies whose history was flat
    pub stale_currencies: Vec<String>,
    pub fatal: bool,
    /// Records written to the store
    pub records: Vec<CurrencyRecord>,
}

impl CycleResult {
    /// `FatalCycleFailure` when nothing usable was produced
    pub fn ensure_success(&self) -> Result<()> {
        if self.fatal {
            Err(FxLensError::FatalCycleFailure {
                failed: self.failed_currencies.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.fatal && !self.failed_currencies.is_empty()
    }

    pub fn failed_codes(&self) -> Vec<&str> {
        self.failed_currencies
            .iter()
            .map(|f| f.currency_code.as_str())
            .collect()
    }
}

/// Tuning for a cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    pub history_window: chrono::Duration,
    pub max_concurrency: usize,
    pub cycle_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &FxLensConfig) -> Self {
        Self {
            history_window: config.history_window(),
            max_concurrency: config.max_concurrency.max(1),
            cycle_timeout: config.cycle_timeout(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&FxLensConfig::default())
    }
}

/// Raw provider results for one floating currency
struct CurrencyFetch {
    code: &'static str,
    rate: Result<f64>,
    history: Result<Vec<SpotObservation>>,
}

/// A record plus what went wrong while building it
struct Assembled {
    record: CurrencyRecord,
    problems: Vec<String>,
    usable: bool,
}

/// Drives providers and calculators for the whole currency set
pub struct FetchOrchestrator<R, S, St> {
    rates: Arc<R>,
    spots: Arc<S>,
    store: Arc<St>,
    pegged: PeggedRateSource,
    volatility: VolatilityCalculator,
    ratios: HistoricalRatioTable,
    settings: OrchestratorSettings,
    currencies: Vec<&'static CurrencySpec>,
}

impl<R, S, St> FetchOrchestrator<R, S, St>
where
    R: RateProvider + 'static,
    S: SpotHistoryProvider + 'static,
    St: RecordStore + 'static,
{
    /// Orchestrator over the full currency table with default settings
    pub fn new(rates: Arc<R>, spots: Arc<S>, store: Arc<St>) -> Self {
        Self {
            rates,
            spots,
            store,
            pegged: PeggedRateSource::new(),
            volatility: VolatilityCalculator::daily(),
            ratios: HistoricalRatioTable::curated(),
            settings: OrchestratorSettings::default(),
            currencies: CURRENCIES.iter().collect(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_volatility(mut self, volatility: VolatilityCalculator) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_ratio_table(mut self, ratios: HistoricalRatioTable) -> Self {
        self.ratios = ratios;
        self
    }

    /// Restrict the cycle to a subset of the table
    ///
    /// Codes are matched case-insensitively; naming a currency twice is a
    /// `ValidationError`.
    pub fn with_currencies(mut self, codes: &[&str]) -> Result<Self> {
        let mut currencies: Vec<&'static CurrencySpec> = Vec::with_capacity(codes.len());
        for code in codes {
            let spec = currency::lookup(code)?;
            if currencies.iter().any(|seen| seen.code == spec.code) {
                return Err(FxLensError::ValidationError(format!(
                    "Currency listed twice: {}",
                    spec.code
                )));
            }
            currencies.push(spec);
        }
        self.currencies = currencies;
        Ok(self)
    }

    /// Apply every tuning knob from a config
    pub fn configured(self, config: &FxLensConfig) -> Result<Self> {
        let ratios = match &config.ratio_table_path {
            Some(path) => HistoricalRatioTable::load(path)?,
            None => HistoricalRatioTable::curated(),
        };
        Ok(self
            .with_settings(OrchestratorSettings::from_config(config))
            .with_volatility(VolatilityCalculator::new(
                config.periods_per_year,
                config.min_observations,
            ))
            .with_ratio_table(ratios))
    }

    pub fn store(&self) -> &Arc<St> {
        &self.store
    }

    /// Run one fetch → compute → persist cycle
    ///
    /// Returns `Err` only when a store write fails. A cycle without any usable
    /// record comes back as `Ok` with `fatal` set and the store untouched.
    pub async fn run_cycle(&self) -> Result<CycleResult> {
        let cycle_id = Uuid::new_v4();
        let deadline = Instant::now() + self.settings.cycle_timeout;
        let mut phase = CyclePhase::Idle;
        log::info!(
            "Cycle {} starting: {} currencies, timeout {:?}, vol from >= {} closes at {} periods/yr",
            cycle_id,
            self.currencies.len(),
            self.settings.cycle_timeout,
            self.volatility.min_observations(),
            self.volatility.periods_per_year()
        );

        advance(&mut phase, CyclePhase::FetchingRates);
        let usd_rate = match within_deadline(
            deadline,
            format!("{} policy rate", BASE_CODE),
            self.rates.get_policy_rate(BASE_CODE),
        )
        .await
        {
            Ok(rate) => {
                log::info!("{} baseline: {}%", BASE_CODE, rate);
                Ok(rate)
            }
            Err(e) => {
                log_fetch_failure(BASE_CODE, "policy rate", &e);
                log::warn!("No {} baseline this cycle: every carry will be null", BASE_CODE);
                Err(e)
            }
        };

        advance(&mut phase, CyclePhase::FetchingSpotHistories);
        let mut fetched = self.fetch_floating(deadline).await;

        advance(&mut phase, CyclePhase::Computing);
        // Provisional; records are restamped with the completion time below
        let computed_at = Utc::now();
        let usd = usd_rate.as_ref().ok().copied();
        let mut records = Vec::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut stale = Vec::new();

        for spec in &self.currencies {
            let assembled = match spec.regime {
                Regime::Base { .. } => self.assemble_base(spec, &usd_rate, computed_at),
                Regime::Pegged { .. } => self.assemble_pegged(spec, usd, computed_at),
                Regime::Floating { .. } => {
                    let fetch = fetched.remove(spec.code).unwrap_or_else(|| CurrencyFetch {
                        code: spec.code,
                        rate: Err(lost_task(spec.code)),
                        history: Err(lost_task(spec.code)),
                    });
                    self.assemble_floating(spec, fetch, usd, computed_at)
                }
            };

            let Assembled {
                record,
                mut problems,
                usable,
            } = assembled;

            if !usable {
                log::warn!("{}: no usable data this cycle, keeping stored record", spec.code);
                failed.push(CurrencyFailure {
                    currency_code: spec.code.to_string(),
                    reasons: problems,
                });
                continue;
            }
            if let Err(e) = record.validate() {
                log::error!("{}: discarding record: {}", spec.code, e);
                problems.push(e.to_string());
                failed.push(CurrencyFailure {
                    currency_code: spec.code.to_string(),
                    reasons: problems,
                });
                continue;
            }

            if record.stale_feed {
                stale.push(spec.code.to_string());
            }
            log::debug!(
                "{} | spot={:?} | carry={:?} | vol={:?} | c/v={:?}",
                record.currency_code,
                record.spot,
                record.carry,
                record.realised_vol,
                record.carry_vol_ratio
            );
            succeeded.push(spec.code.to_string());
            records.push(record);
        }

        let fetched_at = Utc::now();
        for record in &mut records {
            record.fetched_at = fetched_at;
        }

        if records.is_empty() {
            advance(&mut phase, CyclePhase::Failed);
            log::error!(
                "Cycle {} fatal: no usable records from {} currencies, store left untouched",
                cycle_id,
                failed.len()
            );
            return Ok(CycleResult {
                cycle_id,
                fetched_at,
                phase,
                succeeded_currencies: succeeded,
                failed_currencies: failed,
                stale_currencies: stale,
                fatal: true,
                records,
            });
        }

        advance(&mut phase, CyclePhase::Persisting);
        for record in &records {
            if let Err(e) = self.store.upsert(record) {
                log::error!("Cycle {} aborted while persisting: {}", cycle_id, e);
                return Err(e);
            }
        }

        advance(&mut phase, CyclePhase::Done);
        log::info!(
            "Cycle {} done: {} stored, {} failed, {} stale",
            cycle_id,
            succeeded.len(),
            failed.len(),
            stale.len()
        );

        Ok(CycleResult {
            cycle_id,
            fetched_at,
            phase,
            succeeded_currencies: succeeded,
            failed_currencies: failed,
            stale_currencies: stale,
            fatal: false,
            records,
        })
    }

    /// Fetch rate and history for every floating currency on a bounded pool
    async fn fetch_floating(&self, deadline: Instant) -> HashMap<&'static str, CurrencyFetch> {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let window = self.settings.history_window;
        let mut tasks = JoinSet::new();

        for spec in self.currencies.iter().filter(|s| matches!(s.regime, Regime::Floating { .. })) {
            let code = spec.code;
            let rates = Arc::clone(&self.rates);
            let spots = Arc::clone(&self.spots);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = match timeout_at(deadline, permits.acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    _ => {
                        return CurrencyFetch {
                            code,
                            rate: Err(timed_out(code, "policy rate")),
                            history: Err(timed_out(code, "spot history")),
                        }
                    }
                };

                let (rate, history) = tokio::join!(
                    within_deadline(
                        deadline,
                        format!("{} policy rate", code),
                        rates.get_policy_rate(code)
                    ),
                    within_deadline(
                        deadline,
                        format!("{} spot history", code),
                        spots.get_spot_history(code, window)
                    ),
                );
                CurrencyFetch {
                    code,
                    rate,
                    history,
                }
            });
        }

        let mut results = HashMap::new();
        loop {
            match timeout_at(deadline + ABORT_GRACE, tasks.join_next()).await {
                Ok(Some(Ok(fetch))) => {
                    results.insert(fetch.code, fetch);
                }
                Ok(Some(Err(e))) => log::error!("Currency fetch task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    log::warn!("Aborting {} unfinished currency fetches", tasks.len());
                    tasks.abort_all();
                    break;
                }
            }
        }
        results
    }

    fn assemble_base(
        &self,
        spec: &CurrencySpec,
        usd_rate: &Result<f64>,
        fetched_at: DateTime<Utc>,
    ) -> Assembled {
        let policy_rate = usd_rate.as_ref().ok().copied();
        let mut problems = Vec::new();
        if let Err(e) = usd_rate {
            problems.push(format!("policy rate: {}", e));
        }

        let carry = CarryCalculator::compute(policy_rate, policy_rate);
        let record = self.finish(
            spec,
            policy_rate,
            policy_rate,
            Some(1.0),
            Vec::new(),
            carry,
            Some(0.0),
            false,
            fetched_at,
        );
        Assembled {
            record,
            problems,
            usable: policy_rate.is_some(),
        }
    }

    fn assemble_pegged(
        &self,
        spec: &CurrencySpec,
        usd_rate: Option<f64>,
        fetched_at: DateTime<Utc>,
    ) -> Assembled {
        let spot = self.pegged.get_pegged_spot(spec.code);
        let policy_rate = self.pegged.policy_rate(spec.code, usd_rate);
        let mut problems = Vec::new();
        if policy_rate.is_none() {
            problems.push(format!("policy rate: no {} baseline for peg convention", BASE_CODE));
        }

        let carry = CarryCalculator::compute(policy_rate, usd_rate);
        let record = self.finish(
            spec,
            policy_rate,
            usd_rate,
            Some(spot),
            Vec::new(),
            carry,
            Some(0.0),
            false,
            fetched_at,
        );
        Assembled {
            record,
            problems,
            usable: policy_rate.is_some(),
        }
    }

    fn assemble_floating(
        &self,
        spec: &CurrencySpec,
        fetch: CurrencyFetch,
        usd_rate: Option<f64>,
        fetched_at: DateTime<Utc>,
    ) -> Assembled {
        let mut problems = Vec::new();

        let policy_rate = match fetch.rate {
            Ok(rate) => Some(rate),
            Err(e) => {
                log_fetch_failure(spec.code, "policy rate", &e);
                problems.push(format!("policy rate: {}", e));
                None
            }
        };

        let (history, realised_vol, stale_feed) = match fetch.history {
            Ok(history) => match self.volatility.compute(&history) {
                Ok(vol) => {
                    let stale = vol == 0.0 && volatility::is_constant(&history);
                    if stale {
                        log::warn!(
                            "{}: flat spot history over {} observations, feed looks stale",
                            spec.code,
                            history.len()
                        );
                    }
                    (history, Some(vol), stale)
                }
                Err(e) => {
                    log_fetch_failure(spec.code, "realised vol", &e);
                    problems.push(format!("realised vol: {}", e));
                    (history, None, false)
                }
            },
            Err(e) => {
                log_fetch_failure(spec.code, "spot history", &e);
                problems.push(format!("spot history: {}", e));
                (Vec::new(), None, false)
            }
        };

        let spot = history.last().map(|obs| spec.market_quote(obs.price));
        let carry = CarryCalculator::compute(policy_rate, usd_rate);
        let usable = policy_rate.is_some() || realised_vol.is_some() || spot.is_some();
        let record = self.finish(
            spec,
            policy_rate,
            usd_rate,
            spot,
            history,
            carry,
            realised_vol,
            stale_feed,
            fetched_at,
        );

        Assembled {
            record,
            problems,
            usable,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        spec: &CurrencySpec,
        policy_rate: Option<f64>,
        usd_rate: Option<f64>,
        spot: Option<f64>,
        spot_history: Vec<SpotObservation>,
        carry: Option<f64>,
        realised_vol: Option<f64>,
        stale_feed: bool,
        fetched_at: DateTime<Utc>,
    ) -> CurrencyRecord {
        CurrencyRecord {
            currency_code: spec.code.to_string(),
            name: spec.name.to_string(),
            group: spec.group,
            policy_rate,
            usd_rate,
            spot,
            spot_history,
            carry,
            realised_vol,
            carry_vol_ratio: CarryCalculator::carry_vol_ratio(carry, realised_vol),
            stale_feed,
            hist_ratios: self.ratios.get(spec.code),
            ratio_table_version: self.ratios.version().to_string(),
            fetched_at,
            is_pegged: spec.is_pegged(),
        }
    }
}

/// Orchestrator over the live providers and the on-disk store
pub fn build_live_orchestrator(
    config: &FxLensConfig,
) -> Result<FetchOrchestrator<FredRateProvider, ExchangeRateHostSource, SqliteStore>> {
    let rates = FredRateProvider::with_options(
        config.require_fred_api_key()?.to_string(),
        config.fred_base_url.clone(),
        config.request_timeout(),
    )?;
    let spots = ExchangeRateHostSource::with_options(config.spot_base_url.clone(), config.request_timeout())?;

    config.ensure_dirs()?;
    let store = SqliteStore::new(&config.db_path)?;

    FetchOrchestrator::new(Arc::new(rates), Arc::new(spots), Arc::new(store)).configured(config)
}

fn advance(phase: &mut CyclePhase, next: CyclePhase) {
    log::debug!("Cycle phase {} -> {}", phase, next);
    *phase = next;
}

async fn within_deadline<T>(
    deadline: Instant,
    what: String,
    fetch: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout_at(deadline, fetch).await {
        Ok(outcome) => outcome,
        Err(_) => Err(FxLensError::Timeout(format!("{} abandoned at cycle deadline", what))),
    }
}

fn timed_out(code: &str, what: &str) -> FxLensError {
    FxLensError::Timeout(format!("{} {} never started before cycle deadline", code, what))
}

fn lost_task(code: &str) -> FxLensError {
    FxLensError::Timeout(format!("{} fetch task aborted after cycle deadline", code))
}

/// One log line per failure kind, so outages, throttling and bad ids are told apart
fn log_fetch_failure(code: &str, what: &str, err: &FxLensError) {
    match err {
        FxLensError::RateLimited { provider } => {
            log::warn!("{} {}: rate limited by {}, skipping", code, what, provider)
        }
        FxLensError::SeriesNotFound { series_id, .. } => {
            log::warn!("{} {}: series {} not found, skipping", code, what, series_id)
        }
        FxLensError::ProviderUnavailable { provider, message } => {
            log::warn!("{} {}: {} unavailable ({}), skipping", code, what, provider, message)
        }
        FxLensError::Timeout(message) => log::warn!("{} {}: {}", code, what, message),
        FxLensError::InsufficientData { required, actual } => log::warn!(
            "{} {}: {} of {} required observations, leaving null",
            code,
            what,
            actual,
            required
        ),
        FxLensError::ValidationError(message) => {
            log::warn!("{} {}: malformed provider data ({})", code, what, message)
        }
        other => log::warn!("{} {}: {}", code, what, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_success() {
        let result = CycleResult {
            cycle_id: Uuid::new_v4(),
            fetched_at: Utc::now(),
            phase: CyclePhase::Failed,
            succeeded_currencies: Vec::new(),
            failed_currencies: vec![CurrencyFailure {
                currency_code: "EUR".to_string(),
                reasons: vec!["spot history: outage".to_string()],
            }],
            stale_currencies: Vec::new(),
            fatal: true,
            records: Vec::new(),
        };
        assert!(matches!(
            result.ensure_success(),
            Err(FxLensError::FatalCycleFailure { failed: 1 })
        ));
        assert!(!result.is_partial());
        assert_eq!(result.failed_codes(), vec!["EUR"]);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(CyclePhase::FetchingSpotHistories.to_string(), "fetching_spot_histories");
        assert_eq!(CyclePhase::Done.to_string(), "done");
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = FxLensConfig::default();
        config.max_concurrency = 0;
        config.cycle_timeout_secs = 30;
        let settings = OrchestratorSettings::from_config(&config);
        assert_eq!(settings.max_concurrency, 1);
        assert_eq!(settings.cycle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_aborted_task_counts_as_timeout() {
        let err = lost_task("JPY");
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("JPY"));
    }

    #[tokio::test]
    async fn test_within_deadline_times_out() {
        let deadline = Instant::now() + Duration::from_millis(20);
        let outcome: Result<f64> = within_deadline(deadline, "slow".to_string(), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1.0)
        })
        .await;
        assert!(matches!(outcome, Err(FxLensError::Timeout(_))));
    }
}
