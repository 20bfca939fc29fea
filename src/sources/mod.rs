//! External data source integrations
//!
//! This module provides the providers a fetch cycle pulls from:
//! - FRED: central bank policy rates (API key required)
//! - exchangerate.host: daily spot history against USD (no key)
//! - Pegged: hardcoded spots for USD-pegged currencies (no I/O)
//! - In-memory: scripted providers for tests and offline runs

pub mod exchange_rate_host;
pub mod fred;
pub mod in_memory;
pub mod pegged;

pub use exchange_rate_host::ExchangeRateHostSource;
pub use fred::FredRateProvider;
pub use in_memory::{InMemoryRateProvider, InMemorySpotHistoryProvider, InjectedFailure};
pub use pegged::PeggedRateSource;

use crate::error::Result;
use crate::record::SpotObservation;
use chrono::Duration;
use std::future::Future;

/// Source of a currency's current policy rate
pub trait RateProvider: Send + Sync {
    /// Latest published policy rate for `currency_code`, in percent
    fn get_policy_rate(&self, currency_code: &str) -> impl Future<Output = Result<f64>> + Send;

    /// Get the source name
    fn name(&self) -> &str;
}

/// Source of a currency's spot history against USD
pub trait SpotHistoryProvider: Send + Sync {
    /// Daily observations over the trailing `window`, ascending, no null prices
    fn get_spot_history(
        &self,
        currency_code: &str,
        window: Duration,
    ) -> impl Future<Output = Result<Vec<SpotObservation>>> + Send;

    /// Get the source name
    fn name(&self) -> &str;
}
