//! # Rusty-FxLens
//!
//! Periodic FX carry and realised-volatility snapshots for a fixed universe
//! of G10, European, emerging-market and USD-pegged Gulf currencies.
//!
//! Each fetch cycle pulls policy rates from FRED and daily spot histories from
//! exchangerate.host, derives carry versus USD, annualised realised vol and
//! carry/vol, attaches curated historical ratios, and upserts one record per
//! currency into SQLite. Provider failures null individual fields; they never
//! abort the cycle.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rusty_fxlens::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<()> {
//! let rates = InMemoryRateProvider::with_rates(&[("USD", 5.25), ("EUR", 3.5)]);
//! let spots = InMemorySpotHistoryProvider::new();
//! let store = SqliteStore::new_in_memory()?;
//!
//! let orchestrator = FetchOrchestrator::new(Arc::new(rates), Arc::new(spots), Arc::new(store))
//!     .with_currencies(&["USD", "EUR", "SAR"])?;
//! let result = orchestrator.run_cycle().await?;
//! result.ensure_success()?;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod config;
pub mod currency;
pub mod error;
pub mod orchestrator;
pub mod record;
pub mod sources;
pub mod store;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::analytics::{CarryCalculator, HistoricalRatioTable, VolatilityCalculator};
    pub use crate::config::FxLensConfig;
    pub use crate::currency::{CurrencyGroup, CurrencySpec, CURRENCIES};
    pub use crate::error::{FxLensError, Result};
    pub use crate::orchestrator::{CycleResult, FetchOrchestrator, OrchestratorSettings};
    pub use crate::record::{CurrencyRecord, HistRatios, Horizon, SpotObservation};
    pub use crate::sources::{
        InMemoryRateProvider, InMemorySpotHistoryProvider, PeggedRateSource, RateProvider,
        SpotHistoryProvider,
    };
    pub use crate::store::{RecordStore, SqliteStore};
}
