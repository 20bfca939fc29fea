//! Realised volatility from a spot history
//!
//! Annualises the sample standard deviation of log-returns by the number of
//! observation periods per year. Each consecutive pair of observations counts
//! as one period, so weekend and holiday gaps do not stretch the horizon.

use crate::error::{FxLensError, Result};
use crate::record::SpotObservation;
use statrs::statistics::{Data, Distribution};

/// Trading days per year, for daily closes
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// A sample standard deviation needs two returns, hence three prices
pub const MIN_OBSERVATIONS_FLOOR: usize = 3;

/// Default minimum history length before a vol is reported
pub const DEFAULT_MIN_OBSERVATIONS: usize = 5;

/// Realised volatility calculator
#[derive(Debug, Clone, Copy)]
pub struct VolatilityCalculator {
    periods_per_year: f64,
    min_observations: usize,
}

impl VolatilityCalculator {
    /// Create a calculator
    ///
    /// `min_observations` is raised to [`MIN_OBSERVATIONS_FLOOR`] if lower.
    pub fn new(periods_per_year: f64, min_observations: usize) -> Self {
        Self {
            periods_per_year,
            min_observations: min_observations.max(MIN_OBSERVATIONS_FLOOR),
        }
    }

    /// Daily sampling with the default minimum
    pub fn daily() -> Self {
        Self::new(TRADING_DAYS_PER_YEAR, DEFAULT_MIN_OBSERVATIONS)
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    pub fn periods_per_year(&self) -> f64 {
        self.periods_per_year
    }

    /// Annualised realised volatility of `history`
    pub fn compute(&self, history: &[SpotObservation]) -> Result<f64> {
        if history.len() < self.min_observations {
            return Err(FxLensError::InsufficientData {
                required: self.min_observations,
                actual: history.len(),
            });
        }

        let returns = log_returns(history)?;
        let daily_std = Data::new(returns).std_dev().ok_or_else(|| {
            FxLensError::InsufficientData {
                required: self.min_observations,
                actual: history.len(),
            }
        })?;

        let vol = daily_std * self.periods_per_year.sqrt();
        if !vol.is_finite() {
            return Err(FxLensError::ValidationError(format!(
                "Non-finite realised vol from {} observations",
                history.len()
            )));
        }

        // Rounding can leave -0.0 or a denormal below zero on flat series
        Ok(vol.max(0.0))
    }
}

impl Default for VolatilityCalculator {
    fn default() -> Self {
        Self::daily()
    }
}

/// Log-returns between consecutive observations
pub fn log_returns(history: &[SpotObservation]) -> Result<Vec<f64>> {
    if let Some(bad) = history.iter().find(|o| !o.price.is_finite() || o.price <= 0.0) {
        return Err(FxLensError::ValidationError(format!(
            "Non-positive price {} at {}",
            bad.price, bad.timestamp
        )));
    }

    Ok(history
        .windows(2)
        .map(|pair| (pair[1].price / pair[0].price).ln())
        .collect())
}

/// True when every observation has the same price
pub fn is_constant(history: &[SpotObservation]) -> bool {
    match history.first() {
        Some(first) => history.iter().all(|o| o.price == first.price),
        None => false,
    }
}
