//! Per-currency records produced by a fetch cycle

use crate::currency::CurrencyGroup;
use crate::error::{FxLensError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single spot observation (units of currency per USD)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotObservation {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl SpotObservation {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Look-back horizon of a curated carry/vol ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "3Y")]
    ThreeYears,
    #[serde(rename = "5Y")]
    FiveYears,
    #[serde(rename = "10Y")]
    TenYears,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [
        Horizon::OneYear,
        Horizon::ThreeYears,
        Horizon::FiveYears,
        Horizon::TenYears,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::OneYear => "1Y",
            Horizon::ThreeYears => "3Y",
            Horizon::FiveYears => "5Y",
            Horizon::TenYears => "10Y",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Curated carry/vol ratios across the four horizons
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistRatios {
    #[serde(rename = "1Y")]
    pub y1: Option<f64>,
    #[serde(rename = "3Y")]
    pub y3: Option<f64>,
    #[serde(rename = "5Y")]
    pub y5: Option<f64>,
    #[serde(rename = "10Y")]
    pub y10: Option<f64>,
}

impl HistRatios {
    pub const fn new(y1: f64, y3: f64, y5: f64, y10: f64) -> Self {
        Self {
            y1: Some(y1),
            y3: Some(y3),
            y5: Some(y5),
            y10: Some(y10),
        }
    }

    pub fn get(&self, horizon: Horizon) -> Option<f64> {
        match horizon {
            Horizon::OneYear => self.y1,
            Horizon::ThreeYears => self.y3,
            Horizon::FiveYears => self.y5,
            Horizon::TenYears => self.y10,
        }
    }
}

/// One currency's derived signals for one fetch cycle
///
/// Built once per cycle and never mutated afterwards. `None` always means
/// "unavailable this cycle", never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRecord {
    pub currency_code: String,
    pub name: String,
    pub group: CurrencyGroup,
    /// Policy rate in percent
    pub policy_rate: Option<f64>,
    /// USD baseline used for carry, in percent
    pub usd_rate: Option<f64>,
    /// Latest spot in market quote convention
    pub spot: Option<f64>,
    pub spot_history: Vec<SpotObservation>,
    /// Policy rate minus USD policy rate, in percent
    pub carry: Option<f64>,
    /// Annualised standard deviation of log-returns, unitless
    pub realised_vol: Option<f64>,
    /// Carry over vol, both in percent, comparable to `hist_ratios`
    pub carry_vol_ratio: Option<f64>,
    /// Zero-variance history on a floating currency
    pub stale_feed: bool,
    pub hist_ratios: HistRatios,
    pub ratio_table_version: String,
    pub fetched_at: DateTime<Utc>,
    pub is_pegged: bool,
}

impl CurrencyRecord {
    /// Check record invariants before it is allowed into the store
    pub fn validate(&self) -> Result<()> {
        let code = &self.currency_code;
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(FxLensError::ValidationError(format!(
                "Invalid currency code: {:?}",
                code
            )));
        }

        let numeric = [
            ("policy_rate", self.policy_rate),
            ("usd_rate", self.usd_rate),
            ("spot", self.spot),
            ("carry", self.carry),
            ("realised_vol", self.realised_vol),
            ("carry_vol_ratio", self.carry_vol_ratio),
        ];
        for (field, value) in numeric {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(FxLensError::ValidationError(format!(
                        "{}: {} is not finite ({})",
                        code, field, v
                    )));
                }
            }
        }

        if let Some(vol) = self.realised_vol {
            if vol < 0.0 {
                return Err(FxLensError::ValidationError(format!(
                    "{}: negative realised vol {}",
                    code, vol
                )));
            }
        }

        if self.carry.is_some() && (self.policy_rate.is_none() || self.usd_rate.is_none()) {
            return Err(FxLensError::ValidationError(format!(
                "{}: carry present without both policy rates",
                code
            )));
        }

        for pair in self.spot_history.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(FxLensError::ValidationError(format!(
                    "{}: spot history not strictly ascending at {}",
                    code, pair[1].timestamp
                )));
            }
        }
        if let Some(obs) = self
            .spot_history
            .iter()
            .find(|o| !o.price.is_finite() || o.price <= 0.0)
        {
            return Err(FxLensError::ValidationError(format!(
                "{}: invalid price {} at {}",
                code, obs.price, obs.timestamp
            )));
        }

        if self.is_pegged {
            if self.realised_vol != Some(0.0) {
                return Err(FxLensError::ValidationError(format!(
                    "{}: pegged currency must have zero realised vol",
                    code
                )));
            }
            if let Some(first) = self.spot_history.first() {
                if self.spot_history.iter().any(|o| o.price != first.price) {
                    return Err(FxLensError::ValidationError(format!(
                        "{}: pegged currency with non-constant history",
                        code
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn sample_record(code: &str) -> CurrencyRecord {
        CurrencyRecord {
            currency_code: code.to_string(),
            name: "Euro".to_string(),
            group: CurrencyGroup::G10,
            policy_rate: Some(3.5),
            usd_rate: Some(5.25),
            spot: Some(1.08),
            spot_history: Vec::new(),
            carry: Some(-1.75),
            realised_vol: Some(0.0635),
            carry_vol_ratio: Some(-0.28),
            stale_feed: false,
            hist_ratios: HistRatios::new(-0.33, -0.20, -0.14, -0.07),
            ratio_table_version: "test".to_string(),
            fetched_at: Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap(),
            is_pegged: false,
        }
    }

    #[test]
    fn test_valid_record() {
        assert!(sample_record("EUR").validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_code() {
        assert!(sample_record("eur").validate().is_err());
        assert!(sample_record("EURO").validate().is_err());
    }

    #[test]
    fn test_rejects_negative_vol() {
        let mut record = sample_record("EUR");
        record.realised_vol = Some(-0.01);
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_rejects_orphan_carry() {
        let mut record = sample_record("EUR");
        record.usd_rate = None;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_rejects_unsorted_history() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let mut record = sample_record("EUR");
        record.spot_history = vec![
            SpotObservation::new(t0 + Duration::days(1), 0.92),
            SpotObservation::new(t0, 0.93),
        ];
        assert!(record.validate().is_err());

        record.spot_history = vec![SpotObservation::new(t0, 0.92), SpotObservation::new(t0, 0.92)];
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_pegged_rules() {
        let mut record = sample_record("SAR");
        record.is_pegged = true;
        record.realised_vol = Some(0.0);
        assert!(record.validate().is_ok());

        record.realised_vol = Some(0.001);
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_hist_ratios_by_horizon() {
        let ratios = HistRatios::new(0.1, 0.2, 0.3, 0.4);
        let values: Vec<_> = Horizon::ALL.iter().map(|h| ratios.get(*h).unwrap()).collect();
        assert_eq!(values, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(Horizon::TenYears.to_string(), "10Y");
    }
}
