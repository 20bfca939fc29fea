//! Hardcoded spots for USD-pegged currencies

use crate::currency::{self, Regime};

/// Constant spot and policy-rate convention for the peg set
///
/// Pure lookup into the currency table. Pegs move by well under 0.01% a
/// year, so there is nothing to fetch and volatility is zero by definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeggedRateSource;

impl PeggedRateSource {
    pub fn new() -> Self {
        Self
    }

    /// Constant spot (units of currency per USD)
    ///
    /// # Panics
    ///
    /// Panics if `currency_code` is not in the peg set. Callers select pegged
    /// currencies from the table, so anything else is a bug.
    pub fn get_pegged_spot(&self, currency_code: &str) -> f64 {
        self.peg(currency_code).0
    }

    /// Peg-country policy rate: USD rate plus the published spread
    ///
    /// # Panics
    ///
    /// Same contract as [`PeggedRateSource::get_pegged_spot`].
    pub fn policy_rate(&self, currency_code: &str, usd_rate: Option<f64>) -> Option<f64> {
        let spread = self.peg(currency_code).1;
        usd_rate.map(|usd| usd + spread)
    }

    fn peg(&self, currency_code: &str) -> (f64, f64) {
        match currency::find(currency_code).map(|spec| spec.regime) {
            Some(Regime::Pegged {
                spot,
                spread_over_usd,
            }) => (spot, spread_over_usd),
            _ => panic!("{} is not a pegged currency", currency_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pegged_spots() {
        let source = PeggedRateSource::new();
        assert_eq!(source.get_pegged_spot("SAR"), 3.75);
        assert_eq!(source.get_pegged_spot("KWD"), 0.3075);
    }

    #[test]
    fn test_policy_rate_convention() {
        let source = PeggedRateSource::new();
        assert_relative_eq!(source.policy_rate("SAR", Some(5.25)).unwrap(), 6.25, epsilon = 1e-12);
        assert_relative_eq!(source.policy_rate("AED", Some(5.25)).unwrap(), 5.15, epsilon = 1e-12);
        assert_eq!(source.policy_rate("QAR", None), None);
    }

    #[test]
    #[should_panic(expected = "not a pegged currency")]
    fn test_non_member_panics() {
        PeggedRateSource::new().get_pegged_spot("EUR");
    }
}
