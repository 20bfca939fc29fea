//! Interest-rate carry versus USD

/// Carry calculator
///
/// Missing inputs propagate as `None`. Absence of carry is a displayable
/// state, not an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarryCalculator;

impl CarryCalculator {
    /// Foreign policy rate minus USD policy rate, in percent
    pub fn compute(policy_rate_foreign: Option<f64>, policy_rate_usd: Option<f64>) -> Option<f64> {
        Some(policy_rate_foreign? - policy_rate_usd?)
    }

    /// Carry over realised vol on a percent/percent basis
    ///
    /// `realised_vol` is unitless, so it is scaled to percent first. Undefined
    /// for a zero vol (pegs, stale feeds).
    pub fn carry_vol_ratio(carry: Option<f64>, realised_vol: Option<f64>) -> Option<f64> {
        match (carry, realised_vol) {
            (Some(c), Some(v)) if v > 0.0 => Some(c / (v * 100.0)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_eur_example() {
        let carry = CarryCalculator::compute(Some(3.50), Some(5.25)).unwrap();
        assert_relative_eq!(carry, -1.75, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_inputs_propagate() {
        assert_eq!(CarryCalculator::compute(None, Some(5.25)), None);
        assert_eq!(CarryCalculator::compute(Some(3.5), None), None);
        assert_eq!(CarryCalculator::compute(None, None), None);
    }

    #[test]
    fn test_equal_rates_give_zero_not_none() {
        assert_eq!(CarryCalculator::compute(Some(4.0), Some(4.0)), Some(0.0));
    }

    #[test]
    fn test_ratio() {
        let ratio = CarryCalculator::carry_vol_ratio(Some(5.0), Some(0.10)).unwrap();
        assert_relative_eq!(ratio, 0.5, epsilon = 1e-12);
        assert_eq!(CarryCalculator::carry_vol_ratio(Some(1.0), Some(0.0)), None);
        assert_eq!(CarryCalculator::carry_vol_ratio(None, Some(0.1)), None);
        assert_eq!(CarryCalculator::carry_vol_ratio(Some(1.0), None), None);
    }
}
