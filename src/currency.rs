//! Currency universe and quoting conventions
//!
//! Every currency the fetcher knows about lives in [`CURRENCIES`]. Adding or
//! removing a currency is a one-line change to that table.

use crate::error::{FxLensError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// FRED series for the USD carry baseline (effective federal funds rate)
pub const USD_SERIES_ID: &str = "FEDFUNDS";

/// Code of the carry baseline currency
pub const BASE_CODE: &str = "USD";

/// Dashboard grouping of a currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyGroup {
    Base,
    G10,
    Europe,
    EM,
    GCC,
}

impl CurrencyGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrencyGroup::Base => "Base",
            CurrencyGroup::G10 => "G10",
            CurrencyGroup::Europe => "Europe",
            CurrencyGroup::EM => "EM",
            CurrencyGroup::GCC => "GCC",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "Base" => Ok(CurrencyGroup::Base),
            "G10" => Ok(CurrencyGroup::G10),
            "Europe" => Ok(CurrencyGroup::Europe),
            "EM" => Ok(CurrencyGroup::EM),
            "GCC" => Ok(CurrencyGroup::GCC),
            _ => Err(FxLensError::ValidationError(format!(
                "Unknown currency group: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for CurrencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a currency's rate and spot are sourced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regime {
    /// The carry baseline itself
    Base { series_id: &'static str },
    /// Market-determined rate with a live policy-rate series
    Floating {
        series_id: &'static str,
        /// Pair is conventionally quoted as CCY/USD (e.g. EUR/USD = 1.08)
        quote_inverted: bool,
    },
    /// Fixed to USD by policy
    Pegged {
        spot: f64,
        /// Policy rate convention: USD rate plus this spread, in percent
        spread_over_usd: f64,
    },
}

/// One row of the currency table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrencySpec {
    pub code: &'static str,
    pub name: &'static str,
    pub group: CurrencyGroup,
    pub regime: Regime,
}

impl CurrencySpec {
    pub fn is_pegged(&self) -> bool {
        matches!(self.regime, Regime::Pegged { .. })
    }

    /// FRED series id of the policy rate, if fetched live
    pub fn series_id(&self) -> Option<&'static str> {
        match self.regime {
            Regime::Base { series_id } | Regime::Floating { series_id, .. } => Some(series_id),
            Regime::Pegged { .. } => None,
        }
    }

    /// Convert a provider price (units of this currency per USD) to market quote
    pub fn market_quote(&self, provider_price: f64) -> f64 {
        match self.regime {
            Regime::Floating {
                quote_inverted: true,
                ..
            } if provider_price > 0.0 => 1.0 / provider_price,
            _ => provider_price,
        }
    }
}

const fn floating(
    code: &'static str,
    name: &'static str,
    group: CurrencyGroup,
    series_id: &'static str,
    quote_inverted: bool,
) -> CurrencySpec {
    CurrencySpec {
        code,
        name,
        group,
        regime: Regime::Floating {
            series_id,
            quote_inverted,
        },
    }
}

const fn pegged(code: &'static str, name: &'static str, spot: f64, spread_over_usd: f64) -> CurrencySpec {
    CurrencySpec {
        code,
        name,
        group: CurrencyGroup::GCC,
        regime: Regime::Pegged {
            spot,
            spread_over_usd,
        },
    }
}

/// The fixed currency universe
///
/// GCC spreads and spots move rarely and are maintained by hand.
pub const CURRENCIES: &[CurrencySpec] = &[
    CurrencySpec {
        code: BASE_CODE,
        name: "US Dollar",
        group: CurrencyGroup::Base,
        regime: Regime::Base {
            series_id: USD_SERIES_ID,
        },
    },
    floating("EUR", "Euro", CurrencyGroup::G10, "ECBDFR", true),
    floating("JPY", "Japanese Yen", CurrencyGroup::G10, "IRSTCI01JPM156N", false),
    floating("GBP", "British Pound", CurrencyGroup::G10, "BOEBR", true),
    floating("CHF", "Swiss Franc", CurrencyGroup::G10, "SNBPOLFCIR", true),
    floating("AUD", "Australian Dollar", CurrencyGroup::G10, "RBATCTR", true),
    floating("NZD", "New Zealand Dollar", CurrencyGroup::G10, "RBNZOCR", true),
    floating("CAD", "Canadian Dollar", CurrencyGroup::G10, "CAPCBEPCBREPO", false),
    floating("NOK", "Norwegian Krone", CurrencyGroup::Europe, "IRSTCI01NOM156N", false),
    floating("DKK", "Danish Krone", CurrencyGroup::Europe, "IRSTCI01DKM156N", false),
    floating("PLN", "Polish Zloty", CurrencyGroup::Europe, "IRSTCI01PLM156N", false),
    floating("MXN", "Mexican Peso", CurrencyGroup::EM, "IRSTCI01MXM156N", false),
    pegged("SAR", "Saudi Riyal", 3.7500, 1.00),
    pegged("AED", "UAE Dirham", 3.6725, -0.10),
    pegged("OMR", "Omani Rial", 0.3850, 0.50),
    pegged("KWD", "Kuwaiti Dinar", 0.3075, 0.00),
    pegged("QAR", "Qatari Riyal", 3.6400, 0.60),
    pegged("BHD", "Bahraini Dinar", 0.3770, 1.00),
];

/// Look up a currency by ISO code (case-insensitive)
pub fn find(code: &str) -> Option<&'static CurrencySpec> {
    CURRENCIES
        .iter()
        .find(|spec| spec.code.eq_ignore_ascii_case(code))
}

/// Look up a currency, failing for codes outside the universe
pub fn lookup(code: &str) -> Result<&'static CurrencySpec> {
    find(code).ok_or_else(|| FxLensError::ValidationError(format!("Unsupported currency: {}", code)))
}
