//! Signal derivation: carry, realised volatility and curated ratios

pub mod carry;
pub mod ratios;
pub mod volatility;

pub use carry::CarryCalculator;
pub use ratios::HistoricalRatioTable;
pub use volatility::VolatilityCalculator;
