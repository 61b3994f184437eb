// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure indicator math over ordered closing prices. Every public function
// returns `None` when the series is too short for the window.

pub mod rsi;
pub mod sma;
pub mod snapshot;

pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use snapshot::{IndicatorPeriods, IndicatorSnapshot};
