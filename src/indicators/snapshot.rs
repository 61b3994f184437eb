use serde::{Deserialize, Serialize};

use super::{calculate_rsi, calculate_sma};

/// Indicator windows shown in the detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPeriods {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            sma_short: 10,
            sma_long: 20,
            rsi: 14,
        }
    }
}

/// Point-in-time indicator values at the last close of a series.
///
/// `None` means there were not enough closes for that window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub periods: IndicatorPeriods,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub rsi: Option<f64>,
    /// Number of closes the snapshot was computed from.
    pub observations: usize,
}

impl IndicatorSnapshot {
    pub fn compute(closes: &[f64], periods: IndicatorPeriods) -> Self {
        Self {
            periods,
            sma_short: calculate_sma(closes, periods.sma_short),
            sma_long: calculate_sma(closes, periods.sma_long),
            rsi: calculate_rsi(closes, periods.rsi),
            observations: closes.len(),
        }
    }
}
