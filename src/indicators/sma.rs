// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Arithmetic mean of the last `period` closes:
//
//   SMA = (close_{n-period} + ... + close_{n-1}) / period
// =============================================================================

/// Trailing SMA over the window ending at the last element of `closes`.
///
/// Returns `None` when `period == 0` or there are fewer than `period` closes.
pub fn calculate_sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let sma = window.iter().sum::<f64>() / period as f64;

    sma.is_finite().then_some(sma)
}
