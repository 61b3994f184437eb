// =============================================================================
// Relative Strength Index (RSI), Wilder's Smoothing
// =============================================================================
//
// Step 1: Compute price changes (deltas) from consecutive closes.
// Step 2: Seed average gain / average loss with the SMA of the first `period`
//         gains / losses.
// Step 3: Smooth every later delta:
//           avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//           avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4: avg_loss == 0  => RSI = 100
//         otherwise RS = avg_gain / avg_loss, RSI = 100 - 100 / (1 + RS)
//
// The seed window and the smoothing range never overlap: delta `period` is the
// first one that gets smoothed.
// =============================================================================

/// Compute the full RSI series for the given `closes` and `period`.
///
/// The returned vector has one RSI value for each close starting at index
/// `period` (the first `period` deltas are consumed to seed the averages).
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() <= period` => empty vec (need at least `period` deltas)
/// - If average loss is zero (no down moves), RSI is exactly 100.0.
/// - Non-finite results are dropped and the series is truncated.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        let (gain, loss) = split_delta(d);
        (g + gain, l + loss)
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    match rsi_from_averages(avg_gain, avg_loss) {
        Some(rsi) => result.push(rsi),
        None => return result,
    }

    for &delta in &deltas[period..] {
        let (gain, loss) = split_delta(delta);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => break,
        }
    }

    result
}

/// RSI at the last close of `closes`.
///
/// Returns `None` when `closes.len() <= period`, `period == 0`, or the
/// calculation produces a non-finite value anywhere along the series (a
/// truncated series has no value for the last close).
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    let series = rsi_series(closes, period);
    if series.len() != closes.len().saturating_sub(period) {
        return None;
    }
    series.last().copied()
}

// =============================================================================
// Internal helpers
// =============================================================================

fn split_delta(delta: f64) -> (f64, f64) {
    if delta > 0.0 {
        (delta, 0.0)
    } else {
        (0.0, -delta)
    }
}

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input() {
        assert!(rsi_series(&[], 14).is_empty());
        assert_eq!(calculate_rsi(&[], 14), None);
    }

    #[test]
    fn rsi_period_zero() {
        assert_eq!(calculate_rsi(&[1.0, 2.0, 3.0], 0), None);
    }

    #[test]
    fn rsi_needs_more_than_period_closes() {
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert_eq!(calculate_rsi(&closes, 14), None);

        let closes: Vec<f64> = (1..=15).map(|x| x as f64).collect();
        assert!(calculate_rsi(&closes, 14).is_some());
    }

    #[test]
    fn rsi_all_gains_is_exactly_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let series = rsi_series(&closes, 14);
        assert_eq!(series.len(), 16);
        for &v in &series {
            assert_eq!(v, 100.0);
        }
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let v = calculate_rsi(&closes, 14).unwrap();
        assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
    }

    #[test]
    fn rsi_flat_market_has_no_losses() {
        let closes = vec![100.0; 30];
        assert_eq!(calculate_rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn rsi_seed_only_value() {
        // period 2, deltas [+2, -1] => avg_gain 1.0, avg_loss 0.5 => RS 2.
        let v = calculate_rsi(&[10.0, 12.0, 11.0], 2).unwrap();
        assert!((v - (100.0 - 100.0 / 3.0)).abs() < 1e-12, "got {v}");
    }

    #[test]
    fn rsi_smoothing_step() {
        // period 2, deltas [+2, -1, +1]:
        //   seed:   avg_gain 1.0,  avg_loss 0.5
        //   smooth: avg_gain 1.0,  avg_loss 0.25 => RS 4 => RSI 80
        let v = calculate_rsi(&[10.0, 12.0, 11.0, 12.0], 2).unwrap();
        assert!((v - 80.0).abs() < 1e-12, "got {v}");
    }

    #[test]
    fn rsi_non_finite_close_has_no_current_value() {
        let closes = [10.0, 12.0, 11.0, 12.0, f64::NAN, 13.0];
        assert_eq!(rsi_series(&closes, 2).len(), 2);
        assert_eq!(calculate_rsi(&closes, 2), None);
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        for &v in &rsi_series(&closes, 14) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }
}
