use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single fixed-interval OHLCV observation.
///
/// `time` is the interval's open time in milliseconds since the UNIX epoch.
/// Derived percentages are computed on demand so there is exactly one
/// definition of each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Percentage price change over the interval, `(close - open) / open * 100`.
    ///
    /// `None` when `open` is zero.
    pub fn change(&self) -> Option<f64> {
        percent_change(self.open, self.close)
    }

    /// Intra-interval range as a percentage of the low, `(high - low) / low * 100`.
    ///
    /// `None` when `low` is zero.
    pub fn volatility(&self) -> Option<f64> {
        if self.low == 0.0 {
            return None;
        }
        let v = (self.high - self.low) / self.low * 100.0;
        v.is_finite().then_some(v)
    }

    /// Parse one row of the Binance `/api/v3/klines` array-of-arrays response.
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume, ...
    pub fn from_kline_row(row: &serde_json::Value) -> Result<Self> {
        let arr = row.as_array().context("kline entry is not an array")?;
        if arr.len() < 6 {
            anyhow::bail!("kline entry has {} elements, expected at least 6", arr.len());
        }

        let time = arr[0].as_i64().context("kline openTime is not an integer")?;
        let open = parse_string_f64(&arr[1], "open")?;
        let high = parse_string_f64(&arr[2], "high")?;
        let low = parse_string_f64(&arr[3], "low")?;
        let close = parse_string_f64(&arr[4], "close")?;
        let volume = parse_string_f64(&arr[5], "volume")?;

        Ok(Self::new(time, open, high, low, close, volume))
    }
}

/// `(to - from) / from * 100`, or `None` when `from` is zero.
pub fn percent_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        return None;
    }
    let v = (to - from) / from * 100.0;
    v.is_finite().then_some(v)
}

/// Sort candles by open time, oldest first. Stable for equal timestamps.
pub fn sort_by_time(candles: &mut [Candle]) {
    candles.sort_by_key(|c| c.time);
}

/// Binance sends numeric values as JSON strings; accept plain numbers too.
pub fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_and_volatility() {
        let c = Candle::new(0, 100.0, 110.0, 95.0, 105.0, 1.0);
        assert!((c.change().unwrap() - 5.0).abs() < 1e-12);
        assert!((c.volatility().unwrap() - 15.0 / 95.0 * 100.0).abs() < 1e-12);
    }

    #[test]
    fn zero_low_yields_no_volatility() {
        let c = Candle::new(0, 1.0, 2.0, 0.0, 1.5, 1.0);
        assert_eq!(c.volatility(), None);
    }

    #[test]
    fn zero_open_yields_no_change() {
        let c = Candle::new(0, 0.0, 2.0, 0.0, 1.5, 1.0);
        assert_eq!(c.change(), None);
    }

    #[test]
    fn parse_kline_row_ok() {
        let row: serde_json::Value = serde_json::from_str(
            r#"[1700000000000, "37000.00", "37500.00", "36800.00", "37200.00", "1234.5",
                1700086399999, "0", 100, "0", "0", "0"]"#,
        )
        .unwrap();
        let c = Candle::from_kline_row(&row).expect("should parse");
        assert_eq!(c.time, 1_700_000_000_000);
        assert!((c.open - 37000.0).abs() < f64::EPSILON);
        assert!((c.high - 37500.0).abs() < f64::EPSILON);
        assert!((c.low - 36800.0).abs() < f64::EPSILON);
        assert!((c.close - 37200.0).abs() < f64::EPSILON);
        assert!((c.volume - 1234.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_kline_row_rejects_short_rows() {
        let row = serde_json::json!([1, "1", "2"]);
        assert!(Candle::from_kline_row(&row).is_err());
    }

    #[test]
    fn parse_kline_row_rejects_garbage_numbers() {
        let row = serde_json::json!([1, "abc", "2", "1", "1", "1"]);
        assert!(Candle::from_kline_row(&row).is_err());
    }

    #[test]
    fn sort_by_time_orders_ascending() {
        let mut cs = vec![
            Candle::new(3, 1.0, 1.0, 1.0, 1.0, 0.0),
            Candle::new(1, 1.0, 1.0, 1.0, 1.0, 0.0),
            Candle::new(2, 1.0, 1.0, 1.0, 1.0, 0.0),
        ];
        sort_by_time(&mut cs);
        assert_eq!(cs.iter().map(|c| c.time).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
