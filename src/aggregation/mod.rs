// =============================================================================
// Period Aggregation: daily / weekly / monthly buckets
// =============================================================================
//
// Groups a flat candle series into calendar buckets (UTC) and derives the
// per-bucket metrics shown in the calendar:
//
//   open       = open of the first candle in the bucket (arrival order)
//   close      = close of the last candle in the bucket (arrival order)
//   high / low = extrema over the bucket
//   volume     = sum over the bucket
//   change     = (close - open) / open * 100, from the bucket's own open/close
//   volatility = mean of the per-candle volatility percentages
//
// Buckets come out in the order their key is first seen, so an ascending
// input series gives chronological buckets. Sorting is the caller's job.
// =============================================================================

pub mod calendar;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::market_data::candle::{percent_change, Candle};
use crate::types::Timeframe;

/// One calendar period summarising one or more candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBucket {
    pub timeframe: Timeframe,
    /// First instant of the period (inclusive).
    pub period_start: DateTime<Utc>,
    /// Last millisecond of the period (inclusive).
    pub period_end: DateTime<Utc>,
    /// Open time of the first candle in the bucket, ms since epoch.
    pub time: i64,
    /// Open time of the last candle in the bucket, ms since epoch.
    pub last_time: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    /// `None` when the bucket open is zero.
    pub change: Option<f64>,
    /// `None` when any constituent candle has a zero low.
    pub volatility: Option<f64>,
    pub candle_count: usize,
}

/// Inclusive `(start, end)` bounds of the `timeframe` period containing
/// `time_ms`, or `None` if the timestamp is outside chrono's range.
pub fn period_bounds(time_ms: i64, timeframe: Timeframe) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let date = DateTime::<Utc>::from_timestamp_millis(time_ms)?.date_naive();

    let (first, last) = match timeframe {
        Timeframe::Daily => (date, date),
        Timeframe::Weekly => {
            let back = u64::from(date.weekday().num_days_from_sunday());
            let sunday = date.checked_sub_days(Days::new(back))?;
            (sunday, sunday.checked_add_days(Days::new(6))?)
        }
        Timeframe::Monthly => {
            let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
            let next = first.checked_add_months(chrono::Months::new(1))?;
            (first, next.pred_opt()?)
        }
    };

    let start_of_day = NaiveTime::from_hms_opt(0, 0, 0)?;
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;
    Some((
        first.and_time(start_of_day).and_utc(),
        last.and_time(end_of_day).and_utc(),
    ))
}

/// Group `candles` into `timeframe` buckets.
///
/// Candles whose timestamp cannot be represented as a calendar date are
/// skipped. Empty input yields an empty vec.
pub fn group_by_period(candles: &[Candle], timeframe: Timeframe) -> Vec<AggregatedBucket> {
    let mut groups: IndexMap<DateTime<Utc>, (DateTime<Utc>, Vec<&Candle>)> = IndexMap::new();

    for candle in candles {
        let Some((start, end)) = period_bounds(candle.time, timeframe) else {
            continue;
        };
        groups
            .entry(start)
            .or_insert_with(|| (end, Vec::new()))
            .1
            .push(candle);
    }

    groups
        .into_iter()
        .filter_map(|(start, (end, members))| build_bucket(timeframe, start, end, &members))
        .collect()
}

fn build_bucket(
    timeframe: Timeframe,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    members: &[&Candle],
) -> Option<AggregatedBucket> {
    let first = members.first()?;
    let last = members.last()?;

    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    let mut volume = 0.0;
    let mut volatility_sum = Some(0.0);

    for c in members {
        high = high.max(c.high);
        low = low.min(c.low);
        volume += c.volume;
        volatility_sum = match (volatility_sum, c.volatility()) {
            (Some(sum), Some(v)) => Some(sum + v),
            _ => None,
        };
    }

    let count = members.len();
    Some(AggregatedBucket {
        timeframe,
        period_start,
        period_end,
        time: first.time,
        last_time: last.time,
        open: first.open,
        close: last.close,
        high,
        low,
        volume,
        change: percent_change(first.open, last.close),
        volatility: volatility_sum.map(|sum| sum / count as f64),
        candle_count: count,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DAY_MS: i64 = 86_400_000;

    fn ms(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().timestamp_millis()
    }

    fn candle(time: i64, open: f64, close: f64, volume: f64) -> Candle {
        let high = open.max(close) + 1.0;
        let low = open.min(close) - 1.0;
        Candle::new(time, open, high, low, close, volume)
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        for tf in [Timeframe::Daily, Timeframe::Weekly, Timeframe::Monthly] {
            assert!(group_by_period(&[], tf).is_empty());
        }
    }

    #[test]
    fn daily_partitions_every_candle_exactly_once() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| candle(ms(2024, 1, 1) + i * DAY_MS, 100.0 + i as f64, 101.0, 1.0))
            .collect();
        let buckets = group_by_period(&candles, Timeframe::Daily);
        assert_eq!(buckets.len(), candles.len());
        assert_eq!(buckets.iter().map(|b| b.candle_count).sum::<usize>(), candles.len());
        for (b, c) in buckets.iter().zip(&candles) {
            assert_eq!(b.time, c.time);
            assert_eq!(b.open, c.open);
            assert_eq!(b.close, c.close);
        }
    }

    #[test]
    fn intraday_candles_share_a_daily_bucket() {
        let base = ms(2024, 3, 5);
        let candles = vec![
            candle(base, 100.0, 102.0, 1.0),
            candle(base + 3_600_000, 102.0, 99.0, 2.0),
            candle(base + DAY_MS, 99.0, 98.0, 3.0),
        ];
        let buckets = group_by_period(&candles, Timeframe::Daily);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].candle_count, 2);
        assert_eq!(buckets[1].candle_count, 1);
    }

    #[test]
    fn bucket_open_close_and_change() {
        let base = ms(2024, 3, 5);
        let candles = vec![
            candle(base, 100.0, 102.0, 1.0),
            candle(base + 3_600_000, 102.0, 99.0, 1.0),
        ];
        let b = &group_by_period(&candles, Timeframe::Daily)[0];
        assert_eq!(b.open, 100.0);
        assert_eq!(b.close, 99.0);
        assert!((b.change.unwrap() - -1.0).abs() < 1e-12);
        assert_eq!(b.high, 103.0);
        assert_eq!(b.low, 98.0);
    }

    #[test]
    fn volatility_is_mean_of_candle_volatility() {
        let base = ms(2024, 3, 5);
        let candles = vec![
            Candle::new(base, 100.0, 110.0, 100.0, 105.0, 1.0), // 10 %
            Candle::new(base + 1, 100.0, 130.0, 100.0, 105.0, 1.0), // 30 %
        ];
        let b = &group_by_period(&candles, Timeframe::Daily)[0];
        assert!((b.volatility.unwrap() - 20.0).abs() < 1e-12);
        // Not recomputed from the bucket's own range.
        assert_ne!(b.volatility, candles[1].volatility());
    }

    #[test]
    fn weekly_sums_volume_within_sunday_week() {
        // 2024-06-09 is a Sunday.
        let candles = vec![
            candle(ms(2024, 6, 10), 100.0, 101.0, 10.0),
            candle(ms(2024, 6, 11), 101.0, 102.0, 20.0),
            candle(ms(2024, 6, 12), 102.0, 103.0, 30.0),
        ];
        let buckets = group_by_period(&candles, Timeframe::Weekly);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].volume, 60.0);
        assert_eq!(buckets[0].period_start.timestamp_millis(), ms(2024, 6, 9));
        assert_eq!(
            buckets[0].period_end.timestamp_millis(),
            ms(2024, 6, 16) - 1
        );
    }

    #[test]
    fn weekly_splits_on_sunday() {
        // Saturday 2024-06-15 and Sunday 2024-06-16 land in different weeks.
        let candles = vec![
            candle(ms(2024, 6, 15), 100.0, 101.0, 1.0),
            candle(ms(2024, 6, 16), 101.0, 102.0, 1.0),
        ];
        assert_eq!(group_by_period(&candles, Timeframe::Weekly).len(), 2);
    }

    #[test]
    fn monthly_bounds_cover_whole_month() {
        let candles = vec![
            candle(ms(2024, 2, 1), 100.0, 101.0, 1.0),
            candle(ms(2024, 2, 29), 101.0, 102.0, 1.0),
            candle(ms(2024, 3, 1), 102.0, 103.0, 1.0),
        ];
        let buckets = group_by_period(&candles, Timeframe::Monthly);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].candle_count, 2);
        assert_eq!(buckets[0].period_start.timestamp_millis(), ms(2024, 2, 1));
        assert_eq!(buckets[0].period_end.timestamp_millis(), ms(2024, 3, 1) - 1);
        assert_eq!(buckets[0].last_time, ms(2024, 2, 29));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let (start, end) = period_bounds(ms(2023, 12, 15), Timeframe::Monthly).unwrap();
        assert_eq!(start.timestamp_millis(), ms(2023, 12, 1));
        assert_eq!(end.timestamp_millis(), ms(2024, 1, 1) - 1);
    }

    #[test]
    fn buckets_follow_first_seen_order() {
        let candles = vec![
            candle(ms(2024, 5, 2), 100.0, 101.0, 1.0),
            candle(ms(2024, 4, 2), 90.0, 91.0, 1.0),
            candle(ms(2024, 5, 3), 101.0, 102.0, 1.0),
        ];
        let buckets = group_by_period(&candles, Timeframe::Monthly);
        assert_eq!(buckets[0].period_start.month(), 5);
        assert_eq!(buckets[1].period_start.month(), 4);
        // Arrival order inside the bucket decides open / close.
        assert_eq!(buckets[0].open, 100.0);
        assert_eq!(buckets[0].close, 102.0);
    }

    #[test]
    fn zero_open_gives_no_change() {
        let candles = vec![Candle::new(ms(2024, 1, 1), 0.0, 1.0, 0.5, 1.0, 1.0)];
        let b = &group_by_period(&candles, Timeframe::Daily)[0];
        assert_eq!(b.change, None);
    }

    #[test]
    fn zero_low_gives_no_volatility() {
        let candles = vec![
            Candle::new(ms(2024, 1, 1), 1.0, 2.0, 0.0, 1.5, 1.0),
            Candle::new(ms(2024, 1, 1) + 1, 1.5, 2.0, 1.0, 1.8, 1.0),
        ];
        let b = &group_by_period(&candles, Timeframe::Daily)[0];
        assert_eq!(b.volatility, None);
        assert!(b.change.is_some());
    }

    #[test]
    fn grouping_is_idempotent() {
        let candles: Vec<Candle> = (0..90)
            .map(|i| candle(ms(2024, 1, 1) + i * DAY_MS, 100.0 + (i % 7) as f64 * 0.37, 101.3, 0.1 * i as f64))
            .collect();
        for tf in [Timeframe::Daily, Timeframe::Weekly, Timeframe::Monthly] {
            let a = group_by_period(&candles, tf);
            let b = group_by_period(&candles, tf);
            assert_eq!(a, b);
            for (x, y) in a.iter().zip(&b) {
                assert_eq!(x.volume.to_bits(), y.volume.to_bits());
                assert_eq!(
                    x.volatility.map(f64::to_bits),
                    y.volatility.map(f64::to_bits)
                );
            }
        }
    }
}
