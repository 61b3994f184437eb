// =============================================================================
// Calendar View: month paging, range selection, cell annotations
// =============================================================================

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::AggregatedBucket;
use crate::types::{Metric, VolatilityBand};

// ---------------------------------------------------------------------------
// Month paging
// ---------------------------------------------------------------------------

/// A calendar page: one UTC month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCursor {
    pub year: i32,
    /// 1-based month.
    pub month: u32,
}

impl MonthCursor {
    /// Returns `None` for a month outside `1..=12`.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month containing `time_ms`.
    pub fn containing(time_ms: i64) -> Option<Self> {
        let dt = DateTime::<Utc>::from_timestamp_millis(time_ms)?;
        Some(Self {
            year: dt.year(),
            month: dt.month(),
        })
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { month: self.month + 1, ..self }
        }
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { month: self.month - 1, ..self }
        }
    }

    pub fn contains(&self, time_ms: i64) -> bool {
        Self::containing(time_ms).is_some_and(|m| m == *self)
    }
}

impl std::fmt::Display for MonthCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Buckets whose first candle falls inside `month`, in input order.
pub fn filter_month(buckets: &[AggregatedBucket], month: MonthCursor) -> Vec<AggregatedBucket> {
    buckets
        .iter()
        .filter(|b| month.contains(b.time))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Range selection
// ---------------------------------------------------------------------------

/// Two-click date range over bucket times.
///
/// The first click sets the start; the second sets the end (swapping if it is
/// earlier than the start); a click on a complete range starts over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSelection {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl RangeSelection {
    pub fn select(&mut self, time_ms: i64) {
        match (self.start, self.end) {
            (Some(start), None) => {
                if time_ms < start {
                    self.end = Some(start);
                    self.start = Some(time_ms);
                } else {
                    self.end = Some(time_ms);
                }
            }
            _ => {
                self.start = Some(time_ms);
                self.end = None;
            }
        }
    }

    /// Whether `time_ms` is inside the range; open-ended while no end is set.
    pub fn contains(&self, time_ms: i64) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= time_ms && time_ms <= end,
            (Some(start), None) => start <= time_ms,
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Cell annotations
// ---------------------------------------------------------------------------

/// Thresholds used to annotate calendar cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellThresholds {
    pub volatility_medium_above: f64,
    pub volatility_high_above: f64,
    pub volume_alert_above: f64,
}

impl Default for CellThresholds {
    fn default() -> Self {
        Self {
            volatility_medium_above: 20.0,
            volatility_high_above: 50.0,
            volume_alert_above: 4000.0,
        }
    }
}

/// A bucket plus the presentation flags the calendar grid needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarCell {
    #[serde(flatten)]
    pub bucket: AggregatedBucket,
    pub band: VolatilityBand,
    pub volume_alert: bool,
    pub in_range: bool,
}

pub fn annotate(
    buckets: &[AggregatedBucket],
    thresholds: &CellThresholds,
    range: &RangeSelection,
) -> Vec<CalendarCell> {
    buckets
        .iter()
        .map(|b| CalendarCell {
            band: VolatilityBand::classify(
                b.volatility,
                thresholds.volatility_medium_above,
                thresholds.volatility_high_above,
            ),
            volume_alert: b.volume > thresholds.volume_alert_above,
            in_range: range.contains(b.time),
            bucket: b.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Chart series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub time: i64,
    pub value: Option<f64>,
}

/// One `(time, value)` point per bucket for the selected metric.
pub fn metric_series(buckets: &[AggregatedBucket], metric: Metric) -> Vec<MetricPoint> {
    buckets
        .iter()
        .map(|b| MetricPoint {
            time: b.time,
            value: match metric {
                Metric::Volatility => b.volatility,
                Metric::Volume => Some(b.volume),
                Metric::Change => b.change,
            },
        })
        .collect()
}
