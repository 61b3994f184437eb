// =============================================================================
// CSV Export: flat dump of aggregated buckets
// =============================================================================

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;

use crate::aggregation::AggregatedBucket;

/// Column order of the exported file.
pub const CSV_COLUMNS: [&str; 8] = [
    "time",
    "open",
    "close",
    "high",
    "low",
    "volume",
    "change",
    "volatility",
];

/// One exported row. Field order is the column order.
#[derive(Debug, Serialize)]
struct CsvRow {
    time: i64,
    open: f64,
    close: f64,
    high: f64,
    low: f64,
    volume: f64,
    /// `NaN` when undefined.
    change: f64,
    /// `NaN` when undefined.
    volatility: f64,
}

impl From<&AggregatedBucket> for CsvRow {
    fn from(b: &AggregatedBucket) -> Self {
        Self {
            time: b.time,
            open: b.open,
            close: b.close,
            high: b.high,
            low: b.low,
            volume: b.volume,
            change: b.change.unwrap_or(f64::NAN),
            volatility: b.volatility.unwrap_or(f64::NAN),
        }
    }
}

/// Render `buckets` as CSV text: a header line, then one row per bucket.
pub fn buckets_to_csv(buckets: &[AggregatedBucket]) -> Result<String> {
    // The header is written explicitly so an empty export still carries it.
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(64 + buckets.len() * 96));

    writer
        .write_record(CSV_COLUMNS)
        .context("failed to write CSV header")?;

    for bucket in buckets {
        writer
            .serialize(CsvRow::from(bucket))
            .with_context(|| format!("failed to write CSV row for bucket {}", bucket.time))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV writer: {e}"))?;

    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}
