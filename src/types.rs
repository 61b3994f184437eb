// =============================================================================
// Shared types used across the seasonality explorer
// =============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Calendar granularity used to bucket candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::Daily
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Self::Daily),
            "weekly" | "week" | "w" => Ok(Self::Weekly),
            "monthly" | "month" | "m" => Ok(Self::Monthly),
            other => anyhow::bail!("unknown timeframe '{other}' (expected daily, weekly or monthly)"),
        }
    }
}

/// Which bucket metric drives the chart series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Volatility,
    Volume,
    Change,
}

impl Default for Metric {
    fn default() -> Self {
        Self::Volatility
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volatility => write!(f, "volatility"),
            Self::Volume => write!(f, "volume"),
            Self::Change => write!(f, "change"),
        }
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volatility" => Ok(Self::Volatility),
            "volume" => Ok(Self::Volume),
            "change" => Ok(Self::Change),
            other => anyhow::bail!("unknown metric '{other}' (expected volatility, volume or change)"),
        }
    }
}

/// Coarse volatility classification used to colour calendar cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityBand {
    Low,
    Medium,
    High,
    /// Volatility could not be computed (zero low price).
    Unknown,
}

impl VolatilityBand {
    /// Classify `volatility` (percent) against the medium/high thresholds.
    /// Values equal to a threshold fall into the lower band.
    pub fn classify(volatility: Option<f64>, medium_above: f64, high_above: f64) -> Self {
        match volatility {
            Some(v) if v.is_finite() => {
                if v > high_above {
                    Self::High
                } else if v > medium_above {
                    Self::Medium
                } else {
                    Self::Low
                }
            }
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for VolatilityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}
