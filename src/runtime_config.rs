// =============================================================================
// Runtime Configuration: explorer settings with atomic save
// =============================================================================
//
// Every tunable parameter lives here. Persistence uses an atomic tmp + rename
// pattern to prevent corruption on crash. All fields carry `#[serde(default)]`
// so that adding new fields never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregation::calendar::CellThresholds;
use crate::indicators::IndicatorPeriods;
use crate::types::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_interval() -> String {
    "1d".to_string()
}

fn default_history_limit() -> u32 {
    365
}

fn default_indicator_limit() -> u32 {
    50
}

fn default_sma_short() -> usize {
    10
}

fn default_sma_long() -> usize {
    20
}

fn default_rsi_period() -> usize {
    14
}

fn default_volatility_medium() -> f64 {
    20.0
}

fn default_volatility_high() -> f64 {
    50.0
}

fn default_volume_alert() -> f64 {
    4000.0
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_rest_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_ws_base_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

// =============================================================================
// ExplorerConfig
// =============================================================================

/// Top-level configuration for the explorer service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    // --- Market selection ---------------------------------------------------

    /// Symbol shown on startup.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Symbols offered by the symbol picker.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Kline interval of the base series.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Number of candles fetched for the calendar.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Number of daily closes fetched for the indicator panel.
    #[serde(default = "default_indicator_limit")]
    pub indicator_limit: u32,

    /// Timeframe used when a request does not specify one.
    #[serde(default)]
    pub default_timeframe: Timeframe,

    // --- Indicators ---------------------------------------------------------

    #[serde(default = "default_sma_short")]
    pub sma_short_period: usize,

    #[serde(default = "default_sma_long")]
    pub sma_long_period: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    // --- Calendar cell thresholds -------------------------------------------

    /// Volatility (%) above which a cell is Medium.
    #[serde(default = "default_volatility_medium")]
    pub volatility_medium_above: f64,

    /// Volatility (%) above which a cell is High.
    #[serde(default = "default_volatility_high")]
    pub volatility_high_above: f64,

    /// Bucket volume above which a cell raises an alert.
    #[serde(default = "default_volume_alert")]
    pub volume_alert_above: f64,

    // --- Endpoints ----------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            symbols: default_symbols(),
            interval: default_interval(),
            history_limit: default_history_limit(),
            indicator_limit: default_indicator_limit(),
            default_timeframe: Timeframe::Daily,
            sma_short_period: default_sma_short(),
            sma_long_period: default_sma_long(),
            rsi_period: default_rsi_period(),
            volatility_medium_above: default_volatility_medium(),
            volatility_high_above: default_volatility_high(),
            volume_alert_above: default_volume_alert(),
            bind_addr: default_bind_addr(),
            rest_base_url: default_rest_base_url(),
            ws_base_url: default_ws_base_url(),
        }
    }
}

impl ExplorerConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read explorer config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse explorer config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            interval = %config.interval,
            "explorer config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise explorer config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "explorer config saved (atomic)");
        Ok(())
    }

    /// Apply `EXPLORER_SYMBOL` / `EXPLORER_BIND_ADDR` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(sym) = lookup("EXPLORER_SYMBOL") {
            let sym = sym.trim().to_uppercase();
            if !sym.is_empty() {
                self.symbol = sym;
            }
        }
        if let Some(addr) = lookup("EXPLORER_BIND_ADDR") {
            let addr = addr.trim().to_string();
            if !addr.is_empty() {
                self.bind_addr = addr;
            }
        }
        if !self.offers(&self.symbol) {
            self.symbols.push(self.symbol.clone());
        }
    }

    /// Whether `symbol` is one of the offered symbols (case-insensitive).
    pub fn offers(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }

    pub fn indicator_periods(&self) -> IndicatorPeriods {
        IndicatorPeriods {
            sma_short: self.sma_short_period,
            sma_long: self.sma_long_period,
            rsi: self.rsi_period,
        }
    }

    pub fn cell_thresholds(&self) -> CellThresholds {
        CellThresholds {
            volatility_medium_above: self.volatility_medium_above,
            volatility_high_above: self.volatility_high_above,
            volume_alert_above: self.volume_alert_above,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = ExplorerConfig::default();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.symbols.len(), 5);
        assert_eq!(cfg.interval, "1d");
        assert_eq!(cfg.history_limit, 365);
        assert_eq!(cfg.indicator_limit, 50);
        assert_eq!(cfg.default_timeframe, Timeframe::Daily);
        assert_eq!(cfg.indicator_periods(), IndicatorPeriods::default());
        assert_eq!(cfg.cell_thresholds(), CellThresholds::default());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: ExplorerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.rsi_period, 14);
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbol": "ETHUSDT", "default_timeframe": "weekly", "rsi_period": 7 }"#;
        let cfg: ExplorerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol, "ETHUSDT");
        assert_eq!(cfg.default_timeframe, Timeframe::Weekly);
        assert_eq!(cfg.rsi_period, 7);
        assert_eq!(cfg.sma_long_period, 20);
    }

    #[test]
    fn env_overrides_symbol_and_bind_addr() {
        let mut cfg = ExplorerConfig::default();
        cfg.apply_env(|k| match k {
            "EXPLORER_SYMBOL" => Some(" adausdt ".to_string()),
            "EXPLORER_BIND_ADDR" => Some("127.0.0.1:9000".to_string()),
            _ => None,
        });
        assert_eq!(cfg.symbol, "ADAUSDT");
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert!(cfg.symbols.contains(&"ADAUSDT".to_string()));
    }

    #[test]
    fn offers_is_case_insensitive() {
        let cfg = ExplorerConfig::default();
        assert!(cfg.offers("ethusdt"));
        assert!(cfg.offers("SOLUSDT"));
        assert!(!cfg.offers("DOGEUSDT"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = ExplorerConfig::default();
        cfg.apply_env(|_| Some("   ".to_string()));
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("explorer-config-{}.json", std::process::id()));
        let mut cfg = ExplorerConfig::default();
        cfg.symbol = "SOLUSDT".into();
        cfg.save(&path).unwrap();

        let loaded = ExplorerConfig::load(&path).unwrap();
        assert_eq!(loaded.symbol, "SOLUSDT");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_missing_file_is_error() {
        assert!(ExplorerConfig::load("/definitely/not/here.json").is_err());
    }
}
