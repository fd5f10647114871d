//! Serializable run configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid config. Values
//! are checked by [`RunConfig::validate`] before any data is loaded.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use valuelab_core::engine::{BacktestParams, RebalanceAnchor, RebalanceFrequency, MAX_TOP_N};
use valuelab_core::valuation::{parse_peer_pes, ValuationParams};

/// Unique identifier for a run (content-addressable hash of its config).
pub type RunId = String;

pub const MAX_PROJECTION_YEARS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RunConfig {
    pub data: DataConfig,
    pub strategy: StrategyConfig,
    pub valuation: ValuationConfig,
}

/// Where prices come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Cache first, then the Yahoo chart API.
    #[default]
    Yahoo,
    /// A long-format CSV file.
    Csv,
    /// Deterministic synthetic walks only.
    Synthetic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Yahoo => write!(f, "yahoo"),
            SourceKind::Csv => write!(f, "csv"),
            SourceKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yahoo" | "yfinance" => Ok(SourceKind::Yahoo),
            "csv" => Ok(SourceKind::Csv),
            "synthetic" => Ok(SourceKind::Synthetic),
            other => Err(format!(
                "unknown data source '{other}' (expected yahoo, csv or synthetic)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub source: SourceKind,
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    /// Inclusive. `None` means today.
    pub end_date: Option<NaiveDate>,
    pub csv_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    /// Never touch the network.
    pub offline: bool,
    /// Generate synthetic prices for symbols with no real data.
    pub allow_synthetic: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Yahoo,
            tickers: vec!["AAPL".into(), "MSFT".into(), "AMD".into()],
            start_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            end_date: None,
            csv_path: None,
            cache_dir: PathBuf::from("data"),
            offline: false,
            allow_synthetic: false,
        }
    }
}

impl DataConfig {
    pub fn resolved_end(&self) -> NaiveDate {
        self.end_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub top_n: usize,
    pub rebalance: RebalanceFrequency,
    pub anchor: RebalanceAnchor,
    /// Annual, as a fraction (0.04 = 4%).
    pub risk_free_annual: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let params = BacktestParams::default();
        Self {
            top_n: params.top_n,
            rebalance: params.rebalance,
            anchor: params.anchor,
            risk_free_annual: params.risk_free_annual,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValuationConfig {
    #[serde(flatten)]
    pub params: ValuationParams,
    /// `TICKER:PE` pairs separated by commas.
    pub peer_pes: String,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            params: ValuationParams::default(),
            peer_pes: "AAPL:25,MSFT:30,AMD:40".into(),
        }
    }
}

impl RunConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject configurations the engine must never see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strategy;
        if s.top_n == 0 || s.top_n > MAX_TOP_N {
            return Err(invalid(
                "strategy.top_n",
                format!("must be between 1 and {MAX_TOP_N}, got {}", s.top_n),
            ));
        }
        if !s.risk_free_annual.is_finite() {
            return Err(invalid("strategy.risk_free_annual", "must be finite"));
        }

        let v = &self.valuation.params;
        if v.projection_years == 0 || v.projection_years > MAX_PROJECTION_YEARS {
            return Err(invalid(
                "valuation.projection_years",
                format!(
                    "must be between 1 and {MAX_PROJECTION_YEARS}, got {}",
                    v.projection_years
                ),
            ));
        }
        for (field, value) in [
            ("valuation.discount_rate", v.discount_rate),
            ("valuation.terminal_growth", v.terminal_growth),
            ("valuation.growth_rate", v.growth_rate),
            ("valuation.fcf_yield", v.fcf_yield),
            ("valuation.eps_yield", v.eps_yield),
        ] {
            if !value.is_finite() {
                return Err(invalid(field, "must be finite"));
            }
        }

        let d = &self.data;
        match d.source {
            SourceKind::Csv if d.csv_path.is_none() => {
                return Err(invalid("data.csv_path", "required when data.source = \"csv\""));
            }
            SourceKind::Yahoo | SourceKind::Synthetic
                if d.tickers.iter().all(|t| t.trim().is_empty()) =>
            {
                return Err(invalid("data.tickers", "at least one ticker is required"));
            }
            _ => {}
        }
        if d.start_date >= d.resolved_end() {
            return Err(invalid(
                "data.start_date",
                format!("{} is not before end date {}", d.start_date, d.resolved_end()),
            ));
        }
        Ok(())
    }

    /// Deterministic hash ID: identical configs share a run ID.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    /// Copy with `end_date` pinned, so the run ID does not drift with the clock.
    pub fn pinned(&self) -> Self {
        let mut pinned = self.clone();
        pinned.data.end_date = Some(self.data.resolved_end());
        pinned
    }

    pub fn backtest_params(&self) -> BacktestParams {
        BacktestParams {
            top_n: self.strategy.top_n,
            rebalance: self.strategy.rebalance,
            anchor: self.strategy.anchor,
            risk_free_annual: self.strategy.risk_free_annual,
        }
    }

    pub fn peer_pes(&self) -> BTreeMap<String, f64> {
        parse_peer_pes(&self.valuation.peer_pes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn pinned_default() -> RunConfig {
        let mut config = RunConfig::default();
        config.data.end_date = Some(d(2024, 12, 31));
        config
    }

    #[test]
    fn empty_toml_is_default_config() {
        let config = RunConfig::from_toml("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.strategy.top_n, 5);
        assert_eq!(config.data.start_date, d(2018, 1, 1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_document() {
        let toml = r#"
            [data]
            source = "csv"
            csv_path = "prices.csv"
            start_date = "2020-01-01"
            end_date = "2023-06-30"

            [strategy]
            top_n = 3
            rebalance = "quarterly"
            anchor = "period_end"
            risk_free_annual = 0.02

            [valuation]
            discount_rate = 0.1
            projection_years = 7
            peer_pes = "AAPL:20"
        "#;
        let config = RunConfig::from_toml(toml).unwrap();

        assert_eq!(config.data.source, SourceKind::Csv);
        assert_eq!(config.data.csv_path, Some(PathBuf::from("prices.csv")));
        assert_eq!(config.strategy.rebalance, RebalanceFrequency::Quarterly);
        assert_eq!(config.strategy.anchor, RebalanceAnchor::PeriodEnd);
        assert_eq!(config.valuation.params.discount_rate, 0.1);
        assert_eq!(config.valuation.params.terminal_growth, 0.02);
        assert_eq!(config.valuation.params.projection_years, 7);
        assert_eq!(config.peer_pes().get("AAPL"), Some(&20.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_rebalance_is_parse_error() {
        let err = RunConfig::from_toml("[strategy]\nrebalance = \"weekly\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut c = pinned_default();
        c.strategy.top_n = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid { field: "strategy.top_n", .. })));

        let mut c = pinned_default();
        c.strategy.top_n = 21;
        assert!(c.validate().is_err());

        let mut c = pinned_default();
        c.valuation.params.projection_years = 11;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "valuation.projection_years", .. })
        ));

        let mut c = pinned_default();
        c.valuation.params.discount_rate = f64::INFINITY;
        assert!(c.validate().is_err());

        let mut c = pinned_default();
        c.data.source = SourceKind::Csv;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "data.csv_path", .. })
        ));

        let mut c = pinned_default();
        c.data.start_date = d(2025, 1, 1);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "data.start_date", .. })
        ));

        let mut c = pinned_default();
        c.data.tickers = vec![" ".into()];
        assert!(c.validate().is_err());
    }

    #[test]
    fn run_id_is_deterministic_and_parameter_sensitive() {
        let a = pinned_default();
        assert_eq!(a.run_id(), a.clone().run_id());
        assert_eq!(a.run_id().len(), 64);

        let mut b = a.clone();
        b.strategy.top_n = 6;
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn pinned_fixes_end_date() {
        let config = RunConfig::default();
        let pinned = config.pinned();
        assert_eq!(pinned.data.end_date, Some(config.data.resolved_end()));
    }

    #[test]
    fn toml_round_trip() {
        let config = pinned_default();
        let text = config.to_toml().unwrap();
        assert_eq!(RunConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn source_kind_parses_aliases() {
        assert_eq!("yfinance".parse::<SourceKind>(), Ok(SourceKind::Yahoo));
        assert_eq!("CSV".parse::<SourceKind>(), Ok(SourceKind::Csv));
        assert!("bloomberg".parse::<SourceKind>().is_err());
    }
}
