//! Run manifest export (JSON).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use valuelab_core::data::DataSource;
use valuelab_core::engine::StatsRecord;

use crate::config::RunConfig;
use crate::runner::BacktestReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub config: RunConfig,
    pub stats: StatsRecord,
    pub benchmark_stats: StatsRecord,
    pub last_holdings: Vec<String>,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub sources: BTreeMap<String, DataSource>,
}

impl RunManifest {
    pub fn from_report(report: &BacktestReport) -> Self {
        Self {
            schema_version: report.schema_version,
            run_id: report.run_id.clone(),
            timestamp: report.metadata.timestamp,
            duration_secs: report.metadata.duration_secs,
            config: report.config.clone(),
            stats: report.output.stats.clone(),
            benchmark_stats: report.output.benchmark_stats.clone(),
            last_holdings: report.output.last_holdings().to_vec(),
            dataset_hash: report.dataset_hash.clone(),
            has_synthetic: report.has_synthetic,
            sources: report.sources.clone(),
        }
    }
}

pub fn write_manifest(path: &Path, report: &BacktestReport) -> Result<()> {
    let json = serde_json::to_string_pretty(&RunManifest::from_report(report))
        .context("Failed to serialize run manifest")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
    Ok(())
}
