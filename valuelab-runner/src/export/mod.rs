//! Artifact manager for persisting run outputs.
//!
//! Layout per run: `{output_dir}/{run_id}/` holding `manifest.json`,
//! `daily.csv`, `scores.csv`, `rebalances.csv` and `report.md`.

mod manifest;
mod markdown;
mod tables;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::runner::BacktestReport;
use crate::sweep::SweepResults;

pub use manifest::RunManifest;
pub use markdown::render_report;

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub run_dir: PathBuf,
    pub manifest: PathBuf,
    pub daily_csv: PathBuf,
    pub scores_csv: PathBuf,
    pub rebalances_csv: PathBuf,
    pub report_markdown: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactManager {
    output_dir: PathBuf,
}

impl ArtifactManager {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .context("Failed to create artifact output directory")?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save complete run artifacts.
    pub fn save_run(&self, report: &BacktestReport) -> Result<ArtifactPaths> {
        let run_dir = self.output_dir.join(&report.run_id);
        std::fs::create_dir_all(&run_dir).context("Failed to create run artifact directory")?;

        let manifest = run_dir.join("manifest.json");
        manifest::write_manifest(&manifest, report)?;

        let daily_csv = run_dir.join("daily.csv");
        tables::write_daily_csv(&daily_csv, &report.output.daily)?;

        let scores_csv = run_dir.join("scores.csv");
        tables::write_scores_csv(&scores_csv, &report.scores)?;

        let rebalances_csv = run_dir.join("rebalances.csv");
        tables::write_rebalances_csv(&rebalances_csv, &report.output.rebalances)?;

        let report_markdown = run_dir.join("report.md");
        std::fs::write(&report_markdown, render_report(report))
            .with_context(|| format!("Failed to write report to {}", report_markdown.display()))?;

        Ok(ArtifactPaths {
            run_dir,
            manifest,
            daily_csv,
            scores_csv,
            rebalances_csv,
            report_markdown,
        })
    }

    /// Save a sweep summary as `sweep.csv`, plus every run's own artifacts.
    pub fn save_sweep(&self, results: &SweepResults) -> Result<PathBuf> {
        for report in results.all() {
            self.save_run(report)?;
        }
        let path = self.output_dir.join("sweep.csv");
        tables::write_sweep_csv(&path, &results.entries())?;
        Ok(path)
    }
}
