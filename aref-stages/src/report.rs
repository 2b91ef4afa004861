//! Report emitter
//!
//! Writes `<target>_report.json` (`{target, recon}`) into the reports
//! directory. Verbose runs also write a CSV (`Section,Data` rows, one per
//! stage) and a minimal HTML page.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use aref_core::{AggregateRecord, Target};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to build CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub verbose: bool,
}

/// What an emitter wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub dir: PathBuf,
    pub target: String,
    pub formats: Vec<&'static str>,
}

impl ReportSummary {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.formats
            .iter()
            .map(|ext| self.dir.join(format!("{}_report.{}", self.target, ext)))
            .collect()
    }

    /// `Report saved to reports/<target>_report.json|csv|html`
    pub fn status_line(&self) -> String {
        format!(
            "Report saved to {}",
            self.dir
                .join(format!("{}_report.{}", self.target, self.formats.join("|")))
                .display()
        )
    }
}

/// Renders the aggregate record for one target
#[async_trait]
pub trait ReportEmitter: Send + Sync {
    async fn emit(
        &self,
        target: &Target,
        record: &AggregateRecord,
        options: ReportOptions,
    ) -> Result<ReportSummary, ReportError>;
}

/// Writes report files into a directory
#[derive(Debug, Clone)]
pub struct FileReportEmitter {
    dir: PathBuf,
}

impl FileReportEmitter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write(&self, path: PathBuf, content: Vec<u8>) -> Result<(), ReportError> {
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| ReportError::Io { path, source })
    }
}

fn render_csv(record: &AggregateRecord) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Section", "Data"])?;
    for (stage, result) in record.iter() {
        let data = serde_json::to_string(result)?;
        writer.write_record([stage, data.as_str()])?;
    }
    writer
        .into_inner()
        .map_err(|e| ReportError::Csv(csv::Error::from(e.into_error())))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render_html(target: &Target, record: &AggregateRecord) -> Result<String, ReportError> {
    let body = serde_json::to_string_pretty(&record.to_value())?;
    Ok(format!(
        "<html><body><h1>{} Report</h1><pre>{}</pre></body></html>",
        escape_html(target.as_str()),
        escape_html(&body)
    ))
}

#[async_trait]
impl ReportEmitter for FileReportEmitter {
    async fn emit(
        &self,
        target: &Target,
        record: &AggregateRecord,
        options: ReportOptions,
    ) -> Result<ReportSummary, ReportError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ReportError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let summary = ReportSummary {
            dir: self.dir.clone(),
            target: target.to_string(),
            formats: if options.verbose {
                vec!["json", "csv", "html"]
            } else {
                vec!["json"]
            },
        };
        let path = |ext: &str| self.dir.join(format!("{target}_report.{ext}"));

        let report = json!({"target": target.as_str(), "recon": record.to_value()});
        self.write(path("json"), serde_json::to_vec_pretty(&report)?)
            .await?;

        if options.verbose {
            self.write(path("csv"), render_csv(record)?).await?;
            self.write(path("html"), render_html(target, record)?.into_bytes())
                .await?;
        }

        info!("Wrote {} report file(s) for {}", summary.formats.len(), target);
        Ok(summary)
    }
}
