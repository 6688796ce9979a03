//! JSON-lines run records, one object per line.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use affect_shared::{ClassDistribution, TargetDimension};

use crate::adapt::{AdaptationMethod, GapReport};
use crate::learner::{DirectionModel, EvaluationReport};

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

pub fn write_json_line<W: Write, T: Serialize>(mut writer: W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut writer, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    writer.write_all(b"\n")
}

/// Append one record to `path`, creating the file and its parent directory.
pub fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    write_json_line(file, value)
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectionLogEntry {
    pub direction: String,
    pub dimension: TargetDimension,
    pub method: AdaptationMethod,
    pub resampler: Option<String>,
    pub distribution_before: ClassDistribution,
    pub distribution_after: ClassDistribution,
    pub gap: Option<GapReport>,
    pub alignment_failed: bool,
    pub timestamp_ms: u128,
}

impl DirectionLogEntry {
    pub fn new(dimension: TargetDimension, model: &DirectionModel) -> Self {
        let info = model.info();
        Self {
            direction: model.direction(),
            dimension,
            method: info.method,
            resampler: info.resampler.clone(),
            distribution_before: info.distribution_before.clone(),
            distribution_after: info.distribution_after.clone(),
            gap: info.alignment.as_ref().map(|a| a.gap),
            alignment_failed: info.alignment.as_ref().map_or(false, |a| a.failure.is_some()),
            timestamp_ms: timestamp_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationLogEntry {
    pub direction: String,
    pub dimension: TargetDimension,
    pub threshold: f64,
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub balanced_accuracy: f64,
    pub roc_auc: Option<f64>,
    pub pr_auc: Option<f64>,
    pub timestamp_ms: u128,
}

impl EvaluationLogEntry {
    pub fn new(dimension: TargetDimension, report: &EvaluationReport) -> Self {
        Self {
            direction: report.direction.clone(),
            dimension,
            threshold: report.threshold.threshold,
            accuracy: report.accuracy,
            f1_weighted: report.weighted_f1,
            balanced_accuracy: report.balanced_accuracy,
            roc_auc: report.roc_auc,
            pr_auc: report.pr_auc,
            timestamp_ms: timestamp_ms(),
        }
    }
}

/// Append a training record and its evaluation record to `path`.
pub fn log_run<P: AsRef<Path>>(
    path: P,
    dimension: TargetDimension,
    model: &DirectionModel,
    report: &EvaluationReport,
) -> io::Result<()> {
    append_json_line(path.as_ref(), &DirectionLogEntry::new(dimension, model))?;
    append_json_line(path.as_ref(), &EvaluationLogEntry::new(dimension, report))
}
