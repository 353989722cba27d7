//! Training metrics summary
//!
//! Display and validation events are appended to a CSV file under the
//! summary directory so runs can be plotted afterwards. The file is opened in
//! append mode; a resumed run keeps extending the same history.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::Result;

/// CSV header written to a fresh metrics file
pub const METRICS_HEADER: &str = "step,epoch,kind,loss,accuracy,learning_rate";

/// Which evaluation produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    /// Loss/accuracy on the current training batch with dropout disabled
    Train,
    /// Accuracy on the fixed validation batch
    Validation,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Train => write!(f, "train"),
            MetricKind::Validation => write!(f, "validation"),
        }
    }
}

/// One row of the metrics file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub step: usize,
    pub epoch: usize,
    pub kind: MetricKind,
    /// Not computed for validation events
    pub loss: Option<f64>,
    pub accuracy: f64,
    pub learning_rate: f64,
}

impl MetricRecord {
    /// Render as a CSV row (no trailing newline)
    pub fn to_csv_row(&self) -> String {
        let loss = self
            .loss
            .map(|l| format!("{:.7}", l))
            .unwrap_or_default();
        format!(
            "{},{},{},{},{:.4},{:e}",
            self.step, self.epoch, self.kind, loss, self.accuracy, self.learning_rate
        )
    }
}

/// Appends metric records to `<summary>/train/metrics.csv`
pub struct MetricsWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl MetricsWriter {
    /// Open (or create) the metrics file inside a summary directory
    pub fn create<P: AsRef<Path>>(summary_dir: P) -> Result<Self> {
        let path = summary_dir.as_ref().join("train").join("metrics.csv");
        Self::open(path)
    }

    /// Open (or create) a metrics file at an explicit path
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);

        if is_new {
            writeln!(writer, "{}", METRICS_HEADER)?;
        }

        debug!("Metrics file: {:?}", path);
        Ok(Self { path, writer })
    }

    /// Append one record and flush so a crash loses nothing already logged
    pub fn record(&mut self, record: &MetricRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.to_csv_row())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Path of the metrics file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
