//! Durable per-receipt records and the aggregate CSV log.

use crate::record::ExtractionRecord;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the aggregate tabular log inside the output directory.
pub const CSV_LOG_NAME: &str = "processing_log.csv";

/// Failures writing to the result store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to append log row: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes one JSON document per processed receipt plus an append-only CSV log.
///
/// Records are keyed by document stem; writing the same stem twice overwrites
/// (last-write-wins). Writes to different stems never conflict.
#[derive(Debug, Clone)]
pub struct ResultStore {
    output_dir: PathBuf,
}

impl ResultStore {
    /// Open the store, creating `output_dir` if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|source| StoreError::Io {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self { output_dir })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path the record for `stem` is written to.
    #[must_use]
    pub fn record_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{stem}.json"))
    }

    /// Write the full record as pretty JSON, overwriting any prior record for
    /// the same stem.
    pub fn put(&self, record: &ExtractionRecord) -> Result<PathBuf, StoreError> {
        let path = self.record_path(record.file_stem());
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Append one flattened row to the CSV log, writing the header only when
    /// the log file does not exist yet.
    pub fn append_row(&self, record: &ExtractionRecord) -> Result<(), StoreError> {
        let path = self.output_dir.join(CSV_LOG_NAME);
        let write_header = !path.exists();

        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        let mut writer = csv::Writer::from_writer(file);

        if write_header {
            writer.write_record([
                "file_name",
                "total_amount_before_tax",
                "total_amount_after_tax",
                "calculated_items_sum",
                "reconciliation_passed",
                "failure_kind",
                "processed_at",
            ])?;
        }

        let missing = || "N/A".to_string();
        writer.write_record([
            record.file_name.clone(),
            record
                .total_before_tax
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(missing),
            record
                .total_after_tax
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(missing),
            format!("{:.2}", record.calculated_items_sum),
            record.reconciliation_passed.to_string(),
            record
                .failure
                .as_ref()
                .map(|failure| failure.kind.to_string())
                .unwrap_or_default(),
            record.processed_at.to_rfc3339(),
        ])?;

        writer.flush().map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }
}
