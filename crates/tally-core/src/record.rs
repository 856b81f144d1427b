//! Typed records flowing through the extraction pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One qualifying file arrival, produced by the watcher and consumed exactly
/// once by the pipeline. Never persisted.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub path: PathBuf,
    pub arrived_at: DateTime<Utc>,
}

impl ExtractionRequest {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            arrived_at: Utc::now(),
        }
    }
}

/// A monetary value as reported by the LLM.
///
/// Non-numeric tokens (e.g. `"N/A"`) are preserved verbatim rather than
/// rejected at parse time; coercion happens later in the reconciliation
/// engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    /// Numeric coercion: numbers pass through, strings are trimmed and parsed.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One itemized line from the receipt.
///
/// Items whose amount fails numeric coercion stay in the sequence unchanged
/// with `excluded_from_sum` set; they contribute nothing to the derived sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub excluded_from_sum: bool,
}

/// Why a completion could not be turned into extracted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The completion text was not a valid extraction payload.
    MalformedOutput,
    /// The LLM collaborator reported its own fault as a sentinel payload.
    UpstreamFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedOutput => write!(f, "malformed_output"),
            Self::UpstreamFailure => write!(f, "upstream_failure"),
        }
    }
}

/// Diagnostic payload attached to a failed extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// Human-readable error detail.
    pub detail: String,
    /// The completion text exactly as returned, for later diagnosis.
    pub raw_response: String,
}

/// The canonical output unit: one processed receipt.
///
/// `calculated_items_sum` is always recomputed from `items`, never trusted
/// from the completion, and `file_name` always comes from the source path.
/// Records are immutable once constructed and written once; re-processing the
/// same document produces a new record that overwrites the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_before_tax: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_after_tax: Option<Amount>,
    pub items: Vec<LineItem>,
    pub calculated_items_sum: f64,
    pub reconciliation_passed: bool,
    pub processed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl ExtractionRecord {
    /// Record for a completion that never yielded extracted data.
    #[must_use]
    pub fn failed(
        file_name: &str,
        kind: FailureKind,
        detail: impl Into<String>,
        raw_response: &str,
    ) -> Self {
        Self {
            file_name: file_name.to_string(),
            total_before_tax: None,
            total_after_tax: None,
            items: Vec::new(),
            calculated_items_sum: 0.0,
            reconciliation_passed: false,
            processed_at: Utc::now(),
            failure: Some(Failure {
                kind,
                detail: detail.into(),
                raw_response: raw_response.to_string(),
            }),
        }
    }

    /// Document stem the result store keys this record by.
    #[must_use]
    pub fn file_stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }
}
