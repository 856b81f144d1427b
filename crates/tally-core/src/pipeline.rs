//! The extraction orchestrator: one receipt in, one persisted record out.

use crate::error::CollaboratorError;
use crate::llm::CompletionProvider;
use crate::ocr::LayoutOcr;
use crate::prompt::build_prompt;
use crate::reconcile::reconcile;
use crate::record::ExtractionRecord;
use crate::store::ResultStore;
use std::path::Path;
use thiserror::Error;

/// Marker prefix of scanner/editor temp files; arrivals carrying it never
/// reach the collaborators.
pub const TRANSIENT_PREFIX: char = '~';

/// Faults that abort a single invocation before a record can be produced.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("OCR collaborator failed: {0}")]
    Ocr(#[source] CollaboratorError),
}

/// Drives one document through OCR, extraction, reconciliation and
/// persistence. Collaborators are injected once at construction.
pub struct Pipeline<O, C> {
    ocr: O,
    llm: C,
    store: ResultStore,
}

impl<O: LayoutOcr, C: CompletionProvider> Pipeline<O, C> {
    #[must_use]
    pub fn new(ocr: O, llm: C, store: ResultStore) -> Self {
        Self { ocr, llm, store }
    }

    /// Process one document. Returns `Ok(None)` when the path does not
    /// survive re-validation (nothing processed, nothing written).
    ///
    /// An OCR fault aborts the invocation with no record; every LLM outcome,
    /// including sentinel faults and malformed text, still yields a record.
    /// Store failures are logged and never roll back the extraction.
    pub async fn process(&self, path: &Path) -> Result<Option<ExtractionRecord>, PipelineError> {
        if !is_processable(path) {
            tracing::info!("Skipping {:?}: not a processable receipt file", path);
            return Ok(None);
        }
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        tracing::info!("Processing receipt {}", file_name);

        let markdown = self
            .ocr
            .layout_markdown(path)
            .await
            .map_err(PipelineError::Ocr)?;

        let prompt = build_prompt(&markdown);
        let completion = self.llm.complete(&prompt).await;
        let record = reconcile(&completion, &file_name);

        match self.store.put(&record) {
            Ok(record_path) => tracing::info!("Saved record to {:?}", record_path),
            Err(err) => tracing::warn!("Failed to save record for {}: {}", file_name, err),
        }
        if let Err(err) = self.store.append_row(&record) {
            tracing::warn!("Failed to append log row for {}: {}", file_name, err);
        }

        Ok(Some(record))
    }
}

/// A processable path is an existing regular file whose name does not carry
/// the transient-file marker prefix.
#[must_use]
pub fn is_processable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => !name.starts_with(TRANSIENT_PREFIX),
        None => false,
    }
}
