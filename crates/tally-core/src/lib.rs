//! tally-core: receipt extraction and reconciliation
//!
//! This crate provides:
//! - Typed extraction records and reconciliation outcomes
//! - The reconciliation engine validating LLM completions
//! - OCR (Azure Document Intelligence) and LLM (Gemini) collaborator clients
//! - The result store (per-receipt JSON plus a CSV log)
//! - The extraction pipeline tying them together

pub mod error;
pub mod llm;
pub mod ocr;
pub mod pipeline;
pub mod prompt;
pub mod reconcile;
pub mod record;
pub mod store;

// Re-exports
pub use error::CollaboratorError;
pub use llm::{CompletionProvider, GeminiClient};
pub use ocr::{DocIntelligenceClient, LayoutOcr};
pub use pipeline::{is_processable, Pipeline, PipelineError, TRANSIENT_PREFIX};
pub use prompt::build_prompt;
pub use reconcile::{reconcile, Outcome};
pub use record::{
    Amount, ExtractionRecord, ExtractionRequest, Failure, FailureKind, LineItem,
};
pub use store::{ResultStore, StoreError, CSV_LOG_NAME};
