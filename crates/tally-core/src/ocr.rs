//! Azure Document Intelligence client: layout analysis to markdown.
//!
//! Submits the document to the `prebuilt-layout` model with markdown output,
//! then polls the returned operation until it reaches a terminal state.

use crate::error::CollaboratorError;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Environment variables holding the Document Intelligence credentials.
pub const ENDPOINT_ENV: &str = "AZURE_DI_ENDPOINT";
pub const KEY_ENV: &str = "AZURE_DI_KEY";

const API_VERSION: &str = "2024-11-30";
const MODEL_ID: &str = "prebuilt-layout";

/// Delay between polls of the analyze operation.
const POLL_INTERVAL: Duration = Duration::from_millis(1500);
/// Polls before the operation is treated as stuck.
const MAX_POLLS: u32 = 60;

/// Converts a receipt document into markdown-formatted text.
pub trait LayoutOcr {
    fn layout_markdown(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<String, CollaboratorError>> + Send;
}

/// Long-running analyze operation as reported by the service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    analyze_result: Option<AnalyzeResult>,
    error: Option<RemoteFault>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct RemoteFault {
    code: String,
    message: String,
}

/// HTTP client for the Document Intelligence REST API.
#[derive(Debug, Clone)]
pub struct DocIntelligenceClient {
    client: Client,
    endpoint: String,
    key: String,
}

impl DocIntelligenceClient {
    /// Build from `AZURE_DI_ENDPOINT` / `AZURE_DI_KEY`; hard failure when
    /// either is unset.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        let endpoint = std::env::var(ENDPOINT_ENV)
            .map_err(|_| CollaboratorError::MissingCredentials(ENDPOINT_ENV))?;
        let key =
            std::env::var(KEY_ENV).map_err(|_| CollaboratorError::MissingCredentials(KEY_ENV))?;
        Ok(Self::new(endpoint, key))
    }

    #[must_use]
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            endpoint,
            key: key.into(),
        }
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{MODEL_ID}:analyze\
             ?api-version={API_VERSION}&outputContentFormat=markdown",
            self.endpoint
        )
    }
}

impl LayoutOcr for DocIntelligenceClient {
    async fn layout_markdown(&self, path: &Path) -> Result<String, CollaboratorError> {
        let bytes = std::fs::read(path).map_err(|source| CollaboratorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Submitting {:?} for layout analysis ({} bytes)", path, bytes.len());

        let response = self
            .client
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Remote {
                status: status.as_u16(),
                detail,
            });
        }

        let operation_url = response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                CollaboratorError::Incomplete(
                    "analyze response carried no operation-location".to_string(),
                )
            })?;

        for _ in 0..MAX_POLLS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let poll = self
                .client
                .get(&operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .send()
                .await?;
            let status = poll.status();
            if !status.is_success() {
                let detail = poll.text().await.unwrap_or_default();
                return Err(CollaboratorError::Remote {
                    status: status.as_u16(),
                    detail,
                });
            }

            let operation: AnalyzeOperation = poll.json().await?;
            match operation.status.as_str() {
                "succeeded" => {
                    let content = operation
                        .analyze_result
                        .map(|result| result.content)
                        .unwrap_or_default();
                    tracing::debug!("Layout analysis done for {:?} ({} chars)", path, content.len());
                    return Ok(content);
                }
                "failed" => {
                    let detail = operation
                        .error
                        .map(|fault| format!("{}: {}", fault.code, fault.message))
                        .unwrap_or_else(|| "unspecified analysis failure".to_string());
                    return Err(CollaboratorError::Incomplete(detail));
                }
                // notStarted / running
                _ => {}
            }
        }

        Err(CollaboratorError::Incomplete(format!(
            "operation still running after {MAX_POLLS} polls"
        )))
    }
}
