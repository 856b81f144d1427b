//! Gemini completion client.
//!
//! Call-time faults are encoded as a `{"error", "message"}` sentinel payload
//! instead of being raised, so every string handed back to the caller is a
//! candidate sentinel and is screened by the reconciliation engine.

use crate::error::CollaboratorError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Produces a text completion for an extraction prompt.
pub trait CompletionProvider {
    fn complete(&self, prompt: &str) -> impl Future<Output = String> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    /// Forces the model to emit a bare JSON document.
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// HTTP client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Build from `GEMINI_API_KEY`; hard failure when it is unset.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| CollaboratorError::MissingCredentials(API_KEY_ENV))?;
        Ok(Self::new(api_key))
    }

    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionProvider for GeminiClient {
    async fn complete(&self, prompt: &str) -> String {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let url = format!("{BASE_URL}/models/{}:generateContent", self.model);
        let response = match self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("Gemini request failed: {}", err);
                return error_sentinel("API_CALL_FAILED", &err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("Gemini API error ({}): {}", status, detail);
            return error_sentinel("API_CALL_FAILED", &format!("HTTP {status}: {detail}"));
        }

        match response.json::<GenerateResponse>().await {
            Ok(body) => match completion_text(body) {
                Some(text) => text,
                None => error_sentinel("EMPTY_COMPLETION", "response carried no candidate text"),
            },
            Err(err) => {
                tracing::warn!("Gemini response was not decodable: {}", err);
                error_sentinel("UNEXPECTED_RESPONSE", &err.to_string())
            }
        }
    }
}

/// Encode a fault as the sentinel payload callers expect instead of an error.
fn error_sentinel(code: &str, message: &str) -> String {
    serde_json::json!({ "error": code, "message": message }).to_string()
}

/// Concatenated text of the first candidate, if any.
fn completion_text(body: GenerateResponse) -> Option<String> {
    let candidate = body.candidates.into_iter().next()?;
    let text: String = candidate
        .content
        .parts
        .into_iter()
        .map(|part| part.text)
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sentinel_is_valid_json() {
        let sentinel = error_sentinel("API_CALL_FAILED", "HTTP 429: \"quota\"");
        let value: serde_json::Value = serde_json::from_str(&sentinel).unwrap();
        assert_eq!(value["error"], "API_CALL_FAILED");
        assert_eq!(value["message"], "HTTP 429: \"quota\"");
    }

    #[test]
    fn test_request_uses_camel_case_wire_names() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: "hi" }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"responseMimeType\":\"application/json\""));
        assert!(json.contains("\"parts\":[{\"text\":\"hi\"}]"));
    }

    #[test]
    fn test_completion_text_joins_parts() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(completion_text(body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_completion_text_empty_response() {
        let body: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(completion_text(body).is_none());

        let body: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": []}}]}"#).unwrap();
        assert!(completion_text(body).is_none());
    }

    #[test]
    fn test_from_env_requires_key() {
        std::env::remove_var(API_KEY_ENV);
        assert!(matches!(
            GeminiClient::from_env(),
            Err(CollaboratorError::MissingCredentials(API_KEY_ENV))
        ));

        std::env::set_var(API_KEY_ENV, "secret");
        let client = GeminiClient::from_env().unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        std::env::remove_var(API_KEY_ENV);
    }

    #[test]
    fn test_with_model_overrides_default() {
        let client = GeminiClient::new("k").with_model("gemini-2.0-pro");
        assert_eq!(client.model(), "gemini-2.0-pro");
    }
}
