//! LLM-output validation and arithmetic reconciliation.
//!
//! Every completion string, however malformed, resolves to a fully formed
//! [`ExtractionRecord`]; nothing here returns an error or panics past the
//! boundary.

use crate::record::{Amount, ExtractionRecord, FailureKind, LineItem};
use chrono::Utc;
use serde::Deserialize;

/// Wire shape of a successful completion. Unknown keys (including any
/// LLM-invented `file_name`) are ignored.
#[derive(Debug, Deserialize)]
struct CompletionPayload {
    total_amount_before_tax: Option<Amount>,
    total_amount_after_tax: Option<Amount>,
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    item_name: Option<String>,
    item_amount: Option<Amount>,
}

/// The boolean comparison result plus the two compared decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub items_sum: f64,
    pub stated_total: f64,
    pub passed: bool,
}

impl Outcome {
    /// Compare in integer cents so float representation error cannot produce
    /// a false negative at two-decimal granularity.
    #[must_use]
    pub fn compare(items_sum: f64, stated_total: f64) -> Self {
        let passed = to_cents(items_sum) == to_cents(stated_total);
        Self {
            items_sum: round2(items_sum),
            stated_total: round2(stated_total),
            passed,
        }
    }
}

/// Round to integer cents, half-up.
fn to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Value rounded to two decimal places.
fn round2(value: f64) -> f64 {
    to_cents(value) as f64 / 100.0
}

/// Turn one raw completion into the canonical record for `file_name`.
///
/// `file_name` is taken from the source path by the caller and always wins
/// over anything the completion claims.
#[must_use]
pub fn reconcile(raw_text: &str, file_name: &str) -> ExtractionRecord {
    let value: serde_json::Value = match serde_json::from_str(raw_text) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("Completion for {} is not valid JSON: {}", file_name, err);
            return ExtractionRecord::failed(
                file_name,
                FailureKind::MalformedOutput,
                format!("invalid JSON: {err}"),
                raw_text,
            );
        }
    };

    if let Some(detail) = upstream_error(&value) {
        tracing::warn!("LLM collaborator fault for {}: {}", file_name, detail);
        return ExtractionRecord::failed(file_name, FailureKind::UpstreamFailure, detail, raw_text);
    }

    let payload: CompletionPayload = match serde_json::from_value(value) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!("Completion for {} has unexpected shape: {}", file_name, err);
            return ExtractionRecord::failed(
                file_name,
                FailureKind::MalformedOutput,
                format!("unexpected shape: {err}"),
                raw_text,
            );
        }
    };

    let mut items = Vec::with_capacity(payload.items.len());
    let mut sum = 0.0;
    for wire in payload.items {
        let name = wire.item_name.unwrap_or_default();
        match wire.item_amount.as_ref().and_then(Amount::as_f64) {
            Some(amount) => {
                sum += amount;
                items.push(LineItem {
                    name,
                    amount: wire.item_amount,
                    excluded_from_sum: false,
                });
            }
            None => {
                tracing::warn!(
                    "Non-numeric amount for item '{}' in {}, excluded from sum",
                    name,
                    file_name
                );
                items.push(LineItem {
                    name,
                    amount: wire.item_amount,
                    excluded_from_sum: true,
                });
            }
        }
    }

    // Missing or non-numeric stated totals count as 0.0 for the comparison
    // only; the original value stays on the record.
    let stated = payload
        .total_amount_before_tax
        .as_ref()
        .and_then(Amount::as_f64)
        .unwrap_or(0.0);
    let outcome = Outcome::compare(sum, stated);
    tracing::debug!(
        "Reconciliation for {}: sum {:.2} vs stated {:.2} -> {}",
        file_name,
        outcome.items_sum,
        outcome.stated_total,
        outcome.passed
    );

    ExtractionRecord {
        file_name: file_name.to_string(),
        total_before_tax: payload.total_amount_before_tax,
        total_after_tax: payload.total_amount_after_tax,
        items,
        calculated_items_sum: outcome.items_sum,
        reconciliation_passed: outcome.passed,
        processed_at: Utc::now(),
        failure: None,
    }
}

/// Detect the upstream-error sentinel: an object whose `error` field is
/// present and non-null.
fn upstream_error(value: &serde_json::Value) -> Option<String> {
    let map = value.as_object()?;
    let error = map.get("error")?;
    if error.is_null() {
        return None;
    }

    let code = match error {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match map.get("message").and_then(|m| m.as_str()) {
        Some(message) => Some(format!("{code}: {message}")),
        None => Some(code),
    }
}
