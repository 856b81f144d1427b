//! Extraction prompt construction.

/// Build the fixed-template extraction prompt around the OCR markdown.
///
/// The template pins the wire contract: a single JSON object with exactly
/// `total_amount_before_tax`, `total_amount_after_tax` and `items`, no prose
/// and no code fences around it.
#[must_use]
pub fn build_prompt(ocr_markdown: &str) -> String {
    format!(
        r#"# Role:
    you are an assistant working in the finance department
# Context:
    you are given the ocr response from a receipt: {ocr_markdown}
# Task:
your job is to identify all the items mentioned in the receipt and their amounts and the total amount

# Output format:
**STRICTLY** output only a single, valid JSON object. Do not include any text, notes, or markdown formatting (like ```json) outside of the JSON object itself.
The JSON object must have the following fields:
total_amount_before_tax (float),
total_amount_after_tax (float),
items (list of dicts).
items must be a list of dicts with fields: item_name (string), item_amount (float).
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_ocr_text() {
        let prompt = build_prompt("| Coffee | 20.50 |");
        assert!(prompt.contains("| Coffee | 20.50 |"));
    }

    #[test]
    fn test_prompt_pins_the_wire_contract() {
        let prompt = build_prompt("");
        assert!(prompt.contains("total_amount_before_tax"));
        assert!(prompt.contains("total_amount_after_tax"));
        assert!(prompt.contains("item_name"));
        assert!(prompt.contains("item_amount"));
        assert!(prompt.contains("only a single, valid JSON object"));
    }
}
