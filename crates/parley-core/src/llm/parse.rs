//! Parsing of model responses into the structured turn shape.
//!
//! Responses must be a JSON object carrying all five required fields
//! (`utterance`, `intent`, `summary_note`, `relationship_effects`,
//! `mood_shift`). Anything else is rejected here at the boundary and
//! surfaces as a retryable `MalformedResponse`.

use parley_types::llm::{InferenceError, ParsedTurn};

const REQUIRED_FIELDS: [&str; 5] = [
    "utterance",
    "intent",
    "summary_note",
    "relationship_effects",
    "mood_shift",
];

/// Parse a non-streaming model response.
pub fn parse_turn(raw: &str) -> Result<ParsedTurn, InferenceError> {
    let body = strip_code_fences(raw);

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| InferenceError::MalformedResponse("response is not a JSON object".to_string()))?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(InferenceError::MalformedResponse(format!(
                "missing required field '{field}'"
            )));
        }
    }

    let turn: ParsedTurn = serde_json::from_value(value)
        .map_err(|e| InferenceError::MalformedResponse(format!("field shape: {e}")))?;

    if turn.utterance.trim().is_empty() {
        return Err(InferenceError::MalformedResponse(
            "empty utterance".to_string(),
        ));
    }

    Ok(turn)
}

/// Parse accumulated streaming text.
///
/// Streaming models frequently emit plain prose rather than the
/// structured object; a stream that fails structured parsing is accepted
/// as a bare utterance with neutral bookkeeping instead of being retried.
pub fn parse_streamed(raw: &str) -> Result<ParsedTurn, InferenceError> {
    if let Ok(turn) = parse_turn(raw) {
        return Ok(turn);
    }

    let text = raw.trim();
    if text.is_empty() {
        return Err(InferenceError::MalformedResponse(
            "empty streamed response".to_string(),
        ));
    }

    Ok(ParsedTurn::from_utterance(text, "statement"))
}

/// Strip a surrounding markdown code fence, if present.
///
/// Models regularly wrap JSON in ```json ... ``` despite instructions.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, then the trailing fence.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "utterance": "The rain should hold off until evening.",
        "intent": "inform",
        "summary_note": "Talked about the weather.",
        "relationship_effects": [{"target": "mira", "delta": 0.05, "reason": "pleasant chat"}],
        "mood_shift": {"valence": 0.1, "arousal": 0.0}
    }"#;

    #[test]
    fn test_parse_valid_response() {
        let turn = parse_turn(VALID).unwrap();
        assert_eq!(turn.utterance, "The rain should hold off until evening.");
        assert_eq!(turn.intent, "inform");
        assert_eq!(turn.relationship_effects.len(), 1);
        assert!((turn.mood_shift.valence - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_fenced_response() {
        let fenced = format!("```json\n{VALID}\n```");
        let turn = parse_turn(&fenced).unwrap();
        assert_eq!(turn.intent, "inform");
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let raw = r#"{"utterance": "hi", "intent": "greet", "summary_note": "", "mood_shift": {}}"#;
        let err = parse_turn(raw).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
        assert!(err.to_string().contains("relationship_effects"));
    }

    #[test]
    fn test_non_json_is_malformed() {
        assert!(matches!(
            parse_turn("Sure! Here's what I'd say:"),
            Err(InferenceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_utterance_is_malformed() {
        let raw = r#"{"utterance": "  ", "intent": "x", "summary_note": "", "relationship_effects": [], "mood_shift": {}}"#;
        assert!(parse_turn(raw).is_err());
    }

    #[test]
    fn test_streamed_structured_response_parses_fully() {
        let turn = parse_streamed(VALID).unwrap();
        assert_eq!(turn.relationship_effects.len(), 1);
    }

    #[test]
    fn test_streamed_plain_prose_becomes_bare_utterance() {
        let turn = parse_streamed("Hello there").unwrap();
        assert_eq!(turn.utterance, "Hello there");
        assert!(turn.relationship_effects.is_empty());
    }

    #[test]
    fn test_streamed_empty_is_malformed() {
        assert!(parse_streamed("   ").is_err());
    }
}
