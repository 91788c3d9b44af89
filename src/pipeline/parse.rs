//! Model reply → [`ExtractionCell`].
//!
//! The model is asked for a bare JSON object but routinely wraps it in prose
//! or code fences. The greedy `{...}` match spans from the first `{` to the
//! last `}`, which tolerates surrounding text and nested objects.

use crate::config::ResponsePolicy;
use crate::error::ExtractError;
use crate::model::{Confidence, ExtractionCell, ReviewStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

const SNIPPET_LEN: usize = 200;

/// Fields a strict policy requires in the reply.
const REQUIRED_FIELDS: [&str; 2] = ["value", "confidence"];

/// Parse the model's text reply into a cell under `policy`.
pub fn parse_cell(text: &str, policy: ResponsePolicy) -> Result<ExtractionCell, ExtractError> {
    let object = extract_json_object(text)?;
    normalize_cell(&object, policy)
}

/// Locate and parse the outermost JSON object in `text`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ExtractError> {
    let span = RE_JSON_OBJECT
        .find(text)
        .ok_or_else(|| ExtractError::NoJsonFound {
            snippet: text.chars().take(SNIPPET_LEN).collect(),
        })?;

    serde_json::from_str::<Map<String, Value>>(span.as_str())
        .map_err(|source| ExtractError::MalformedJson { source })
}

/// Map a parsed reply object onto an [`ExtractionCell`].
pub fn normalize_cell(object: &Map<String, Value>, policy: ResponsePolicy) -> Result<ExtractionCell, ExtractError> {
    if policy.is_strict() {
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| object.get(**f).map_or(true, Value::is_null))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ExtractError::SchemaViolation { missing });
        }
    }

    Ok(ExtractionCell {
        value: stringify(object.get("value")),
        confidence: object
            .get("confidence")
            .and_then(Value::as_str)
            .and_then(Confidence::parse)
            .unwrap_or_default(),
        quote: stringify(object.get("quote")),
        page: page_number(object.get("page")),
        reasoning: stringify(object.get("reasoning")),
        status: ReviewStatus::NeedsReview,
    })
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

/// Positive integer page, else 1.
fn page_number(value: Option<&Value>) -> u32 {
    let n = match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u32::MAX as f64)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    n.filter(|&p| p >= 1)
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_surrounding_prose_and_fences() {
        let reply = "Sure! Here it is:\n```json\n{\"value\": \"2024-01-31\", \"confidence\": \"high\", \"quote\": \"Due: Jan 31\", \"page\": 2, \"reasoning\": \"stated\"}\n```\nHope that helps.";
        let cell = parse_cell(reply, ResponsePolicy::Lenient).unwrap();
        assert_eq!(cell.value, "2024-01-31");
        assert_eq!(cell.confidence, Confidence::High);
        assert_eq!(cell.quote, "Due: Jan 31");
        assert_eq!(cell.page, 2);
        assert_eq!(cell.status, ReviewStatus::NeedsReview);
    }

    #[test]
    fn lenient_defaults_missing_fields() {
        let cell = parse_cell(r#"{"quote": "x"}"#, ResponsePolicy::Lenient).unwrap();
        assert_eq!(cell.value, "");
        assert_eq!(cell.confidence, Confidence::Low);
        assert_eq!(cell.page, 1);
        assert_eq!(cell.reasoning, "");
    }

    #[test]
    fn strict_reports_missing_fields() {
        let err = parse_cell(r#"{"value": null, "quote": "x"}"#, ResponsePolicy::Strict).unwrap_err();
        match err {
            ExtractError::SchemaViolation { missing } => {
                assert_eq!(missing, vec!["value".to_string(), "confidence".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_braces_is_no_json_found() {
        let err = parse_cell("I could not find that field.", ResponsePolicy::Lenient).unwrap_err();
        assert!(matches!(err, ExtractError::NoJsonFound { ref snippet } if snippet.starts_with("I could not")));
        assert!(matches!(parse_cell("", ResponsePolicy::Lenient), Err(ExtractError::NoJsonFound { .. })));
    }

    #[test]
    fn broken_object_is_malformed_json() {
        let err = parse_cell("{\"value\": \"1\", }", ResponsePolicy::Lenient).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedJson { .. }));
    }

    #[test]
    fn greedy_match_spans_two_objects_and_fails() {
        // first `{` to last `}` covers both objects, which is not valid JSON
        let err = parse_cell(r#"{"value":"a"} and {"value":"b"}"#, ResponsePolicy::Lenient).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedJson { .. }));
    }

    #[test]
    fn non_string_values_are_stringified() {
        let cell = parse_cell(r#"{"value": 1200.5, "confidence": "Medium"}"#, ResponsePolicy::Lenient).unwrap();
        assert_eq!(cell.value, "1200.5");
        assert_eq!(cell.confidence, Confidence::Medium);

        let cell = parse_cell(r#"{"value": true}"#, ResponsePolicy::Lenient).unwrap();
        assert_eq!(cell.value, "true");

        let cell = parse_cell(r#"{"value": ["a", "b", 3]}"#, ResponsePolicy::Lenient).unwrap();
        assert_eq!(cell.value, "a, b, 3");
    }

    #[test]
    fn page_falls_back_to_one() {
        for raw in [r#""0""#, "-3", r#""three""#, "null", "1.5"] {
            let reply = format!(r#"{{"value": "x", "page": {raw}}}"#);
            assert_eq!(parse_cell(&reply, ResponsePolicy::Lenient).unwrap().page, 1, "page {raw}");
        }
        assert_eq!(parse_cell(r#"{"page": "7"}"#, ResponsePolicy::Lenient).unwrap().page, 7);
    }

    #[test]
    fn whole_float_page_is_accepted() {
        assert_eq!(parse_cell(r#"{"page": 2.0}"#, ResponsePolicy::Lenient).unwrap().page, 2);
        assert_eq!(parse_cell(r#"{"page": 0.0}"#, ResponsePolicy::Lenient).unwrap().page, 1);
    }

    #[test]
    fn unknown_confidence_is_low() {
        let cell = parse_cell(r#"{"value": "x", "confidence": "certain"}"#, ResponsePolicy::Strict).unwrap();
        assert_eq!(cell.confidence, Confidence::Low);
    }
}
