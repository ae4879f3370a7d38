//! Best-effort JSON extraction from completion text.
//!
//! Completions arrive as raw JSON, fenced JSON, or JSON buried in prose.
//! Extraction strips fences, tries a direct parse, then the first balanced
//! `{...}` / `[...]` span, then the same span with trailing commas removed.

use crate::error::ExtractionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Keys a model may use to name a detected light.
pub const LIGHT_ALIASES: &[&str] = &[
    "warning_light",
    "light_type",
    "detected_light",
    "light_id",
    "detectedLightType",
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelResult {
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub explanation: String,
}

/// Diagnosis as a model returns it; every field optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDiagnosis {
    pub title: String,
    pub confidence: Option<f64>,
    pub results: Vec<ModelResult>,
    pub recommendations: Vec<String>,
    pub severity: Option<String>,
    #[serde(rename = "showTowButton")]
    pub show_tow_button: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    Question { text: String, options: Vec<String> },
    Diagnosis(ModelDiagnosis),
    LightDetected(String),
    OptionMapping { selected: Option<String>, clarification: Option<String> },
    /// Valid JSON of no known shape.
    Unparseable(Value),
}

fn fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*```(?:json|JSON)?\s*$").ok()).as_ref()
}

fn trailing_comma_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").ok()).as_ref()
}

fn strip_fences(text: &str) -> String {
    match fence_regex() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.replace("```json", "").replace("```", "").trim().to_string(),
    }
}

/// First balanced object or array, honoring string literals.
fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn extract_json(text: &str) -> Result<Value, ExtractionError> {
    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return Err(ExtractionError::Empty);
    }
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }
    let span = balanced_span(&cleaned).ok_or(ExtractionError::NoJsonSpan)?;
    match serde_json::from_str::<Value>(span) {
        Ok(value) => Ok(value),
        Err(first) => {
            let fixed = match trailing_comma_regex() {
                Some(re) => re.replace_all(span, "$1").into_owned(),
                None => span.to_string(),
            };
            serde_json::from_str::<Value>(&fixed).map_err(|_| ExtractionError::Malformed(first.to_string()))
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Classify an extracted completion.
pub fn classify(value: Value) -> ParsedPayload {
    if let Some(light) = LIGHT_ALIASES.iter().find_map(|k| string_field(&value, k)) {
        return ParsedPayload::LightDetected(light);
    }

    if value.get("selectedOptionLabel").is_some() || value.get("needClarification").is_some() {
        return ParsedPayload::OptionMapping {
            selected: string_field(&value, "selectedOptionLabel"),
            clarification: string_field(&value, "needClarification"),
        };
    }

    let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
    if kind == "diagnosis_report" || kind == "ai_response" {
        return match serde_json::from_value::<ModelDiagnosis>(value.clone()) {
            Ok(diagnosis) => ParsedPayload::Diagnosis(diagnosis),
            Err(_) => ParsedPayload::Unparseable(value),
        };
    }

    let text = string_field(&value, "text").or_else(|| string_field(&value, "question"));
    if kind == "question" || text.is_some() {
        if let Some(text) = text {
            let options = value
                .get("options")
                .and_then(Value::as_array)
                .map(|opts| {
                    opts.iter()
                        .filter_map(|o| {
                            o.as_str()
                                .map(str::to_string)
                                .or_else(|| string_field(o, "label"))
                        })
                        .collect()
                })
                .unwrap_or_default();
            return ParsedPayload::Question { text, options };
        }
    }

    ParsedPayload::Unparseable(value)
}

pub fn parse_payload(text: &str) -> Result<ParsedPayload, ExtractionError> {
    extract_json(text).map(classify)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json() {
        let v = extract_json("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_json_in_prose() {
        let v = extract_json("Sure! Here it is: {\"text\": \"a } b\", \"n\": [1, 2]} hope it helps {x}").unwrap();
        assert_eq!(v["text"], "a } b");
    }

    #[test]
    fn test_trailing_commas() {
        let v = extract_json("{\"options\": [\"Yes\", \"No\",],}").unwrap();
        assert_eq!(v["options"][1], "No");
    }

    #[test]
    fn test_errors() {
        assert_eq!(extract_json("   "), Err(ExtractionError::Empty));
        assert_eq!(extract_json("no json here"), Err(ExtractionError::NoJsonSpan));
        assert!(matches!(extract_json("{\"a\": }"), Err(ExtractionError::Malformed(_))));
    }

    #[test]
    fn test_classify_shapes() {
        assert_eq!(
            parse_payload(r#"{"light_type": " tpms_light "}"#).unwrap(),
            ParsedPayload::LightDetected("tpms_light".into())
        );
        assert_eq!(
            parse_payload(r#"{"type":"question","text":"Color?","options":["Red",{"label":"Amber"}]}"#).unwrap(),
            ParsedPayload::Question {
                text: "Color?".into(),
                options: vec!["Red".into(), "Amber".into()],
            }
        );
        assert_eq!(
            parse_payload(r#"{"selectedOptionLabel": null, "needClarification": "Which one?"}"#).unwrap(),
            ParsedPayload::OptionMapping {
                selected: None,
                clarification: Some("Which one?".into()),
            }
        );
        match parse_payload(r#"{"type":"ai_response","title":"Worn belt","results":[{"issue":"Belt","probability":0.6}]}"#).unwrap() {
            ParsedPayload::Diagnosis(d) => assert_eq!(d.results[0].issue, "Belt"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse_payload("[1, 2]").unwrap(), ParsedPayload::Unparseable(_)));
    }
}
