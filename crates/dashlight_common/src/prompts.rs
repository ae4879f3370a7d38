//! Prompt builders for the completion service.
//!
//! Three modes, all asking for JSON only:
//! - option mapping: map a free-text answer onto one offered label;
//! - bridge: ask short questions until a known warning light is named;
//! - expert: general help once the KB has nothing more to offer.

use dashlight_shared::state::AnswerRecord;
use dashlight_shared::{DiagnosticState, KnowledgeBase};
use serde_json::json;

const MAX_INPUT_CHARS: usize = 1000;
const MAX_ANSWER_CHARS: usize = 120;
const MAX_HISTORY_CHARS: usize = 2000;
const HISTORY_ANSWERS: usize = 6;
/// Answers after which the expert prompt demands a diagnosis.
pub const EXPERT_DIAGNOSE_AFTER: usize = 5;

fn clamp(text: &str, max: usize) -> String {
    let t = text.trim();
    if t.chars().count() > max {
        let mut out: String = t.chars().take(max).collect();
        out.push('…');
        out
    } else {
        t.to_string()
    }
}

/// Drop control characters and cap the length of user text.
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    clamp(&cleaned.replace('"', "'"), MAX_INPUT_CHARS)
}

fn history(answers: &[AnswerRecord]) -> String {
    if answers.is_empty() {
        return "No previous answers.".to_string();
    }
    let start = answers.len().saturating_sub(HISTORY_ANSWERS);
    let lines: Vec<String> = answers[start..]
        .iter()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "{}) Q: \"{}\" | A: \"{}\"",
                i + 1,
                clamp(&a.question, MAX_ANSWER_CHARS),
                clamp(&a.answer, MAX_ANSWER_CHARS)
            )
        })
        .collect();
    clamp(&lines.join("\n"), MAX_HISTORY_CHARS)
}

/// Light ids with their names, for identification prompts.
fn light_list(kb: &KnowledgeBase) -> String {
    let list: Vec<_> = kb
        .lights()
        .map(|l| json!({ "lightId": l.id, "names": l.names }))
        .collect();
    serde_json::to_string_pretty(&json!({ "available_lights": list })).unwrap_or_default()
}

pub fn option_map_prompt(answer: &str, question: &str, options: &[String]) -> String {
    let numbered: Vec<String> = options
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. \"{}\"", i + 1, o))
        .collect();
    format!(
        r#"You are an option mapper for a car diagnostics assistant.

Question shown to the user:
"{question}"

User's free-text answer:
"{answer}"

Available options (choose EXACTLY one label or null):
{options}

Return ONLY a valid JSON object. No markdown, no extra text.
{{
  "type": "option_map",
  "selectedOptionLabel": "<exact label from options | null>",
  "needClarification": "<short clarifying question | null>"
}}

Rules:
- selectedOptionLabel MUST be exactly one of the labels above, or null.
- If null, put a short clarifying question in needClarification."#,
        question = sanitize(question),
        answer = sanitize(answer),
        options = numbered.join("\n"),
    )
}

pub fn bridge_prompt(
    text: &str,
    state: &DiagnosticState,
    kb: &KnowledgeBase,
    remaining: u32,
    has_images: bool,
) -> String {
    let mode = if has_images { "IMAGE_IDENTIFICATION" } else { "BRIDGE_TO_KB" };
    let vehicle = state.vehicle_info.describe();
    format!(
        r#"You are a data coordinator for a car diagnostics assistant.

Mode: {mode}

User input:
"{input}"

Vehicle: {vehicle}

Recent Q/A history:
{history}

Instructions:
- Your goal: identify which warning light from available_lights matches the user's problem.
- You may ask UP TO {remaining} more short question(s).
- Do NOT diagnose or give technical advice.
- If you identify a warning light, include its lightId as "warning_light".

KB context (JSON):
{kb}

Return ONLY a valid JSON object. No markdown, no extra text.
{{
  "type": "question",
  "warning_light": "<lightId, optional>",
  "text": "<string>",
  "options": ["<string>", ...]
}}"#,
        mode = mode,
        input = sanitize(text),
        vehicle = if vehicle.is_empty() { "unknown".to_string() } else { vehicle },
        history = history(&state.answers),
        remaining = remaining,
        kb = light_list(kb),
    )
}

pub fn expert_prompt(text: &str, state: &DiagnosticState, kb: &KnowledgeBase, has_images: bool) -> String {
    let asked = state.answers.len();
    let instructions = if asked >= EXPERT_DIAGNOSE_AFTER {
        format!(
            "- You have gathered enough information ({} answers). Return a diagnosis_report now.",
            asked
        )
    } else {
        "- Ask one clarifying question with 3-4 varied options, not just yes/no.\n\
         - If the user wants to go to a mechanic or end the conversation, return a diagnosis_report."
            .to_string()
    };
    let light = state.detected_light_type.as_deref().unwrap_or("none");
    format!(
        r#"You are an expert car diagnostics assistant.

Mode: EXPERT_FALLBACK

User input:
"{input}"

Detected warning light: {light}

Recent Q/A history ({asked} answers so far):
{history}
{image_note}
Instructions:
{instructions}
- If the description matches a warning light from available_lights, include its lightId as "warning_light".
- Be safety-conscious: if something sounds dangerous, advise stopping and return a diagnosis_report.

Available lights (JSON):
{kb}

Return ONLY a valid JSON object. No markdown, no extra text.

Schema for questions:
{{ "type": "question", "text": "<question>", "options": ["<option>", "<option>", "<option>"] }}

Schema for a diagnosis:
{{
  "type": "diagnosis_report",
  "title": "<problem summary>",
  "results": [ {{ "issue": "<diagnosis>", "probability": 0.7, "explanation": "<why>" }} ],
  "confidence": 0.7,
  "severity": "low" | "moderate" | "high" | "critical",
  "recommendations": ["<specific check>"],
  "showTowButton": false
}}"#,
        input = sanitize(text),
        light = light,
        asked = asked,
        history = history(&state.answers),
        image_note = if has_images {
            "\nNote: the user attached an image of the dashboard.\n"
        } else {
            ""
        },
        instructions = instructions,
        kb = light_list(kb),
    )
}

/// Expert prompt that only accepts a diagnosis, for flows the KB could not finish.
pub fn diagnosis_prompt(state: &DiagnosticState, kb: &KnowledgeBase) -> String {
    let light = state.detected_light_type.as_deref().unwrap_or("none");
    let light_json = state
        .detected_light_type
        .as_deref()
        .and_then(|id| kb.get(id))
        .and_then(|l| serde_json::to_string_pretty(l).ok())
        .unwrap_or_else(|| "{}".to_string());
    format!(
        r#"You are an expert car diagnostics assistant.

Mode: EXPERT_DIAGNOSIS

Detected warning light: {light}
Scenario: {scenario}

Conversation so far:
{history}

KB entry for this light (JSON):
{light_json}

Using ONLY the information above, return ONLY a valid JSON object:
{{
  "type": "diagnosis_report",
  "title": "<problem summary>",
  "results": [ {{ "issue": "<diagnosis>", "probability": 0.6, "explanation": "<why>" }} ],
  "confidence": 0.6,
  "severity": "low" | "moderate" | "high" | "critical",
  "recommendations": ["<specific check>"],
  "showTowButton": false
}}"#,
        light = light,
        scenario = state.current_light_scenario.as_deref().unwrap_or("unknown"),
        history = history(&state.answers),
        light_json = light_json,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  a\u{0}b \"c\" "), "a b 'c'");
        let long = "x".repeat(1500);
        assert_eq!(sanitize(&long).chars().count(), MAX_INPUT_CHARS + 1);
    }

    #[test]
    fn test_history_keeps_last_six() {
        let answers: Vec<AnswerRecord> = (0..9)
            .map(|i| AnswerRecord {
                question: format!("q{}", i),
                answer: format!("a{}", i),
            })
            .collect();
        let h = history(&answers);
        assert!(!h.contains("q2"));
        assert!(h.contains("q3"));
        assert!(h.starts_with("1) Q: \"q3\""));
    }

    #[test]
    fn test_option_map_prompt_lists_options() {
        let p = option_map_prompt("kinda low", "Oil level?", &["Low".into(), "OK".into()]);
        assert!(p.contains("1. \"Low\""));
        assert!(p.contains("2. \"OK\""));
        assert!(p.contains("selectedOptionLabel"));
    }
}
