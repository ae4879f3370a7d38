//! Conversation state, owned by the caller and round-tripped every turn.
//!
//! The engine never keeps a copy: a turn takes `&DiagnosticState` and hands
//! back a fresh value inside the response envelope.

use crate::graph::GraphState;
use crate::knowledge::{LightSeverity, ResolutionPath};
use crate::scoring::Scores;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which engine owns the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActiveFlow {
    Kb,
    Scenario,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
}

impl VehicleInfo {
    pub fn is_empty(&self) -> bool {
        self.make.is_empty() && self.model.is_empty() && self.year.is_empty()
    }

    /// `make model year (plate)`, skipping empty parts.
    pub fn describe(&self) -> String {
        let plate = self.plate.as_deref().map(|p| format!("({})", p));
        let mut parts: Vec<&str> = [&self.make, &self.model, &self.year]
            .into_iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(p) = plate.as_deref() {
            parts.push(p);
        }
        if parts.is_empty() {
            "Unknown vehicle".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// One answered question, in conversation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticState {
    pub detected_light_type: Option<String>,
    pub light_severity: LightSeverity,
    pub current_light_scenario: Option<String>,
    pub cause_scores: Scores,
    pub asked_question_ids: Vec<String>,
    pub shown_instruction_ids: Vec<String>,
    /// Resolution paths waiting for the answer to the current question.
    pub pending_resolution_paths: IndexMap<String, ResolutionPath>,
    pub current_question_id: Option<String>,
    pub current_question_text: Option<String>,
    pub current_question_options: Vec<String>,
    pub option_map_attempts: u32,
    pub vehicle_info: VehicleInfo,
    pub active_flow: Option<ActiveFlow>,
    pub answers: Vec<AnswerRecord>,
    pub graph: Option<GraphState>,
    /// Scenario graph entered once a continuing safety alert is acknowledged.
    pub pending_scenario_id: Option<String>,
    pub bridge_question_count: u32,
    pub light_picker_shown: bool,
}

impl DiagnosticState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicle(vehicle_info: VehicleInfo) -> Self {
        Self {
            vehicle_info,
            ..Self::default()
        }
    }

    /// Adds `id` unless already present.
    pub fn record_asked(&mut self, id: &str) {
        if !id.is_empty() && !self.asked_question_ids.iter().any(|a| a == id) {
            self.asked_question_ids.push(id.to_string());
        }
    }

    /// Adds `id` unless already present.
    pub fn mark_shown(&mut self, id: &str) {
        if !self.shown_instruction_ids.iter().any(|s| s == id) {
            self.shown_instruction_ids.push(id.to_string());
        }
    }

    pub fn was_shown(&self, id: &str) -> bool {
        self.shown_instruction_ids.iter().any(|s| s == id)
    }

    pub fn record_answer(&mut self, answer: &str) {
        let question = self.current_question_text.clone().unwrap_or_default();
        self.answers.push(AnswerRecord {
            question,
            answer: answer.to_string(),
        });
    }

    pub fn answer_texts(&self) -> Vec<String> {
        self.answers.iter().map(|a| a.answer.clone()).collect()
    }

    pub fn last_answer(&self) -> &str {
        self.answers.last().map(|a| a.answer.as_str()).unwrap_or("")
    }

    /// Remember what is on screen so the next answer can be matched.
    pub fn set_current_question(&mut self, id: Option<&str>, text: &str, options: &[String]) {
        self.current_question_id = id.map(str::to_string);
        self.current_question_text = Some(text.to_string());
        self.current_question_options = options.to_vec();
        self.option_map_attempts = 0;
    }

    /// The number of distinct questions the gate counts.
    pub fn question_count(&self) -> usize {
        self.asked_question_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_asked_has_no_duplicates() {
        let mut state = DiagnosticState::new();
        state.record_asked("first_question");
        state.record_asked("low_oil_level");
        state.record_asked("first_question");
        state.record_asked("");
        assert_eq!(state.asked_question_ids, vec!["first_question", "low_oil_level"]);
    }

    #[test]
    fn test_round_trip_uses_camel_case() {
        let mut state = DiagnosticState::new();
        state.detected_light_type = Some("tpms_light".into());
        state.active_flow = Some(ActiveFlow::Kb);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["detectedLightType"], "tpms_light");
        assert_eq!(json["activeFlow"], "KB");
        assert_eq!(json["lightSeverity"], "caution");

        let back: DiagnosticState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_partial_context_deserializes() {
        let state: DiagnosticState =
            serde_json::from_str(r#"{"detectedLightType":"brake_light"}"#).unwrap();
        assert_eq!(state.detected_light_type.as_deref(), Some("brake_light"));
        assert!(state.asked_question_ids.is_empty());
        assert!(state.active_flow.is_none());
    }

    #[test]
    fn test_vehicle_describe() {
        let v = VehicleInfo {
            make: "Mazda".into(),
            model: "3".into(),
            year: "2017".into(),
            plate: Some("12-345-67".into()),
        };
        assert_eq!(v.describe(), "Mazda 3 2017 (12-345-67)");
        assert_eq!(VehicleInfo::default().describe(), "Unknown vehicle");
    }
}
