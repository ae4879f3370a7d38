//! Scenario-graph engine for free-standing flows ("car won't start",
//! "overheating", "flat tire").
//!
//! Each step offers options; picking one applies weighted `VERIFIES` /
//! `RULES_OUT` deltas to suspects, logs into report buckets, and moves to
//! the next step. An option with no next step ends the flow with a report.

use crate::error::DiagError;
use crate::knowledge::Severity;
use crate::options::match_label;
use crate::payload::{
    AlertLevel, ConfidenceLevel, ConversationSummaries, DiagnosisReport, DiagnosisResult,
    MechanicReport, Payload, ReportStatus, StatusColor, StepView, DISCLAIMER,
};
use crate::state::DiagnosticState;
use crate::summary::{build_summaries, SummaryFacts};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Suspect score that marks a graph report as high severity.
pub const HIGH_SUSPECT_SCORE: i32 = 4;

fn default_weight() -> i32 {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspect {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepAction {
    Verifies {
        suspect_id: String,
        #[serde(default = "default_weight")]
        weight: i32,
    },
    RulesOut {
        suspect_id: String,
        #[serde(default = "default_weight")]
        weight: i32,
    },
    #[serde(alias = "SKIP")]
    Skipped,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAlert {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOption {
    pub label: String,
    /// `None` ends the flow.
    #[serde(default)]
    pub next_step_id: Option<String>,
    #[serde(default)]
    pub actions: Vec<StepAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_alert: Option<StopAlert>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(default)]
    pub id: String,
    pub text: String,
    pub options: Vec<StepOption>,
}

impl ScenarioStep {
    pub fn labels(&self) -> Vec<String> {
        self.options.iter().map(|o| o.label.clone()).collect()
    }

    pub fn view(&self) -> StepView {
        StepView {
            id: self.id.clone(),
            text: self.text.clone(),
            options: self.labels(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphScenario {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub starting_step_id: String,
    #[serde(default)]
    pub suspects: Vec<Suspect>,
    pub steps: IndexMap<String, ScenarioStep>,
}

impl GraphScenario {
    pub fn step(&self, id: &str) -> Result<&ScenarioStep, DiagError> {
        self.steps.get(id).ok_or_else(|| DiagError::UnknownStep {
            scenario: self.id.clone(),
            step: id.to_string(),
        })
    }

    pub fn start_step(&self) -> Result<&ScenarioStep, DiagError> {
        self.step(&self.starting_step_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportData {
    pub verified: Vec<String>,
    pub ruled_out: Vec<String>,
    pub skipped: Vec<String>,
    pub critical_findings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphState {
    pub current_scenario_id: String,
    pub current_step_id: String,
    pub suspects: BTreeMap<String, i32>,
    pub report_data: ReportData,
}

impl GraphState {
    pub fn start(scenario: &GraphScenario) -> Self {
        Self {
            current_scenario_id: scenario.id.clone(),
            current_step_id: scenario.starting_step_id.clone(),
            ..Self::default()
        }
    }

    /// Apply one selected option's actions. Returns true on a stop alert.
    pub fn apply_option(&mut self, step: &ScenarioStep, option: &StepOption) -> bool {
        let log = option.log_text.clone().unwrap_or_else(|| option.label.clone());
        for action in &option.actions {
            match action {
                StepAction::Verifies { suspect_id, weight } => {
                    *self.suspects.entry(suspect_id.clone()).or_insert(0) += weight;
                    self.report_data.verified.push(log.clone());
                }
                StepAction::RulesOut { suspect_id, weight } => {
                    *self.suspects.entry(suspect_id.clone()).or_insert(0) -= weight;
                    self.report_data.ruled_out.push(log.clone());
                }
                StepAction::Skipped => self.report_data.skipped.push(step.text.clone()),
                StepAction::Info => {
                    if option.log_text.is_some() {
                        self.report_data.verified.push(log.clone());
                    }
                }
            }
        }
        debug!(step = %step.id, option = %option.label, suspects = ?self.suspects, "Applied step option");
        match &option.stop_alert {
            Some(alert) => {
                self.report_data.critical_findings.push(alert.message.clone());
                true
            }
            None => false,
        }
    }
}

/// Ranked summary of a finished graph flow.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphReport {
    pub top_suspect: Option<Suspect>,
    pub score: i32,
    pub ranked: Vec<(Suspect, i32)>,
    pub severity: Severity,
    pub has_critical: bool,
    pub status: String,
    pub instruction: String,
    pub tow_conditions: Vec<String>,
    pub blind_spots: Vec<String>,
}

pub fn scenario_report(scenario: &GraphScenario, state: &GraphState) -> GraphReport {
    let mut ranked: Vec<(Suspect, i32)> = scenario
        .suspects
        .iter()
        .map(|s| (s.clone(), state.suspects.get(&s.id).copied().unwrap_or(0)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let score = ranked.first().map(|(_, s)| *s).unwrap_or(0);
    let has_critical = !state.report_data.critical_findings.is_empty();
    let severity = if has_critical || score >= HIGH_SUSPECT_SCORE {
        Severity::High
    } else {
        Severity::Low
    };

    let (status, instruction, tow_conditions): (&str, &str, Vec<&str>) = if has_critical {
        (
            "Stop and get a professional check, or a tow if needed",
            "Do not keep driving. Stop in a safe place and get help.",
            vec!["There is an immediate safety hazard", "The vehicle is not safe to drive"],
        )
    } else if severity == Severity::High {
        (
            "Visit a garage soon",
            "Go to a garage soon for a professional diagnosis.",
            vec!["The car does not start or there is a significant loss of power"],
        )
    } else {
        (
            "Continue carefully and have it checked when you can",
            "If it happens again or gets worse, go to a garage.",
            Vec::new(),
        )
    };

    GraphReport {
        top_suspect: ranked.first().map(|(s, _)| s.clone()),
        score,
        ranked,
        severity,
        has_critical,
        status: status.to_string(),
        instruction: instruction.to_string(),
        tow_conditions: tow_conditions.into_iter().map(str::to_string).collect(),
        blind_spots: state.report_data.skipped.clone(),
    }
}

const GRAPH_TOP_PROBABILITY: f64 = 0.8;

/// Terminal report payload for a graph flow.
pub fn graph_diagnosis(scenario: &GraphScenario, graph: &GraphState, state: &DiagnosticState) -> DiagnosisReport {
    let report = scenario_report(scenario, graph);
    let top_name = report
        .top_suspect
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "Not identified".to_string());
    let confidence = (0.5 + report.score as f64 * 0.1).min(0.9);
    let show_tow_button = report.has_critical || report.severity == Severity::High;

    let mut recommendations = Vec::new();
    if !report.blind_spots.is_empty() {
        recommendations.push(format!("You skipped {} checks", report.blind_spots.len()));
    }
    recommendations.push("Visit a garage".to_string());

    let facts = SummaryFacts {
        light_id: "",
        light_name: &scenario.title,
        scenario_id: &scenario.id,
        scenario_description: &scenario.title,
        top: report.top_suspect.as_ref().map(|s| (s.name.as_str(), GRAPH_TOP_PROBABILITY)),
        additional: report
            .ranked
            .iter()
            .skip(1)
            .take(3)
            .map(|(s, score)| (s.name.as_str(), *score as f64))
            .collect(),
        recommendation: &report.instruction,
        severity: report.severity,
        needs_tow: show_tow_button,
    };
    let (user, mechanic) = build_summaries(&facts, state);

    info!(scenario = %scenario.id, top = %top_name, score = report.score, "Scenario report produced");

    let mut diagnosis = DiagnosisReport {
        title: format!("🔍 Diagnosis: {}", top_name),
        confidence,
        confidence_level: ConfidenceLevel::from_confidence(confidence),
        display_confidence: GRAPH_TOP_PROBABILITY,
        display_confidence_level: ConfidenceLevel::High,
        severity: report.severity,
        summary: graph.report_data.verified.join(", "),
        results: vec![DiagnosisResult {
            issue: top_name.clone(),
            probability: GRAPH_TOP_PROBABILITY,
            explanation: graph.report_data.verified.join(", "),
            display_percent: None,
        }],
        status: ReportStatus {
            color: if report.has_critical { StatusColor::Red } else { StatusColor::Yellow },
            text: report.status.clone(),
            instruction: report.instruction.clone(),
        },
        next_steps: vec!["Visit a garage for a professional diagnosis.".to_string()],
        recommendations,
        disclaimer: DISCLAIMER.to_string(),
        show_tow_button,
        tow_conditions: report.tow_conditions.clone(),
        mechanic_report: Some(MechanicReport {
            top_suspect: top_name,
            score: report.score as f64,
            severity: report.severity,
            status: report.status,
            instruction: report.instruction,
            tow_conditions: report.tow_conditions,
            blind_spots: report.blind_spots,
        }),
        conversation_summaries: ConversationSummaries { user, mechanic },
    };
    diagnosis.refresh_display_confidence();
    diagnosis
}

/// Result of answering the current graph step.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphTurn {
    /// The answer matched no option; re-ask the same step.
    Unmatched(StepView),
    Next(Payload),
    Alert(Payload),
    Finished(Box<DiagnosisReport>),
}

/// Answer the current step of the graph held in `state`.
///
/// `state` is updated in place: suspects, report buckets, current step and
/// the on-screen question. A finished flow clears `graph` and `active_flow`.
pub fn step_turn(scenario: &GraphScenario, state: &mut DiagnosticState, answer: &str) -> Result<GraphTurn, DiagError> {
    let mut graph = state.graph.clone().unwrap_or_else(|| GraphState::start(scenario));
    let step = scenario.step(&graph.current_step_id)?;

    let labels = step.labels();
    let selected = match match_label(&labels, answer) {
        Some(m) => &step.options[m.index],
        None => {
            debug!(step = %step.id, answer, "No step option matched");
            return Ok(GraphTurn::Unmatched(step.view()));
        }
    };

    state.record_answer(&selected.label);
    let stopped = graph.apply_option(step, selected);

    if stopped {
        let alert = selected.stop_alert.clone().unwrap_or(StopAlert {
            title: String::new(),
            message: String::new(),
        });
        info!(scenario = %scenario.id, step = %step.id, "Scenario stop alert");
        state.graph = Some(graph);
        return Ok(GraphTurn::Alert(Payload::SafetyAlert {
            title: alert.title,
            message: alert.message,
            level: AlertLevel::Critical,
            stop_chat: true,
            follow_up_message: None,
            next_scenario_id: None,
            options: Vec::new(),
            final_card: None,
        }));
    }

    match &selected.next_step_id {
        None => {
            let report = graph_diagnosis(scenario, &graph, state);
            state.graph = None;
            state.active_flow = None;
            Ok(GraphTurn::Finished(Box::new(report)))
        }
        Some(next_id) => {
            let next = scenario.step(next_id)?;
            graph.current_step_id = next.id.clone();
            let view = next.view();
            state.set_current_question(Some(&next.id), &next.text, &view.options);
            state.graph = Some(graph);
            Ok(GraphTurn::Next(Payload::ScenarioStep { step: view }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Knowledge;

    #[test]
    fn test_actions_move_suspects() {
        let k = Knowledge::embedded().unwrap();
        let scenario = k.graph("overheating").unwrap();
        let step = scenario.step("check_coolant").unwrap();
        let mut graph = GraphState::start(scenario);
        graph.apply_option(step, &step.options[1]);
        assert_eq!(graph.suspects["coolant_leak"], -2);
        assert_eq!(graph.suspects["radiator"], 1);
        assert_eq!(graph.report_data.ruled_out, vec!["Coolant level normal"]);
    }

    #[test]
    fn test_skip_logs_step() {
        let k = Knowledge::embedded().unwrap();
        let scenario = k.graph("overheating").unwrap();
        let step = scenario.step("check_fan").unwrap();
        let mut graph = GraphState::start(scenario);
        graph.apply_option(step, &step.options[2]);
        assert!(graph.suspects.is_empty());
        assert_eq!(graph.report_data.skipped, vec![step.text.clone()]);
    }

    #[test]
    fn test_report_severity() {
        let k = Knowledge::embedded().unwrap();
        let scenario = k.graph("overheating").unwrap();
        let mut graph = GraphState::start(scenario);
        graph.suspects.insert("fan_failure".into(), 3);
        let report = scenario_report(scenario, &graph);
        assert_eq!(report.severity, Severity::Low);
        assert_eq!(report.top_suspect.unwrap().id, "fan_failure");

        graph.suspects.insert("fan_failure".into(), 4);
        assert_eq!(scenario_report(scenario, &graph).severity, Severity::High);

        graph.suspects.clear();
        graph.report_data.critical_findings.push("boiling".into());
        let report = scenario_report(scenario, &graph);
        assert_eq!(report.severity, Severity::High);
        assert!(report.has_critical);
    }

    #[test]
    fn test_unknown_step() {
        let k = Knowledge::embedded().unwrap();
        let scenario = k.graph("flat_tire").unwrap();
        assert_eq!(scenario.step("nowhere").unwrap_err().code(), "unknown_step");
    }
}
