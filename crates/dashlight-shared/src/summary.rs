//! User and mechanic summaries attached to every terminal report.
//!
//! Both are built from one [`SummaryFacts`] value so the two audiences
//! always see the same diagnosis, severity and tow decision.

use crate::knowledge::Severity;
use crate::state::{AnswerRecord, DiagnosticState, VehicleInfo};
use serde::{Deserialize, Serialize};

const NO_CLEAR_CAUSE: &str = "No single clear cause identified";
const NEEDS_PRO: &str = "Professional diagnosis required";
const VISIT_GARAGE: &str = "Visit a garage for a check";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub short_description: String,
    pub top_issue: String,
    pub next_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIssue {
    pub issue: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MechanicSummary {
    pub vehicle_info: VehicleInfo,
    pub light_detected: String,
    pub light_name: String,
    pub scenario: String,
    pub scenario_description: String,
    pub conversation_log: Vec<AnswerRecord>,
    pub user_actions_performed: Vec<String>,
    pub top_diagnosis: RankedIssue,
    pub additional_suspects: Vec<RankedIssue>,
    pub recommendation: String,
    /// UI label: critical, high, medium or low.
    pub severity: String,
    pub needs_tow: bool,
    pub formatted_text: String,
}

/// Facts shared by both summaries.
#[derive(Debug, Clone, Default)]
pub struct SummaryFacts<'a> {
    pub light_id: &'a str,
    pub light_name: &'a str,
    pub scenario_id: &'a str,
    pub scenario_description: &'a str,
    /// Name and probability of the lead cause, if any. The report's first
    /// result carries the same probability.
    pub top: Option<(&'a str, f64)>,
    /// Names and scores of the runners-up, already ranked.
    pub additional: Vec<(&'a str, f64)>,
    pub recommendation: &'a str,
    pub severity: Severity,
    pub needs_tow: bool,
}

/// Shown instruction ids that mean the user did something physical.
const ACTIONS_PERFORMED: &[(&[&str], &str)] = &[
    (&["immediate_action"], "Stopped and turned off the engine"),
    (&["check_dipstick_emergency", "check_dipstick"], "Checked the oil level on the dipstick"),
    (&["visual_check_tires"], "Visually inspected the tires"),
    (&["fill_air"], "Inflated the tires"),
];

pub fn actions_performed(shown: &[String]) -> Vec<String> {
    ACTIONS_PERFORMED
        .iter()
        .filter(|(ids, _)| ids.iter().any(|id| shown.iter().any(|s| s == id)))
        .map(|(_, text)| text.to_string())
        .collect()
}

pub fn top_probability(score: f64) -> f64 {
    (0.55 + score * 0.12).min(0.92)
}

pub fn suspect_probability(score: f64) -> f64 {
    (0.45 + score * 0.1).min(0.85)
}

pub fn build_summaries(facts: &SummaryFacts<'_>, state: &DiagnosticState) -> (UserSummary, MechanicSummary) {
    let log: Vec<AnswerRecord> = state
        .answers
        .iter()
        .filter(|a| !a.question.is_empty() && !a.answer.is_empty())
        .cloned()
        .collect();

    let top_diagnosis = match facts.top {
        Some((name, probability)) => RankedIssue {
            issue: name.to_string(),
            probability,
            reasoning: String::new(),
        },
        None => RankedIssue {
            issue: NO_CLEAR_CAUSE.to_string(),
            probability: 0.4,
            reasoning: NEEDS_PRO.to_string(),
        },
    };
    let additional_suspects = facts
        .additional
        .iter()
        .map(|(name, score)| RankedIssue {
            issue: name.to_string(),
            probability: suspect_probability(*score),
            reasoning: String::new(),
        })
        .collect();

    let recommendation = if facts.recommendation.is_empty() {
        VISIT_GARAGE.to_string()
    } else {
        facts.recommendation.to_string()
    };

    let mut mechanic = MechanicSummary {
        vehicle_info: state.vehicle_info.clone(),
        light_detected: facts.light_id.to_string(),
        light_name: facts.light_name.to_string(),
        scenario: facts.scenario_id.to_string(),
        scenario_description: if facts.scenario_description.is_empty() {
            facts.scenario_id.to_string()
        } else {
            facts.scenario_description.to_string()
        },
        conversation_log: log,
        user_actions_performed: actions_performed(&state.shown_instruction_ids),
        top_diagnosis,
        additional_suspects,
        recommendation: recommendation.clone(),
        severity: facts.severity.ui_label().to_string(),
        needs_tow: facts.needs_tow,
        formatted_text: String::new(),
    };
    mechanic.formatted_text = format_mechanic_text(&mechanic);

    let user = user_summary(facts, &mechanic, recommendation);
    (user, mechanic)
}

fn user_summary(facts: &SummaryFacts<'_>, mechanic: &MechanicSummary, recommendation: String) -> UserSummary {
    let mut points: Vec<String> = Vec::new();
    if let Some(first) = mechanic.conversation_log.first() {
        points.push(first.answer.clone());
    }
    for item in &mechanic.conversation_log {
        let answer = item.answer.to_lowercase();
        if answer.contains("stopped") || answer.contains("עצרתי") {
            points.push("You stopped and turned off the engine".to_string());
            break;
        }
        if answer.contains("dipstick") || answer.contains("checked") || answer.contains("מדיד") {
            points.push("You checked the oil dipstick".to_string());
            break;
        }
    }

    let name = if facts.light_name.is_empty() { "A warning light" } else { facts.light_name };
    let mut short_description = format!("{} came on", name);
    if !points.is_empty() {
        short_description.push_str(&format!(". {}", points.join(". ")));
    }
    let top_issue = facts.top.map(|(n, _)| n).unwrap_or("");
    if !top_issue.is_empty() {
        short_description.push_str(&format!(". Found: {}.", top_issue));
    }

    UserSummary {
        short_description,
        top_issue: if top_issue.is_empty() {
            NEEDS_PRO.to_string()
        } else {
            top_issue.to_string()
        },
        next_action: recommendation,
    }
}

fn severity_label(ui: &str) -> &'static str {
    match ui {
        "critical" => "🔴 Critical",
        "high" => "🟠 High",
        "medium" => "🟡 Medium",
        _ => "🟢 Low",
    }
}

pub fn format_mechanic_text(s: &MechanicSummary) -> String {
    let mut lines: Vec<String> = vec!["📋 Diagnostic report".to_string(), "═".repeat(30)];

    if !s.vehicle_info.is_empty() {
        lines.push(format!("🚗 Vehicle: {}", s.vehicle_info.describe()));
    }
    lines.push(format!("🔴 Light: {}", s.light_name));
    lines.push(format!("📍 Scenario: {}", s.scenario_description));
    lines.push(String::new());

    lines.push("📝 Conversation:".to_string());
    for item in &s.conversation_log {
        lines.push(format!("• {}", item.answer));
    }
    lines.push(String::new());

    if !s.user_actions_performed.is_empty() {
        lines.push("✅ Actions the customer performed:".to_string());
        for action in &s.user_actions_performed {
            lines.push(format!("• {}", action));
        }
        lines.push(String::new());
    }

    lines.push(format!(
        "🔍 Diagnosis: {} ({}%)",
        s.top_diagnosis.issue,
        (s.top_diagnosis.probability * 100.0).round()
    ));
    if !s.top_diagnosis.reasoning.is_empty() {
        lines.push(format!("   {}", s.top_diagnosis.reasoning));
    }

    if !s.additional_suspects.is_empty() {
        lines.push(String::new());
        lines.push("🔎 Other possibilities:".to_string());
        for suspect in &s.additional_suspects {
            lines.push(format!("• {} ({}%)", suspect.issue, (suspect.probability * 100.0).round()));
        }
    }

    lines.push(String::new());
    lines.push(format!("🛠️ Recommendation: {}", s.recommendation));
    lines.push(format!("⚠️ Severity: {}", severity_label(&s.severity)));

    if s.needs_tow {
        lines.push(String::new());
        lines.push("🚛 Tow required: the vehicle is not safe to drive".to_string());
    }

    lines.join("\n")
}
