//! Diagnosis synthesizer: ranked causes to a final report.
//!
//! Engine confidence is three additive terms clamped to [`MAX_CONFIDENCE`]:
//! - a base tier picked by the evidence (0.40, 0.50, 0.55 or 0.60)
//! - a boost proportional to the top score
//! - a small boost per answer given
//!
//! Display confidence is the top result's own probability. The two are
//! reported side by side and never merged.

use crate::gate::{DIAGNOSIS_THRESHOLD, POSITIVE_SCORE};
use crate::knowledge::{Polarity, Scenario, Severity, WarningLight};
use crate::payload::{
    ConfidenceLevel, ConversationSummaries, DiagnosisReport, DiagnosisResult, MechanicReport,
    ReportStatus, StatusColor, DISCLAIMER,
};
use crate::scoring::{infer_polarity, rank_causes, Scores};
use crate::state::DiagnosticState;
use crate::summary::{build_summaries, top_probability, SummaryFacts};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MAX_CONFIDENCE: f64 = 0.92;

/// Lights that always produce a critical report.
pub const CRITICAL_LIGHTS: &[&str] = &["oil_pressure_light", "coolant_temperature_light", "brake_light"];

const DEFAULT_TOW_CONDITIONS: &[&str] = &[
    "The light is red or flashing, or there are unusual noises",
    "There is a significant loss of power or a burning smell",
];
const NO_CLEAR_CAUSE: &str = "No single clear cause identified";
const NO_EVIDENCE_PROBABILITY: f64 = 0.40;
const VISIT_GARAGE: &str = "Visit a garage for a professional diagnosis.";
const ELIMINATION_DISCLAIMER: &str =
    "This assessment rests only on ruling out other causes, with no positive indication. A professional check is strongly recommended.";

/// Cosmetic percent tables per display level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTables {
    pub high: Vec<u32>,
    pub medium: Vec<u32>,
    pub low: Vec<u32>,
}

impl Default for DisplayTables {
    fn default() -> Self {
        Self {
            high: vec![85, 10, 5],
            medium: vec![65, 25, 10],
            low: vec![45, 35, 20],
        }
    }
}

impl DisplayTables {
    /// The table for `level`, truncated or zero-padded to `n`.
    pub fn display_probabilities(&self, level: ConfidenceLevel, n: usize) -> Vec<u32> {
        let table = match level {
            ConfidenceLevel::High => &self.high,
            ConfidenceLevel::Medium => &self.medium,
            ConfidenceLevel::Low => &self.low,
        };
        (0..n).map(|i| table.get(i).copied().unwrap_or(0)).collect()
    }
}

/// Engine confidence from the top score and the number of answers.
pub fn engine_confidence(top_score: f64, answer_count: usize, critical: bool) -> f64 {
    let positive = top_score > 0.0;
    let (base, boost) = if !positive {
        (0.40, 0.0)
    } else if top_score < 1.0 {
        (0.50, top_score * 0.15)
    } else {
        (if critical { 0.60 } else { 0.55 }, (top_score * 0.12).min(0.25))
    };
    let answers = answer_count as f64;
    let answer_boost = if positive {
        (answers * 0.02).min(0.10)
    } else {
        (answers * 0.01).min(0.05)
    };
    let total = (base + boost + answer_boost).min(MAX_CONFIDENCE);
    debug!(top_score, base, boost, answer_boost, total, "Engine confidence");
    total
}

pub fn is_critical_light(light_id: &str) -> bool {
    CRITICAL_LIGHTS.contains(&light_id)
}

/// Final severity of a KB diagnosis.
pub fn report_severity(light_id: &str, scenario: &Scenario, top_score: f64) -> Severity {
    if scenario.severity == Severity::Critical || is_critical_light(light_id) {
        Severity::Critical
    } else if scenario.severity == Severity::High || top_score >= DIAGNOSIS_THRESHOLD {
        Severity::High
    } else {
        scenario.severity
    }
}

fn result_explanation(cause_symptoms: &[String], top_score: f64, positive_answers: &[String]) -> String {
    if top_score <= 0.0 {
        return "Diagnosed by ruling out other options. A professional check is recommended.".to_string();
    }
    if top_score >= 2.0 && !cause_symptoms.is_empty() {
        return cause_symptoms.join(" • ");
    }
    positive_answers
        .first()
        .cloned()
        .unwrap_or_else(|| "Based on the answers you gave".to_string())
}

/// Build the report for a finished KB conversation.
pub fn generate_diagnosis(
    light: &WarningLight,
    scenario: &Scenario,
    scores: &Scores,
    state: &DiagnosticState,
    tables: &DisplayTables,
) -> DiagnosisReport {
    let ranked = rank_causes(scenario, scores);
    let top = ranked.first().copied();
    let top_score = top.map(|(_, s)| s).unwrap_or(0.0);

    let severity = report_severity(&light.id, scenario, top_score);
    let critical = severity == Severity::Critical;
    let show_tow_button = severity >= Severity::High;

    let mechanic_advice = scenario
        .go_to_mechanic
        .as_ref()
        .and_then(|a| a.for_severity(severity))
        .map(str::to_string);
    let tow_conditions: Vec<String> = if !scenario.tow_conditions.is_empty() {
        scenario.tow_conditions.clone()
    } else if critical {
        DEFAULT_TOW_CONDITIONS.iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    };

    let (status_color, status_text) = match severity {
        Severity::Critical => (StatusColor::Red, "Immediate attention required!"),
        Severity::High => (StatusColor::Yellow, "Have it checked soon."),
        _ => (StatusColor::Blue, "You can continue carefully and have it checked later."),
    };
    let status_instruction = if critical {
        scenario
            .immediate_action
            .clone()
            .or_else(|| mechanic_advice.clone())
            .unwrap_or_else(|| "Stop now and do not continue driving!".to_string())
    } else {
        mechanic_advice
            .clone()
            .or_else(|| scenario.recommendation.clone())
            .unwrap_or_else(|| "A professional check at a garage is recommended.".to_string())
    };

    let positive_answers: Vec<String> = state
        .answers
        .iter()
        .filter(|a| infer_polarity(&a.answer) == Polarity::Yes && !a.question.is_empty())
        .map(|a| a.question.chars().take(80).collect())
        .collect();

    let confidence = engine_confidence(top_score, state.answers.len(), critical);
    let confidence_level = ConfidenceLevel::from_confidence(confidence);

    let lead_probability = match top {
        Some((_, score)) if score > 0.0 => top_probability(score),
        _ => NO_EVIDENCE_PROBABILITY,
    };
    let mut results: Vec<DiagnosisResult> = match top {
        Some((cause, score)) => {
            let mut results = vec![DiagnosisResult {
                issue: cause.name.clone(),
                probability: lead_probability,
                explanation: result_explanation(&cause.symptoms, score, &positive_answers),
                display_percent: None,
            }];
            results.extend(
                ranked
                    .iter()
                    .skip(1)
                    .filter(|(_, s)| *s > POSITIVE_SCORE)
                    .take(2)
                    .map(|(c, s)| DiagnosisResult {
                        issue: c.name.clone(),
                        probability: (0.45 + s * 0.1).min(0.85).min(top_probability(score)),
                        explanation: "Also consistent with your answers".to_string(),
                        display_percent: None,
                    }),
            );
            results
        }
        None => vec![DiagnosisResult {
            issue: NO_CLEAR_CAUSE.to_string(),
            probability: lead_probability,
            explanation: "More information or a professional check at a garage is needed.".to_string(),
            display_percent: None,
        }],
    };

    let display_confidence = results.first().map(|r| r.probability).unwrap_or(confidence);
    let display_level = ConfidenceLevel::from_confidence(display_confidence);
    let percents = tables.display_probabilities(display_level, results.len());
    for (result, pct) in results.iter_mut().zip(percents) {
        result.display_percent = Some(pct);
    }

    let recommendation = scenario
        .recommendation
        .clone()
        .or_else(|| mechanic_advice.clone())
        .unwrap_or_else(|| VISIT_GARAGE.to_string());
    let mut recommendations: Vec<String> = Vec::new();
    if let Some(advice) = &mechanic_advice {
        recommendations.push(advice.clone());
    }
    if let Some(first) = tow_conditions.first() {
        recommendations.push(format!("Call a tow truck if: {}", first));
    }

    let blind_spots: Vec<String> = state
        .answers
        .iter()
        .filter(|a| infer_polarity(&a.answer) == Polarity::Unknown && !a.question.is_empty())
        .map(|a| a.question.clone())
        .collect();

    let light_name = light.display_name();
    let additional: Vec<(&str, f64)> = ranked
        .iter()
        .skip(1)
        .take(3)
        .map(|(c, s)| (c.name.as_str(), *s))
        .collect();
    let facts = SummaryFacts {
        light_id: &light.id,
        light_name,
        scenario_id: &scenario.id,
        scenario_description: &scenario.description,
        top: top.map(|(c, _)| (c.name.as_str(), lead_probability)),
        additional,
        recommendation: &recommendation,
        severity,
        needs_tow: show_tow_button,
    };
    let (user, mechanic) = build_summaries(&facts, state);

    info!(
        light = %light.id,
        scenario = %scenario.id,
        top = top.map(|(c, _)| c.id.as_str()).unwrap_or("none"),
        top_score,
        confidence,
        level = ?confidence_level,
        display_level = ?display_level,
        severity = %severity,
        "Diagnosis produced"
    );

    DiagnosisReport {
        title: format!("Diagnosis: {}", light_name),
        confidence,
        confidence_level,
        display_confidence,
        display_confidence_level: display_level,
        severity,
        summary: positive_answers.iter().take(4).cloned().collect::<Vec<_>>().join("; "),
        results,
        status: ReportStatus {
            color: status_color,
            text: status_text.to_string(),
            instruction: status_instruction.clone(),
        },
        next_steps: vec![recommendation],
        recommendations,
        disclaimer: if top_score > 0.0 {
            DISCLAIMER.to_string()
        } else {
            ELIMINATION_DISCLAIMER.to_string()
        },
        show_tow_button,
        tow_conditions: tow_conditions.clone(),
        mechanic_report: Some(MechanicReport {
            top_suspect: top.map(|(c, _)| c.name.clone()).unwrap_or_else(|| "Not identified".to_string()),
            score: top_score,
            severity,
            status: status_text.to_string(),
            instruction: status_instruction,
            tow_conditions,
            blind_spots,
        }),
        conversation_summaries: ConversationSummaries { user, mechanic },
    }
}
