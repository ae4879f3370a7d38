//! Payloads built outside the KB flow: the fixed fallbacks used when
//! nothing else can answer, and reports assembled from a model's diagnosis.

use crate::extract::ModelDiagnosis;
use crate::knowledge::Severity;
use crate::payload::{
    ConfidenceLevel, ConversationSummaries, DiagnosisReport, DiagnosisResult, Payload, ReportStatus,
    StatusColor, DISCLAIMER,
};
use crate::state::DiagnosticState;
use crate::summary::{build_summaries, format_mechanic_text, SummaryFacts};
use crate::synthesis::MAX_CONFIDENCE;

pub const FALLBACK_TITLE: &str = "Professional inspection required";
pub const FALLBACK_ISSUE: &str = "Unidentified fault";
pub const FALLBACK_QUESTION: &str = "I ran into a problem. Please describe the issue again.";
pub const TRY_AGAIN: &str = "Try again";
pub const PREFER_GARAGE: &str = "I'd rather go to a garage";

const FALLBACK_CONFIDENCE: f64 = 0.5;
const VISIT_GARAGE: &str = "Please visit a garage for a professional check.";

pub fn fallback_diagnosis(state: &DiagnosticState) -> DiagnosisReport {
    let light_id = state.detected_light_type.as_deref().unwrap_or("");
    let scenario_id = state.current_light_scenario.as_deref().unwrap_or("");
    let facts = SummaryFacts {
        light_id,
        light_name: light_id,
        scenario_id,
        scenario_description: scenario_id,
        top: None,
        additional: Vec::new(),
        recommendation: VISIT_GARAGE,
        severity: Severity::Moderate,
        needs_tow: false,
    };
    let (user, mut mechanic) = build_summaries(&facts, state);
    mechanic.top_diagnosis.probability = FALLBACK_CONFIDENCE;
    mechanic.formatted_text = format_mechanic_text(&mechanic);

    DiagnosisReport {
        title: FALLBACK_TITLE.to_string(),
        confidence: FALLBACK_CONFIDENCE,
        confidence_level: ConfidenceLevel::from_confidence(FALLBACK_CONFIDENCE),
        display_confidence: FALLBACK_CONFIDENCE,
        display_confidence_level: ConfidenceLevel::from_confidence(FALLBACK_CONFIDENCE),
        severity: Severity::Moderate,
        summary: String::new(),
        results: vec![DiagnosisResult {
            issue: FALLBACK_ISSUE.to_string(),
            probability: FALLBACK_CONFIDENCE,
            explanation: "The diagnosis could not be completed automatically.".to_string(),
            display_percent: None,
        }],
        status: ReportStatus {
            color: StatusColor::Blue,
            text: "Could not complete the diagnosis".to_string(),
            instruction: VISIT_GARAGE.to_string(),
        },
        next_steps: vec![VISIT_GARAGE.to_string()],
        recommendations: vec![
            "Visit a garage for a professional diagnosis".to_string(),
            "Tell the mechanic when the light came on and what you noticed".to_string(),
        ],
        disclaimer: DISCLAIMER.to_string(),
        show_tow_button: false,
        tow_conditions: Vec::new(),
        mechanic_report: None,
        conversation_summaries: ConversationSummaries { user, mechanic },
    }
}

pub fn fallback_report_payload(state: &DiagnosticState) -> Payload {
    Payload::DiagnosisReport(Box::new(fallback_diagnosis(state)))
}

pub fn fallback_question() -> Payload {
    Payload::question(
        FALLBACK_QUESTION,
        vec![TRY_AGAIN.to_string(), PREFER_GARAGE.to_string()],
        None,
    )
}

/// Normalize a model-written diagnosis into a full report. Probabilities
/// are clamped to the engine cap and summaries come from the state.
pub fn model_report(model: &ModelDiagnosis, state: &DiagnosticState) -> DiagnosisReport {
    let severity = model
        .severity
        .as_deref()
        .map(Severity::parse)
        .unwrap_or(Severity::Moderate);

    let mut results: Vec<DiagnosisResult> = model
        .results
        .iter()
        .filter(|r| !r.issue.trim().is_empty())
        .take(3)
        .map(|r| DiagnosisResult {
            issue: r.issue.trim().to_string(),
            probability: r.probability.clamp(0.0, MAX_CONFIDENCE),
            explanation: r.explanation.clone(),
            display_percent: None,
        })
        .collect();
    if results.is_empty() {
        return fallback_diagnosis(state);
    }
    results.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    let confidence = model
        .confidence
        .unwrap_or(results[0].probability)
        .clamp(0.0, MAX_CONFIDENCE);
    let show_tow_button = model.show_tow_button || severity == Severity::Critical;
    let (color, text) = match severity {
        Severity::Critical => (StatusColor::Red, "Immediate attention required!"),
        Severity::High => (StatusColor::Yellow, "Have it checked soon."),
        _ => (StatusColor::Blue, "You can continue carefully and have it checked later."),
    };
    let recommendation = model
        .recommendations
        .first()
        .map(String::as_str)
        .unwrap_or(VISIT_GARAGE);

    let light_id = state.detected_light_type.as_deref().unwrap_or("");
    let facts = SummaryFacts {
        light_id,
        light_name: light_id,
        scenario_id: "",
        scenario_description: "",
        top: Some((results[0].issue.as_str(), results[0].probability)),
        additional: results.iter().skip(1).map(|r| (r.issue.as_str(), 0.0)).collect(),
        recommendation,
        severity,
        needs_tow: show_tow_button,
    };
    let (user, mut mechanic) = build_summaries(&facts, state);
    for (suspect, result) in mechanic.additional_suspects.iter_mut().zip(results.iter().skip(1)) {
        suspect.probability = result.probability;
    }
    mechanic.formatted_text = format_mechanic_text(&mechanic);

    let title = if model.title.trim().is_empty() {
        results[0].issue.clone()
    } else {
        model.title.trim().to_string()
    };
    let mut report = DiagnosisReport {
        title,
        confidence,
        confidence_level: ConfidenceLevel::from_confidence(confidence),
        display_confidence: confidence,
        display_confidence_level: ConfidenceLevel::from_confidence(confidence),
        severity,
        summary: String::new(),
        results,
        status: ReportStatus {
            color,
            text: text.to_string(),
            instruction: recommendation.to_string(),
        },
        next_steps: vec![recommendation.to_string()],
        recommendations: model.recommendations.clone(),
        disclaimer: DISCLAIMER.to_string(),
        show_tow_button,
        tow_conditions: Vec::new(),
        mechanic_report: None,
        conversation_summaries: ConversationSummaries { user, mechanic },
    };
    report.refresh_display_confidence();
    report
}
