//! Produced contract: every turn yields exactly one payload shape plus the
//! updated context the caller passes back verbatim.

use crate::knowledge::{ActionType, Severity};
use crate::state::DiagnosticState;
use crate::summary::{MechanicSummary, UserSummary};
use serde::{Deserialize, Serialize};

/// Status banner color on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Shared bucket thresholds for engine and display confidence.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 0.55 {
            ConfidenceLevel::Low
        } else if confidence < 0.75 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatus {
    pub color: StatusColor,
    pub text: String,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub issue: String,
    pub probability: f64,
    pub explanation: String,
    /// Cosmetic percent from the display tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_percent: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MechanicReport {
    pub top_suspect: String,
    pub score: f64,
    pub severity: Severity,
    pub status: String,
    pub instruction: String,
    #[serde(default)]
    pub tow_conditions: Vec<String>,
    #[serde(default)]
    pub blind_spots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummaries {
    pub user: UserSummary,
    pub mechanic: MechanicSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub title: String,
    /// Engine confidence.
    #[serde(alias = "engineConfidence")]
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    /// Top result's own probability.
    pub display_confidence: f64,
    pub display_confidence_level: ConfidenceLevel,
    pub severity: Severity,
    #[serde(default)]
    pub summary: String,
    pub results: Vec<DiagnosisResult>,
    pub status: ReportStatus,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub disclaimer: String,
    #[serde(default)]
    pub show_tow_button: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tow_conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanic_report: Option<MechanicReport>,
    pub conversation_summaries: ConversationSummaries,
}

pub const DISCLAIMER: &str =
    "This is a preliminary assessment based on your answers. Have a qualified mechanic confirm it.";

impl DiagnosisReport {
    /// Display confidence and its level from the top result.
    pub fn refresh_display_confidence(&mut self) {
        let top = self.results.first().map(|r| r.probability).unwrap_or(self.confidence);
        self.display_confidence = top;
        self.display_confidence_level = ConfidenceLevel::from_confidence(top);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Question {
        text: String,
        options: Vec<String>,
        #[serde(rename = "questionId", default, skip_serializing_if = "Option::is_none")]
        question_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Instruction {
        id: String,
        title: String,
        action_type: ActionType,
        steps: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
    SafetyInstruction {
        text: String,
        question: String,
        options: Vec<String>,
    },
    DiagnosisReport(Box<DiagnosisReport>),
    #[serde(rename_all = "camelCase")]
    SafetyAlert {
        title: String,
        message: String,
        level: AlertLevel,
        stop_chat: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        follow_up_message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_scenario_id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_card: Option<Box<DiagnosisReport>>,
    },
    ScenarioStep {
        step: StepView,
    },
}

impl Payload {
    pub fn question(text: impl Into<String>, options: Vec<String>, id: Option<&str>) -> Self {
        Payload::Question {
            text: text.into(),
            options,
            question_id: id.map(str::to_string),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Question { .. } => "question",
            Payload::Instruction { .. } => "instruction",
            Payload::SafetyInstruction { .. } => "safety_instruction",
            Payload::DiagnosisReport(_) => "diagnosis_report",
            Payload::SafetyAlert { .. } => "safety_alert",
            Payload::ScenarioStep { .. } => "scenario_step",
        }
    }

    /// Options the user can pick from, if any.
    pub fn options(&self) -> &[String] {
        match self {
            Payload::Question { options, .. }
            | Payload::Instruction { options, .. }
            | Payload::SafetyInstruction { options, .. }
            | Payload::SafetyAlert { options, .. } => options,
            Payload::ScenarioStep { step } => &step.options,
            _ => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Payload::DiagnosisReport(_) => true,
            Payload::SafetyAlert { stop_chat, .. } => *stop_chat,
            _ => false,
        }
    }
}

/// One turn's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,
    pub context: DiagnosticState,
    /// Warning-level safety message riding along with a normal payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_note: Option<String>,
    #[serde(default)]
    pub end_conversation: bool,
}

impl Envelope {
    pub fn new(payload: Payload, context: DiagnosticState) -> Self {
        let end_conversation = payload.is_terminal();
        Self {
            payload,
            context,
            safety_note: None,
            end_conversation,
        }
    }

    pub fn with_safety_note(mut self, note: Option<String>) -> Self {
        self.safety_note = note;
        self
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}
