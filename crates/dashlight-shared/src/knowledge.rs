//! Static knowledge base: warning lights, scenarios, causes and self-fix actions.
//!
//! The KB is a JSON object keyed by light id. It is loaded once, never
//! mutated, and shared by reference across turns through [`Knowledge`].

use crate::error::DiagError;
use crate::graph::GraphScenario;
use crate::options;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const EMBEDDED_LIGHTS: &str = include_str!("../data/warning_lights.json");
const EMBEDDED_SYMPTOMS: &str = include_str!("../data/car_symptoms.json");
const EMBEDDED_SCENARIOS: &str = include_str!("../data/scenarios.json");

/// Default prior for causes that do not declare one.
pub const DEFAULT_PROBABILITY: f64 = 0.5;

// ============================================================================
// Severity
// ============================================================================

/// Risk class of a light or scenario.
///
/// Parsing is tolerant: `medium`, `caution` and anything unknown become
/// `Moderate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Moderate,
    High,
    Critical,
}

impl Severity {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "low" => Severity::Low,
            _ => Severity::Moderate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Label shown to users and mechanics.
    pub fn ui_label(&self) -> &'static str {
        match self {
            Severity::Moderate => "medium",
            other => other.as_str(),
        }
    }

    /// Gate class used by the diagnosis gate.
    pub fn light_severity(&self) -> LightSeverity {
        match self {
            Severity::Critical | Severity::High => LightSeverity::Danger,
            _ => LightSeverity::Caution,
        }
    }
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        Severity::parse(&raw)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Two-level class the gate works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightSeverity {
    Danger,
    #[default]
    Caution,
}

// ============================================================================
// Questions and options
// ============================================================================

/// An offered answer: a bare label or an `{id, label}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KbOption {
    Labeled { id: String, label: String },
    Plain(String),
}

impl KbOption {
    pub fn label(&self) -> &str {
        match self {
            KbOption::Labeled { label, .. } => label,
            KbOption::Plain(label) => label,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            KbOption::Labeled { id, .. } => Some(id),
            KbOption::Plain(_) => None,
        }
    }

    /// Id when present, otherwise the label.
    pub fn key(&self) -> &str {
        self.id().unwrap_or_else(|| self.label())
    }
}

impl From<&str> for KbOption {
    fn from(label: &str) -> Self {
        KbOption::Plain(label.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KbQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<KbOption>,
    /// Per-option follow-up questions keyed by option id.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub followups: IndexMap<String, KbQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_for_steady: Option<Box<KbQuestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_for_flashing: Option<Box<KbQuestion>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub resolution_paths: IndexMap<String, ResolutionPath>,
}

impl KbQuestion {
    pub fn option_labels(&self) -> Vec<String> {
        options::option_labels(&self.options)
    }
}

/// Answer classification relative to a cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Yes,
    No,
    Unknown,
    UncertainProbable,
}

/// Value of a `score_mapping` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMapping {
    Confirms,
    RulesOut,
    Unknown,
    UncertainProbable,
}

impl ScoreMapping {
    pub fn polarity(self) -> Polarity {
        match self {
            ScoreMapping::Confirms => Polarity::Yes,
            ScoreMapping::RulesOut => Polarity::No,
            ScoreMapping::Unknown => Polarity::Unknown,
            ScoreMapping::UncertainProbable => Polarity::UncertainProbable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyQuestion {
    /// Defaults to the owning cause id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<KbOption>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub answers: BTreeMap<String, Polarity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub score_mapping: BTreeMap<String, ScoreMapping>,
}

// ============================================================================
// Causes and self-fix actions
// ============================================================================

fn default_probability() -> f64 {
    DEFAULT_PROBABILITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cause {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_question: Option<KeyQuestion>,
}

impl Cause {
    /// Id under which this cause's key question is asked.
    pub fn question_id(&self) -> &str {
        self.key_question
            .as_ref()
            .and_then(|q| q.id.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    #[default]
    Inspect,
    Fill,
    Adjust,
    Safety,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    First,
    Standard,
    OnlyIfSafe,
    AfterCooldown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfFixAction {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "actionType")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_question: Option<KbQuestion>,
}

impl SelfFixAction {
    /// Only reachable through explicit resolution-path routing.
    pub fn is_routed_only(&self) -> bool {
        matches!(
            self.priority,
            Some(Priority::AfterCooldown) | Some(Priority::OnlyIfSafe)
        )
    }

    pub fn followup_labels(&self) -> Vec<String> {
        self.followup_question
            .as_ref()
            .map(|q| {
                q.options
                    .iter()
                    .map(|o| o.label().to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Resolution paths
// ============================================================================

/// Outcome branch of a self-fix follow-up answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    ResolvedTemp,
    NeedsMoreInfo,
    NeedsVerification,
    NeedsInspection,
    NeedsMechanic,
    NeedsMechanicUrgent,
    NeedsTow,
    NeedsAttention,
    WaitAndVerify,
    Pending,
    Critical,
    ContinueDiagnosis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPath {
    pub status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question: Option<Box<KbQuestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_returns: Option<String>,
}

impl ResolutionPath {
    pub fn new(status: ResolutionStatus) -> Self {
        Self {
            status,
            diagnosis: None,
            recommendation: None,
            message: None,
            next_steps: Vec::new(),
            next_question: None,
            next_action: None,
            if_returns: None,
        }
    }
}

// ============================================================================
// Scenarios and lights
// ============================================================================

/// `go_to_mechanic` advice: free text or urgency-keyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MechanicAdvice {
    Text(String),
    Timed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        immediately: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        soon: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_service: Option<String>,
    },
}

impl MechanicAdvice {
    /// Picks the advice matching the final report severity.
    pub fn for_severity(&self, severity: Severity) -> Option<&str> {
        match self {
            MechanicAdvice::Text(text) => Some(text),
            MechanicAdvice::Timed {
                immediately,
                soon,
                next_service,
            } => {
                if severity == Severity::Critical {
                    if let Some(text) = immediately {
                        return Some(text);
                    }
                }
                if severity >= Severity::High {
                    if let Some(text) = soon {
                        return Some(text);
                    }
                }
                next_service
                    .as_deref()
                    .or(soon.as_deref())
                    .or(immediately.as_deref())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_to_mechanic: Option<MechanicAdvice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub causes: Vec<Cause>,
    #[serde(default)]
    pub self_fix_actions: Vec<SelfFixAction>,
    #[serde(default)]
    pub tow_conditions: Vec<String>,
}

impl Scenario {
    pub fn action(&self, id: &str) -> Option<&SelfFixAction> {
        self.self_fix_actions.iter().find(|a| a.id == id)
    }

    pub fn cause(&self, id: &str) -> Option<&Cause> {
        self.causes.iter().find(|c| c.id == id)
    }

    pub fn cause_for_question(&self, question_id: &str) -> Option<&Cause> {
        self.causes.iter().find(|c| c.question_id() == question_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarningLight {
    #[serde(default)]
    pub id: String,
    /// Localized names keyed by language code.
    #[serde(default)]
    pub names: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub first_question: KbQuestion,
    #[serde(default)]
    pub scenarios: IndexMap<String, Scenario>,
}

impl WarningLight {
    /// First English name, else any name, else the id.
    pub fn display_name(&self) -> &str {
        self.names
            .get("en")
            .and_then(|names| names.first())
            .or_else(|| self.names.values().flatten().next())
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.names.values().flatten().map(String::as_str)
    }

    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.get(id)
    }
}

/// All warning lights, in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeBase {
    lights: IndexMap<String, WarningLight>,
}

impl KnowledgeBase {
    pub fn from_json(text: &str) -> Result<Self, DiagError> {
        let mut kb: KnowledgeBase = serde_json::from_str(text)?;
        kb.fill_ids();
        Ok(kb)
    }

    pub fn from_lights(lights: IndexMap<String, WarningLight>) -> Self {
        let mut kb = Self { lights };
        kb.fill_ids();
        kb
    }

    /// Ids live in map keys on disk; copy them into the values.
    fn fill_ids(&mut self) {
        for (light_id, light) in self.lights.iter_mut() {
            if light.id.is_empty() {
                light.id = light_id.clone();
            }
            for (scenario_id, scenario) in light.scenarios.iter_mut() {
                if scenario.id.is_empty() {
                    scenario.id = scenario_id.clone();
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&WarningLight> {
        self.lights.get(id)
    }

    pub fn light(&self, id: &str) -> Result<&WarningLight, DiagError> {
        self.get(id)
            .ok_or_else(|| DiagError::UnknownLight(id.to_string()))
    }

    pub fn scenario(&self, light_id: &str, scenario_id: &str) -> Result<&Scenario, DiagError> {
        self.light(light_id)?
            .scenario(scenario_id)
            .ok_or_else(|| DiagError::UnknownScenario {
                owner: light_id.to_string(),
                scenario: scenario_id.to_string(),
            })
    }

    pub fn lights(&self) -> impl Iterator<Item = &WarningLight> {
        self.lights.values()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

// ============================================================================
// Symptom mappings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    Light,
    Scenario,
    Safety,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomMapping {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(rename = "type")]
    pub kind: MappingKind,
    #[serde(alias = "targetId", default)]
    pub target_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomGroup {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub mappings: Vec<SymptomMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomCatalog {
    #[serde(default)]
    pub symptoms: Vec<SymptomGroup>,
}

impl SymptomCatalog {
    pub fn mappings(&self) -> impl Iterator<Item = &SymptomMapping> {
        self.symptoms.iter().flat_map(|g| g.mappings.iter())
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Everything the engine reads: lights, symptom mappings, scenario graphs.
#[derive(Debug, Clone, Default)]
pub struct Knowledge {
    pub kb: KnowledgeBase,
    pub symptoms: SymptomCatalog,
    pub scenarios: IndexMap<String, GraphScenario>,
}

impl Knowledge {
    /// The KB compiled into the crate.
    pub fn embedded() -> Result<Self, DiagError> {
        let knowledge = Self {
            kb: KnowledgeBase::from_json(EMBEDDED_LIGHTS)?,
            symptoms: serde_json::from_str(EMBEDDED_SYMPTOMS)?,
            scenarios: parse_scenarios(EMBEDDED_SCENARIOS)?,
        };
        debug!(
            lights = knowledge.kb.len(),
            scenarios = knowledge.scenarios.len(),
            "Loaded embedded knowledge"
        );
        Ok(knowledge)
    }

    /// Replace the embedded lights and/or scenario graphs with files on disk.
    pub fn from_paths(kb_path: Option<&Path>, scenarios_path: Option<&Path>) -> Result<Self, DiagError> {
        let mut knowledge = Self::embedded()?;
        if let Some(path) = kb_path {
            let text = std::fs::read_to_string(path)?;
            knowledge.kb = KnowledgeBase::from_json(&text)?;
            info!(path = %path.display(), lights = knowledge.kb.len(), "Loaded knowledge base");
        }
        if let Some(path) = scenarios_path {
            let text = std::fs::read_to_string(path)?;
            knowledge.scenarios = parse_scenarios(&text)?;
            info!(path = %path.display(), scenarios = knowledge.scenarios.len(), "Loaded scenario graphs");
        }
        Ok(knowledge)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn graph(&self, id: &str) -> Result<&GraphScenario, DiagError> {
        self.scenarios.get(id).ok_or_else(|| DiagError::UnknownScenario {
            owner: "scenario graphs".to_string(),
            scenario: id.to_string(),
        })
    }
}

fn parse_scenarios(text: &str) -> Result<IndexMap<String, GraphScenario>, DiagError> {
    let mut scenarios: IndexMap<String, GraphScenario> = serde_json::from_str(text)?;
    for (id, scenario) in scenarios.iter_mut() {
        if scenario.id.is_empty() {
            scenario.id = id.clone();
        }
    }
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing_is_tolerant() {
        assert_eq!(Severity::parse("critical"), Severity::Critical);
        assert_eq!(Severity::parse("HIGH"), Severity::High);
        assert_eq!(Severity::parse("medium"), Severity::Moderate);
        assert_eq!(Severity::parse("caution"), Severity::Moderate);
        assert_eq!(Severity::parse("whatever"), Severity::Moderate);
        assert_eq!(Severity::parse("danger"), Severity::Moderate);
        assert_eq!(Severity::Moderate.ui_label(), "medium");
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, Severity::Moderate);
    }

    #[test]
    fn test_option_shapes() {
        let opts: Vec<KbOption> =
            serde_json::from_str(r#"["Yes", {"id": "a", "label": "Alpha"}]"#).unwrap();
        assert_eq!(opts[0].label(), "Yes");
        assert_eq!(opts[0].id(), None);
        assert_eq!(opts[1].key(), "a");
        assert_eq!(opts[1].label(), "Alpha");
    }

    #[test]
    fn test_mechanic_advice_by_severity() {
        let advice = MechanicAdvice::Timed {
            immediately: Some("tow".into()),
            soon: Some("today".into()),
            next_service: Some("later".into()),
        };
        assert_eq!(advice.for_severity(Severity::Critical), Some("tow"));
        assert_eq!(advice.for_severity(Severity::High), Some("today"));
        assert_eq!(advice.for_severity(Severity::Low), Some("later"));
    }

    #[test]
    fn test_embedded_knowledge_loads() {
        let knowledge = Knowledge::embedded().unwrap();
        let oil = knowledge.kb.light("oil_pressure_light").unwrap();
        assert_eq!(oil.id, "oil_pressure_light");
        assert_eq!(oil.severity, Severity::Critical);
        let scenario = oil.scenario("while_driving").unwrap();
        assert_eq!(scenario.id, "while_driving");
        assert!(scenario.immediate_action.is_some());
        assert!(knowledge.scenarios.contains_key("car_wont_start"));
        assert!(knowledge.symptoms.mappings().count() > 0);
    }

    #[test]
    fn test_cause_question_id_defaults_to_cause_id() {
        let knowledge = Knowledge::embedded().unwrap();
        let scenario = knowledge.kb.scenario("tpms_light", "flashing").unwrap();
        let cause = scenario.cause("sensor_fault").unwrap();
        assert_eq!(cause.question_id(), "sensor_fault");
        assert!(scenario.cause_for_question("sensor_fault").is_some());
    }

    #[test]
    fn test_unknown_light_error() {
        let knowledge = Knowledge::embedded().unwrap();
        let err = knowledge.kb.light("flux_capacitor_light").unwrap_err();
        assert_eq!(err.code(), "unknown_light");
    }
}
