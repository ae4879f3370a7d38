//! Context analyzer: route the opening message of a conversation.

use crate::knowledge::{Knowledge, KnowledgeBase, LightSeverity, MappingKind, Severity};
use crate::safety::{self, contains_non_negated, SafetyRule};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

pub const LIGHT_PICKER_OTHER: &str = "Other / not sure, I'll describe it";
const LIGHT_PICKER_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    SafetyStop(&'static SafetyRule),
    WarningLight { light_id: String, severity: LightSeverity },
    StartScenario(String),
    ConsultAi,
}

/// Safety, then symptom mappings, then light names, then a picker choice.
pub fn analyze_context(text: &str, knowledge: &Knowledge) -> Analysis {
    if text.trim().is_empty() {
        return Analysis::ConsultAi;
    }

    if let Some(rule) = safety::scan(text).filter(|r| r.is_critical()) {
        return Analysis::SafetyStop(rule);
    }

    for mapping in knowledge.symptoms.mappings() {
        if !mapping.keywords.iter().any(|k| contains_non_negated(text, k)) {
            continue;
        }
        match mapping.kind {
            MappingKind::Light => {
                if let Some(light) = knowledge.kb.get(&mapping.target_id) {
                    info!(light = %light.id, "Symptom mapped to light");
                    return Analysis::WarningLight {
                        light_id: light.id.clone(),
                        severity: light_severity(light.severity),
                    };
                }
            }
            MappingKind::Scenario => {
                if knowledge.scenarios.contains_key(&mapping.target_id) {
                    info!(scenario = %mapping.target_id, "Symptom mapped to scenario");
                    return Analysis::StartScenario(mapping.target_id.clone());
                }
            }
            MappingKind::Safety => {
                if let Some(rule) = safety::rule(&mapping.target_id) {
                    info!(rule = rule.id, "Symptom mapped to safety rule");
                    return Analysis::SafetyStop(rule);
                }
            }
        }
        debug!(target = %mapping.target_id, "Symptom mapping target missing");
    }

    if let Some(light) = knowledge
        .kb
        .lights()
        .find(|l| l.all_names().any(|name| contains_non_negated(text, name)))
    {
        info!(light = %light.id, "Direct light name match");
        return Analysis::WarningLight {
            light_id: light.id.clone(),
            severity: light_severity(light.severity),
        };
    }

    if let Some(light) = extract_light_id_from_picker(text).and_then(|id| knowledge.kb.get(&id)) {
        info!(light = %light.id, "Light picked from list");
        return Analysis::WarningLight {
            light_id: light.id.clone(),
            severity: light_severity(light.severity),
        };
    }

    debug!("No routing match, consulting the model");
    Analysis::ConsultAi
}

pub fn light_severity(severity: Severity) -> LightSeverity {
    severity.light_severity()
}

/// Picker entries: most severe lights first, then the "other" escape.
pub fn light_picker_options(kb: &KnowledgeBase) -> Vec<String> {
    let mut lights: Vec<_> = kb.lights().collect();
    lights.sort_by(|a, b| b.severity.cmp(&a.severity));
    let mut options: Vec<String> = lights
        .into_iter()
        .take(LIGHT_PICKER_LIMIT)
        .map(|l| format!("{} ({})", l.display_name(), l.id))
        .collect();
    options.push(LIGHT_PICKER_OTHER.to_string());
    options
}

fn picker_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([\w_]+)\)").ok()).as_ref()
}

/// `"Oil pressure light (oil_pressure_light)"` → `oil_pressure_light`.
pub fn extract_light_id_from_picker(text: &str) -> Option<String> {
    picker_regex()?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
