//! Knowledge base validation.
//!
//! Collects every problem instead of stopping at the first one. A light
//! without scenarios is a warning; everything else here is an error.

use crate::graph::{GraphScenario, StepAction};
use crate::knowledge::{KbQuestion, Knowledge, KnowledgeBase, ResolutionPath, Scenario, SymptomCatalog};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: String) {
        self.errors.push(msg);
    }

    fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_kb(kb: &KnowledgeBase) -> ValidationReport {
    let mut report = ValidationReport::default();
    if kb.is_empty() {
        report.error("knowledge base has no lights".to_string());
    }

    for light in kb.lights() {
        let at = format!("light({})", light.id);
        if light.all_names().next().is_none() {
            report.error(format!("{}: names missing", at));
        }
        validate_question(&light.first_question, &format!("{}.first_question", at), true, &mut report);

        if light.scenarios.is_empty() {
            report.warn(format!("{}: has no scenarios", at));
        }
        for scenario in light.scenarios.values() {
            validate_scenario(scenario, &format!("{}.scenario({})", at, scenario.id), &mut report);
        }
    }
    report
}

fn validate_question(q: &KbQuestion, at: &str, needs_options: bool, report: &mut ValidationReport) {
    if q.text.trim().is_empty() {
        report.error(format!("{}: text missing", at));
    }
    if needs_options && q.options.is_empty() {
        report.error(format!("{}: options must not be empty", at));
    }
    let mut ids = HashSet::new();
    for option in &q.options {
        if option.label().trim().is_empty() {
            report.error(format!("{}: option label missing", at));
        }
        if let Some(id) = option.id() {
            if id.trim().is_empty() {
                report.error(format!("{}: option id missing", at));
            } else if !ids.insert(id) {
                report.error(format!("{}: duplicate option id \"{}\"", at, id));
            }
        }
    }
    for (key, followup) in &q.followups {
        validate_question(followup, &format!("{}.followups({})", at, key), true, report);
    }
}

fn validate_scenario(scenario: &Scenario, at: &str, report: &mut ValidationReport) {
    let mut cause_ids = HashSet::new();
    for cause in &scenario.causes {
        let cat = format!("{}.cause({})", at, cause.id);
        if cause.id.trim().is_empty() {
            report.error(format!("{}: cause id missing", at));
        } else if !cause_ids.insert(cause.id.as_str()) {
            report.error(format!("{}: duplicate cause id \"{}\"", at, cause.id));
        }
        if cause.name.trim().is_empty() {
            report.error(format!("{}: name missing", cat));
        }
        if !(0.0..=1.0).contains(&cause.probability) {
            report.error(format!("{}: probability {} outside [0, 1]", cat, cause.probability));
        }
        if let Some(q) = &cause.key_question {
            if q.text.trim().is_empty() {
                report.error(format!("{}: key_question text missing", cat));
            }
        }
    }

    for action in &scenario.self_fix_actions {
        if action.id.trim().is_empty() {
            report.error(format!("{}: self_fix_actions[].id missing", at));
            continue;
        }
        if let Some(q) = &action.followup_question {
            let qat = format!("{}.action({}).followup_question", at, action.id);
            validate_question(q, &qat, true, report);
            check_paths(&q.resolution_paths, scenario, &qat, report);
        }
    }
}

fn check_paths(paths: &IndexMap<String, ResolutionPath>, scenario: &Scenario, at: &str, report: &mut ValidationReport) {
    for (key, path) in paths {
        if let Some(next) = &path.next_action {
            if scenario.action(next).is_none() {
                report.error(format!("{}.paths({}): next_action \"{}\" not found", at, key, next));
            }
        }
        if let Some(q) = &path.next_question {
            check_paths(&q.resolution_paths, scenario, &format!("{}.paths({}).next_question", at, key), report);
        }
    }
}

pub fn validate_symptoms(symptoms: &SymptomCatalog) -> ValidationReport {
    let mut report = ValidationReport::default();
    for group in &symptoms.symptoms {
        if group.category.trim().is_empty() {
            report.error("symptoms: category missing".to_string());
        }
        for mapping in &group.mappings {
            if mapping.keywords.iter().all(|k| k.trim().is_empty()) {
                report.error(format!("symptoms({}): mapping keywords empty", group.category));
            }
            if mapping.target_id.trim().is_empty() {
                report.error(format!("symptoms({}): mapping target missing", group.category));
            }
        }
    }
    report
}

pub fn validate_graph(scenario: &GraphScenario) -> ValidationReport {
    let mut report = ValidationReport::default();
    let at = format!("graph({})", scenario.id);
    if !scenario.steps.contains_key(&scenario.starting_step_id) {
        report.error(format!("{}: starting step \"{}\" not found", at, scenario.starting_step_id));
    }
    let suspects: HashSet<&str> = scenario.suspects.iter().map(|s| s.id.as_str()).collect();
    for (id, step) in &scenario.steps {
        if step.options.is_empty() {
            report.error(format!("{}.step({}): no options", at, id));
        }
        for option in &step.options {
            if let Some(next) = &option.next_step_id {
                if !scenario.steps.contains_key(next) {
                    report.error(format!("{}.step({}): next step \"{}\" not found", at, id, next));
                }
            }
            for action in &option.actions {
                if let StepAction::Verifies { suspect_id, .. } | StepAction::RulesOut { suspect_id, .. } = action {
                    if !suspects.contains(suspect_id.as_str()) {
                        report.error(format!("{}.step({}): unknown suspect \"{}\"", at, id, suspect_id));
                    }
                }
            }
        }
    }
    report
}

/// Lights, symptom mappings (including their targets) and graphs together.
pub fn validate_knowledge(knowledge: &Knowledge) -> ValidationReport {
    let mut report = validate_kb(&knowledge.kb);
    report.merge(validate_symptoms(&knowledge.symptoms));
    for mapping in knowledge.symptoms.mappings() {
        use crate::knowledge::MappingKind;
        let known = match mapping.kind {
            MappingKind::Light => knowledge.kb.get(&mapping.target_id).is_some(),
            MappingKind::Scenario => knowledge.scenarios.contains_key(&mapping.target_id),
            MappingKind::Safety => crate::safety::rule(&mapping.target_id).is_some(),
        };
        if !known {
            report.warn(format!("symptoms: target \"{}\" not found", mapping.target_id));
        }
    }
    for graph in knowledge.scenarios.values() {
        report.merge(validate_graph(graph));
    }
    report
}
