//! Scenario resolver: pick the named scenario of a light from the answers.

use crate::knowledge::{KbQuestion, WarningLight};
use crate::options::{match_option, normalize};
use tracing::debug;

/// Prefix for follow-up question ids that carry no explicit id.
pub const FOLLOWUP_PREFIX: &str = "followup";

pub const LEGACY_STEADY_ID: &str = "followup_steady";
pub const LEGACY_FLASHING_ID: &str = "followup_flashing";

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioResolution {
    Resolved(String),
    /// Scenario detection is deferred until this follow-up is answered.
    Followup(KbQuestion),
    Unresolved,
}

const FLASHING_WORDS: &[&str] = &["flash", "blink", "מהבהב"];
const STEADY_WORDS: &[&str] = &["steady", "constant", "solid", "קבוע"];
const SYMPTOM_WORDS: &[&str] = &[
    "shak",
    "loss of power",
    "losing power",
    "stutter",
    "רועד",
    "רעידות",
    "מאבד כוח",
    "תקוע",
    "מגמגם",
];
const DRIVING_WORDS: &[&str] = &["driving", "נסיעה", "נוסע", "בנסיעה"];
const PARKING_WORDS: &[&str] = &["parking", "starting", "חניה", "בהתנעה"];

/// Resolve the scenario for `light`, newest answer first.
pub fn resolve_scenario(light: &WarningLight, answers: &[String], asked: &[String]) -> ScenarioResolution {
    if light.scenarios.is_empty() {
        return ScenarioResolution::Unresolved;
    }
    let first = &light.first_question;

    for answer in answers.iter().rev() {
        if let Some(matched) = match_option(&first.options, answer) {
            let key = matched.key();
            if light.scenarios.contains_key(key) {
                debug!(light = %light.id, scenario = key, "Scenario from first-question option");
                return ScenarioResolution::Resolved(key.to_string());
            }
            if let Some(followup) = first.followups.get(key) {
                let id = followup_id(key, followup);
                if !asked.iter().any(|a| a == &id) {
                    let mut question = followup.clone();
                    question.id = Some(id);
                    return ScenarioResolution::Followup(question);
                }
            }
            if let Some((id, followup)) = legacy_followup(first, answer) {
                if !asked.iter().any(|a| a == id) {
                    let mut question = followup.clone();
                    question.id = Some(id.to_string());
                    return ScenarioResolution::Followup(question);
                }
            }
        }

        for followup in first.followups.values() {
            if let Some(matched) = match_option(&followup.options, answer) {
                if light.scenarios.contains_key(matched.key()) {
                    debug!(light = %light.id, scenario = matched.key(), "Scenario from follow-up option");
                    return ScenarioResolution::Resolved(matched.key().to_string());
                }
            }
        }
    }

    if let Some(id) = keyword_scenario(light, answers) {
        debug!(light = %light.id, scenario = %id, "Scenario from answer keywords");
        return ScenarioResolution::Resolved(id);
    }

    light
        .scenarios
        .keys()
        .next()
        .map(|id| ScenarioResolution::Resolved(id.clone()))
        .unwrap_or(ScenarioResolution::Unresolved)
}

/// Id a follow-up is asked under.
pub fn followup_id(option_key: &str, question: &KbQuestion) -> String {
    question
        .id
        .clone()
        .unwrap_or_else(|| format!("{}_{}", FOLLOWUP_PREFIX, option_key))
}

/// Old-schema follow-up for an answer naming a steady or flashing light.
pub fn legacy_followup<'a>(first: &'a KbQuestion, answer: &str) -> Option<(&'static str, &'a KbQuestion)> {
    let answer = normalize(answer);
    if let Some(question) = first.followup_for_steady.as_deref() {
        if answer.contains("steady") || answer.contains("קבוע") {
            return Some((LEGACY_STEADY_ID, question));
        }
    }
    if let Some(question) = first.followup_for_flashing.as_deref() {
        if answer.contains("flashing") || answer.contains("מהבהב") {
            return Some((LEGACY_FLASHING_ID, question));
        }
    }
    None
}

fn keyword_scenario(light: &WarningLight, answers: &[String]) -> Option<String> {
    let all = normalize(&answers.join(" "));
    let has = |words: &[&str]| words.iter().any(|w| all.contains(w));
    let pick = |id: &str| light.scenarios.contains_key(id).then(|| id.to_string());

    if has(FLASHING_WORDS) {
        if let Some(id) = pick("flashing") {
            return Some(id);
        }
    }
    if has(SYMPTOM_WORDS) {
        if let Some(id) = pick("steady_symptoms") {
            return Some(id);
        }
    }
    if has(STEADY_WORDS) {
        if let Some(id) = pick("steady_normal") {
            return Some(id);
        }
    }
    if has(DRIVING_WORDS) {
        if let Some(id) = pick("while_driving") {
            return Some(id);
        }
    }
    if has(PARKING_WORDS) {
        if let Some(id) = pick("from_parking") {
            return Some(id);
        }
    }
    None
}

/// Fixed initial cause boosts applied when a scenario is first selected.
pub fn scenario_boosts(light_id: &str, scenario_id: &str) -> &'static [(&'static str, f64)] {
    match (light_id, scenario_id) {
        ("tpms_light", "steady_pulling") => &[("low_tire_puncture", 1.5)],
        ("tpms_light", "steady") => &[("temperature_change", 1.0)],
        ("brake_light", "from_parking") => &[("handbrake_engaged", 1.0)],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Knowledge;

    fn answers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_option_id_selects_scenario() {
        let k = Knowledge::embedded().unwrap();
        let light = k.kb.light("tpms_light").unwrap();
        let r = resolve_scenario(light, &answers(&["3"]), &[]);
        assert_eq!(r, ScenarioResolution::Resolved("flashing".into()));
    }

    #[test]
    fn test_followup_served_before_scenario() {
        let k = Knowledge::embedded().unwrap();
        let light = k.kb.light("battery_light").unwrap();
        let asked = answers(&["first_question"]);
        match resolve_scenario(light, &answers(&["While driving"]), &asked) {
            ScenarioResolution::Followup(q) => assert_eq!(q.id.as_deref(), Some("followup_driving")),
            other => panic!("expected followup, got {:?}", other),
        }
    }

    #[test]
    fn test_followup_answer_resolves_scenario() {
        let k = Knowledge::embedded().unwrap();
        let light = k.kb.light("battery_light").unwrap();
        let asked = answers(&["first_question", "followup_driving"]);
        let r = resolve_scenario(light, &answers(&["While driving", "Yes, they dim"]), &asked);
        assert_eq!(r, ScenarioResolution::Resolved("while_driving_dimming".into()));
    }

    #[test]
    fn test_keyword_fallback_for_plain_options() {
        let k = Knowledge::embedded().unwrap();
        let light = k.kb.light("check_engine_light").unwrap();
        let asked = answers(&["first_question", LEGACY_STEADY_ID, LEGACY_FLASHING_ID]);
        let r = resolve_scenario(light, &answers(&["Flashing", "Yes"]), &asked);
        assert_eq!(r, ScenarioResolution::Resolved("flashing".into()));
        let r = resolve_scenario(light, &answers(&["Steady", "No, it drives normally"]), &asked);
        assert_eq!(r, ScenarioResolution::Resolved("steady_normal".into()));
        let r = resolve_scenario(light, &answers(&["Steady", "Yes, the engine shakes"]), &asked);
        assert_eq!(r, ScenarioResolution::Resolved("steady_symptoms".into()));
    }

    #[test]
    fn test_legacy_followup_postpones_scenario() {
        let k = Knowledge::embedded().unwrap();
        let light = k.kb.light("check_engine_light").unwrap();
        match resolve_scenario(light, &answers(&["Steady"]), &answers(&["first_question"])) {
            ScenarioResolution::Followup(q) => {
                assert_eq!(q.id.as_deref(), Some(LEGACY_STEADY_ID));
                assert_eq!(q.option_labels(), vec!["Yes, the engine shakes", "No, it drives normally"]);
            }
            other => panic!("expected followup, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_to_first_scenario() {
        let k = Knowledge::embedded().unwrap();
        let light = k.kb.light("oil_pressure_light").unwrap();
        let r = resolve_scenario(light, &answers(&["no idea at all"]), &[]);
        assert_eq!(r, ScenarioResolution::Resolved("while_driving".into()));
    }

    #[test]
    fn test_boost_table() {
        assert_eq!(scenario_boosts("tpms_light", "steady_pulling"), &[("low_tire_puncture", 1.5)]);
        assert!(scenario_boosts("oil_pressure_light", "while_driving").is_empty());
    }
}
