//! Score engine: cause scores move only through additive deltas here.
//!
//! Delta by polarity, with `base` the cause's prior:
//! - yes: `+2.5 * (0.7 + base)`
//! - no: `-1.0 * (0.5 + base)`
//! - uncertain_probable: `+base`
//! - unknown: `0`

use crate::knowledge::{Cause, Polarity, Scenario};
use crate::options::normalize;
use crate::scenario::FOLLOWUP_PREFIX;
use std::collections::BTreeMap;
use tracing::debug;

pub type Scores = BTreeMap<String, f64>;

/// Where a polarity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolaritySource {
    AnswerMap,
    ScoreMapping,
    Heuristic,
}

const UNSURE_PHRASES: &[&str] = &[
    "not sure",
    "don't know",
    "dont know",
    "no idea",
    "לא בטוח",
    "לא יודע",
];
const AFFIRMATIVE: &[&str] = &["yes", "yeah", "yep", "כן"];
const NEGATIVE: &[&str] = &["no", "nope", "לא"];
const SYMPTOM_TOKENS: &[&str] = &[
    "flashing",
    "shak",
    "losing",
    "stuck",
    "there is",
    "high",
    "מהבהבת",
    "רועד",
    "מאבד",
    "תקוע",
    "יש",
    "גבוה",
];
const NEGATIVE_TOKENS: &[&str] = &["none", "not really", "normal", "fine", "אין", "לא באמת", "תקין"];

/// Keyword heuristic over a raw answer.
pub fn infer_polarity(text: &str) -> Polarity {
    let answer = normalize(text);
    if answer.is_empty() {
        return Polarity::Unknown;
    }
    if UNSURE_PHRASES.iter().any(|p| answer.contains(p)) {
        return Polarity::Unknown;
    }
    if AFFIRMATIVE.iter().any(|w| starts_with_word(&answer, w)) {
        return Polarity::Yes;
    }
    if NEGATIVE.iter().any(|w| starts_with_word(&answer, w)) {
        return Polarity::No;
    }
    if SYMPTOM_TOKENS.iter().any(|t| has_token(&answer, t)) {
        return Polarity::Yes;
    }
    if NEGATIVE_TOKENS.iter().any(|t| has_token(&answer, t)) {
        return Polarity::No;
    }
    Polarity::Unknown
}

/// `word` at the start, followed by a non-alphanumeric char or nothing.
/// Hebrew words match as plain prefixes.
fn starts_with_word(answer: &str, word: &str) -> bool {
    if !word.is_ascii() {
        return answer.starts_with(word);
    }
    match answer.strip_prefix(word) {
        Some(rest) => rest.chars().next().map_or(true, |c| !c.is_alphanumeric()),
        None => false,
    }
}

/// ASCII single words match word prefixes; phrases and Hebrew match as substrings.
fn has_token(answer: &str, token: &str) -> bool {
    if token.is_ascii() && !token.contains(' ') {
        answer
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w.starts_with(token))
    } else {
        answer.contains(token)
    }
}

pub fn score_delta(polarity: Polarity, base: f64) -> f64 {
    match polarity {
        Polarity::Yes => 2.5 * (0.7 + base),
        Polarity::No => -1.0 * (0.5 + base),
        Polarity::UncertainProbable => base,
        Polarity::Unknown => 0.0,
    }
}

/// Explicit `answers` map, then `score_mapping`, then the heuristic.
pub fn polarity_for(cause: &Cause, answer: &str) -> (Polarity, PolaritySource) {
    if let Some(question) = &cause.key_question {
        if let Some(p) = lookup(&question.answers, answer) {
            return (*p, PolaritySource::AnswerMap);
        }
        if let Some(m) = lookup(&question.score_mapping, answer) {
            return (m.polarity(), PolaritySource::ScoreMapping);
        }
    }
    (infer_polarity(answer), PolaritySource::Heuristic)
}

fn lookup<'a, V>(map: &'a BTreeMap<String, V>, answer: &str) -> Option<&'a V> {
    if let Some(v) = map.get(answer) {
        return Some(v);
    }
    let wanted = normalize(answer);
    map.iter()
        .find(|(k, _)| normalize(k) == wanted)
        .map(|(_, v)| v)
}

/// Apply the answer to the cause asked under `question_id`.
///
/// Returns the delta applied, or `None` when the question is not a cause
/// question (first question, follow-ups, instructions).
pub fn update_scores(
    scores: &mut Scores,
    question_id: &str,
    answer: &str,
    scenario: &Scenario,
) -> Option<f64> {
    if question_id.is_empty()
        || question_id == "first_question"
        || question_id.starts_with(FOLLOWUP_PREFIX)
    {
        return None;
    }
    let cause = scenario.cause_for_question(question_id)?;
    let (polarity, source) = polarity_for(cause, answer);
    let delta = score_delta(polarity, cause.probability);
    let entry = scores.entry(cause.id.clone()).or_insert(0.0);
    *entry += delta;
    debug!(
        cause = %cause.id,
        score = *entry,
        delta,
        polarity = ?polarity,
        source = ?source,
        "Updated cause score"
    );
    Some(delta)
}

/// Add fixed boosts through the same additive path.
pub fn apply_boosts(scores: &mut Scores, boosts: &[(&str, f64)]) {
    for (cause_id, boost) in boosts {
        let entry = scores.entry(cause_id.to_string()).or_insert(0.0);
        *entry += boost;
        debug!(cause = %cause_id, score = *entry, boost, "Applied scenario boost");
    }
}

/// Causes ranked by score, highest first; ties keep KB order.
pub fn rank_causes<'a>(scenario: &'a Scenario, scores: &Scores) -> Vec<(&'a Cause, f64)> {
    let mut ranked: Vec<(&Cause, f64)> = scenario
        .causes
        .iter()
        .map(|c| (c, scores.get(&c.id).copied().unwrap_or(0.0)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}
