//! Diagnosis gate: decide whether to stop asking and diagnose.

use crate::knowledge::LightSeverity;
use crate::scoring::Scores;
use tracing::debug;

pub const MIN_QUESTIONS_BEFORE_DIAGNOSIS: usize = 4;
pub const DIAGNOSIS_THRESHOLD: f64 = 4.0;
pub const MAX_QUESTIONS_DANGER: usize = 6;
pub const MAX_QUESTIONS_CAUTION: usize = 6;
/// A cause counts as positive evidence above this score.
pub const POSITIVE_SCORE: f64 = 0.25;

pub fn max_questions(severity: LightSeverity) -> usize {
    match severity {
        LightSeverity::Danger => MAX_QUESTIONS_DANGER,
        LightSeverity::Caution => MAX_QUESTIONS_CAUTION,
    }
}

pub fn max_score(scores: &Scores) -> f64 {
    scores.values().copied().fold(0.0, f64::max)
}

pub fn positive_causes(scores: &Scores) -> usize {
    scores.values().filter(|s| **s > POSITIVE_SCORE).count()
}

/// Danger needs a strong top score *and* two positive causes, or the cap.
/// Caution needs a strong top score or the cap.
pub fn should_diagnose(scores: &Scores, question_count: usize, severity: LightSeverity) -> bool {
    if question_count < MIN_QUESTIONS_BEFORE_DIAGNOSIS {
        debug!(question_count, "Gate closed: below question floor");
        return false;
    }

    let top = max_score(scores);
    let capped = question_count >= max_questions(severity);
    let decision = match severity {
        LightSeverity::Danger => {
            (top >= DIAGNOSIS_THRESHOLD && positive_causes(scores) >= 2) || capped
        }
        LightSeverity::Caution => top >= DIAGNOSIS_THRESHOLD || capped,
    };
    debug!(question_count, top, capped, severity = ?severity, decision, "Gate evaluated");
    decision
}
