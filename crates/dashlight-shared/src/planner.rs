//! Step planner: what to show next inside a KB scenario.
//!
//! Order:
//! 1. `FIRST` actions not yet shown
//! 2. the first-question follow-up for the last answer (new or legacy schema)
//! 3. unasked cause questions, highest prior first
//! 4. `STANDARD` actions not yet shown
//!
//! `AFTER_COOLDOWN` and `ONLY_IF_SAFE` actions never come from here.

use crate::knowledge::{KbQuestion, Priority, Scenario, SelfFixAction, WarningLight};
use crate::options::{match_option, option_labels};
use crate::scenario::{followup_id, legacy_followup};

/// Below this many asked questions an empty plan defers instead of diagnosing.
pub const MIN_ASKED_FOR_DIAGNOSIS: usize = 3;

const FOLLOWUP_PROBABILITY: f64 = 0.95;

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextStep<'a> {
    Instruction(&'a SelfFixAction),
    Question(PlannedQuestion),
}

pub fn next_step<'a>(
    light: &WarningLight,
    scenario: &'a Scenario,
    asked: &[String],
    shown: &[String],
    last_answer: &str,
) -> Option<NextStep<'a>> {
    let was_asked = |id: &str| asked.iter().any(|a| a == id);
    let was_shown = |id: &str| shown.iter().any(|s| s == id);

    if let Some(action) = scenario
        .self_fix_actions
        .iter()
        .find(|a| a.priority == Some(Priority::First) && !was_shown(&a.id))
    {
        return Some(NextStep::Instruction(action));
    }

    if let Some(question) = followup_question(light, last_answer, &was_asked) {
        return Some(NextStep::Question(question));
    }

    let mut candidates: Vec<PlannedQuestion> = scenario
        .causes
        .iter()
        .filter(|c| !c.id.is_empty() && !was_asked(c.question_id()))
        .filter_map(|c| {
            let q = c.key_question.as_ref()?;
            if q.text.is_empty() {
                return None;
            }
            Some(PlannedQuestion {
                id: c.question_id().to_string(),
                text: q.text.clone(),
                options: option_labels(&q.options),
                probability: c.probability,
            })
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let Some(question) = candidates.into_iter().next() {
        return Some(NextStep::Question(question));
    }

    scenario
        .self_fix_actions
        .iter()
        .find(|a| {
            matches!(a.priority, None | Some(Priority::Standard)) && !was_shown(&a.id)
        })
        .map(NextStep::Instruction)
}

fn followup_question(
    light: &WarningLight,
    last_answer: &str,
    was_asked: &dyn Fn(&str) -> bool,
) -> Option<PlannedQuestion> {
    let first = &light.first_question;

    if !first.followups.is_empty() {
        if let Some(matched) = match_option(&first.options, last_answer) {
            if let Some(fq) = first.followups.get(matched.key()) {
                let id = followup_id(matched.key(), fq);
                if !was_asked(&id) {
                    return Some(planned(id, fq));
                }
            }
        }
        return None;
    }

    legacy_followup(first, last_answer)
        .filter(|(id, _)| !was_asked(*id))
        .map(|(id, fq)| planned(id.to_string(), fq))
}

fn planned(id: String, question: &KbQuestion) -> PlannedQuestion {
    PlannedQuestion {
        id,
        text: question.text.clone(),
        options: question.option_labels(),
        probability: FOLLOWUP_PROBABILITY,
    }
}
