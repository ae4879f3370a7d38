//! Resolution-path resolver: what happens after a self-fix follow-up is
//! answered.
//!
//! Lookup order for the answered option:
//! 1. pending paths in the state (exact key, then key contained in the answer)
//! 2. the current action's follow-up paths by option id
//! 3. the same paths by label
//!
//! Dispatch is one exhaustive match over [`ResolutionStatus`].

use crate::knowledge::{
    ActionType, KbQuestion, ResolutionPath, ResolutionStatus, Scenario, SelfFixAction, Severity,
    WarningLight,
};
use crate::options::{match_option, normalize};
use crate::payload::{
    ConfidenceLevel, ConversationSummaries, DiagnosisReport, DiagnosisResult, MechanicReport,
    Payload, ReportStatus, StatusColor, DISCLAIMER,
};
use crate::scoring::rank_causes;
use crate::state::DiagnosticState;
use crate::summary::{build_summaries, SummaryFacts};
use indexmap::IndexMap;
use tracing::{debug, info};

pub const IMMEDIATE_ACTION_ID: &str = "immediate_action";
pub const IMMEDIATE_CONFIRM_ID: &str = "immediate_action_confirm";
pub const IMMEDIATE_QUESTION: &str = "Did you stop and turn off the engine?";
pub const CONFIRM_STOPPED: &str = "yes, I stopped";
pub const CONFIRM_ON_MY_WAY: &str = "on my way to stop";
pub const CONFIRM_CANT: &str = "can't";

pub const WAIT_AND_RECHECK_ID: &str = "wait_and_recheck";
pub const NEXT_STEPS_ID: &str = "next_steps";
pub const MORE_INFO_ID: &str = "more_info";
pub const CONTINUE_OPTION: &str = "Got it, I'll continue";
pub const CANT_DO_OPTION: &str = "I can't do it";
pub const DONE_OPTION: &str = "Done";

/// Keys shorter than this only match exactly.
const MIN_CONTAINED_KEY: usize = 3;

const RESOLVED_MARKERS: &[&str] = &[
    "✅",
    "light went off",
    "light is off",
    "resolved",
    "fixed",
    "all good",
    "הנורה כבתה",
    "כבתה",
    "נפתר",
    "הסתדר",
    "הכל תקין",
];

/// Outcome of applying a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Carry on with the KB question flow.
    Continue,
    Respond(Payload),
}

/// Light and scenario the resolver works inside.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub light: &'a WarningLight,
    pub scenario: &'a Scenario,
}

/// Options shown under an instruction that has no follow-up question.
pub fn acknowledge_options() -> Vec<String> {
    vec![DONE_OPTION.to_string(), CANT_DO_OPTION.to_string()]
}

/// Paths behind [`acknowledge_options`]: done carries on, can't ends at a garage.
pub fn acknowledge_paths(title: &str) -> IndexMap<String, ResolutionPath> {
    let mut cant = ResolutionPath::new(ResolutionStatus::NeedsMechanic);
    cant.message = Some(format!("Could not complete: {}", title));
    let mut paths = IndexMap::new();
    paths.insert(DONE_OPTION.to_string(), ResolutionPath::new(ResolutionStatus::ContinueDiagnosis));
    paths.insert(CANT_DO_OPTION.to_string(), cant);
    paths
}

pub fn confirm_options() -> Vec<String> {
    vec![
        CONFIRM_STOPPED.to_string(),
        CONFIRM_ON_MY_WAY.to_string(),
        CONFIRM_CANT.to_string(),
    ]
}

/// Paths installed behind the immediate-action confirmation.
pub fn immediate_action_paths() -> IndexMap<String, ResolutionPath> {
    let mut stopped = ResolutionPath::new(ResolutionStatus::WaitAndVerify);
    stopped.next_action = Some("check_dipstick_emergency".to_string());
    stopped.message = Some("Great. Now let's check the oil level.".to_string());

    let mut on_my_way = ResolutionPath::new(ResolutionStatus::Critical);
    on_my_way.message = Some("Stop completely and turn off the engine now!".to_string());

    let mut cant = ResolutionPath::new(ResolutionStatus::NeedsTow);
    cant.diagnosis = Some("The vehicle cannot be stopped".to_string());
    cant.recommendation = Some("Try to pull over. If you can't, call a tow truck immediately.".to_string());

    let mut paths = IndexMap::new();
    paths.insert(CONFIRM_STOPPED.to_string(), stopped);
    paths.insert(CONFIRM_ON_MY_WAY.to_string(), on_my_way);
    paths.insert(CONFIRM_CANT.to_string(), cant);
    paths
}

/// Safety instruction for a scenario's `immediate_action`.
///
/// Marks the step shown, makes it the current question and installs the
/// confirmation paths.
pub fn immediate_action_prompt(text: &str, state: &mut DiagnosticState) -> Payload {
    let options = confirm_options();
    state.mark_shown(IMMEDIATE_ACTION_ID);
    state.set_current_question(Some(IMMEDIATE_CONFIRM_ID), IMMEDIATE_QUESTION, &options);
    state.record_asked(IMMEDIATE_CONFIRM_ID);
    state.pending_resolution_paths = immediate_action_paths();
    Payload::SafetyInstruction {
        text: text.to_string(),
        question: IMMEDIATE_QUESTION.to_string(),
        options,
    }
}

/// True when free text says the problem went away.
pub fn is_resolved_text(text: &str) -> bool {
    let lowered = text.to_lowercase();
    RESOLVED_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Find the path for the answered option.
pub fn find_path(state: &DiagnosticState, scenario: &Scenario, label: &str, raw: &str) -> Option<ResolutionPath> {
    let followup = state
        .current_question_id
        .as_deref()
        .and_then(|id| scenario.action(id))
        .and_then(|a| a.followup_question.as_ref());
    let option_id = followup
        .and_then(|q| match_option(&q.options, label))
        .and_then(|m| m.id);
    let candidates: Vec<&str> = [option_id.as_deref(), Some(label), Some(raw)]
        .into_iter()
        .flatten()
        .filter(|c| !c.is_empty())
        .collect();

    let pending = &state.pending_resolution_paths;
    if let Some(path) = candidates.iter().find_map(|c| pending.get(*c)) {
        return Some(path.clone());
    }
    let wanted: Vec<String> = candidates.iter().map(|c| normalize(c)).collect();
    if let Some(path) = pending.iter().find_map(|(key, path)| {
        let key = normalize(key);
        let hit = wanted
            .iter()
            .any(|w| w == &key || (key.chars().count() >= MIN_CONTAINED_KEY && w.contains(&key)));
        hit.then_some(path)
    }) {
        return Some(path.clone());
    }

    let question = followup?;
    if let Some(id) = &option_id {
        if let Some(path) = question.resolution_paths.get(id) {
            return Some(path.clone());
        }
    }
    question.resolution_paths.get(label).cloned()
}

/// Apply `path` and say what to show next.
pub fn apply_path(ctx: ResolutionContext<'_>, path: &ResolutionPath, state: &mut DiagnosticState) -> Resolution {
    state.pending_resolution_paths.clear();
    info!(
        light = %ctx.light.id,
        scenario = %ctx.scenario.id,
        status = ?path.status,
        "Resolution path taken"
    );

    match path.status {
        ResolutionStatus::Resolved | ResolutionStatus::ResolvedTemp => {
            Resolution::Respond(report(ctx, path, Outcome::Resolved(path.status), state))
        }
        ResolutionStatus::ContinueDiagnosis => Resolution::Continue,
        ResolutionStatus::NeedsMoreInfo => {
            if let Some(action) = routed_action(ctx, path) {
                return Resolution::Respond(route_action(action, path.message.as_deref(), state));
            }
            if !path.next_steps.is_empty() {
                let title = path.message.clone().unwrap_or_else(|| "Next steps".to_string());
                return Resolution::Respond(generic_instruction(NEXT_STEPS_ID, &title, path.next_steps.clone(), None, state));
            }
            let text = path
                .message
                .clone()
                .unwrap_or_else(|| "Try that step, then tell me how it went.".to_string());
            let options = vec![CONTINUE_OPTION.to_string(), CANT_DO_OPTION.to_string()];
            let mut paths = IndexMap::new();
            paths.insert(CONTINUE_OPTION.to_string(), ResolutionPath::new(ResolutionStatus::ContinueDiagnosis));
            paths.insert(CANT_DO_OPTION.to_string(), ResolutionPath::new(ResolutionStatus::NeedsMechanic));
            state.set_current_question(Some(MORE_INFO_ID), &text, &options);
            state.record_asked(MORE_INFO_ID);
            state.pending_resolution_paths = paths;
            Resolution::Respond(Payload::question(text, options, Some(MORE_INFO_ID)))
        }
        ResolutionStatus::Pending | ResolutionStatus::WaitAndVerify => match routed_action(ctx, path) {
            Some(action) => Resolution::Respond(route_action(action, path.message.as_deref(), state)),
            None => {
                let steps = vec![
                    "Wait 10 to 15 minutes.".to_string(),
                    "Check again whether the light is still on.".to_string(),
                ];
                Resolution::Respond(generic_instruction(
                    WAIT_AND_RECHECK_ID,
                    "Wait and recheck",
                    steps,
                    path.message.clone(),
                    state,
                ))
            }
        },
        ResolutionStatus::NeedsVerification => {
            if let Some(action) = routed_action(ctx, path) {
                return Resolution::Respond(route_action(action, path.message.as_deref(), state));
            }
            match &path.next_question {
                Some(question) => Resolution::Respond(ask_next_question(question, state)),
                None => Resolution::Continue,
            }
        }
        ResolutionStatus::NeedsInspection
        | ResolutionStatus::NeedsAttention
        | ResolutionStatus::NeedsMechanic
        | ResolutionStatus::NeedsMechanicUrgent => {
            Resolution::Respond(report(ctx, path, Outcome::Mechanic(path.status), state))
        }
        ResolutionStatus::NeedsTow => Resolution::Respond(report(ctx, path, Outcome::Tow, state)),
        ResolutionStatus::Critical => {
            let text = path
                .message
                .clone()
                .or_else(|| ctx.scenario.immediate_action.clone())
                .unwrap_or_else(|| "Stop completely and turn off the engine now!".to_string());
            Resolution::Respond(immediate_action_prompt(&text, state))
        }
    }
}

fn routed_action<'a>(ctx: ResolutionContext<'a>, path: &ResolutionPath) -> Option<&'a SelfFixAction> {
    let id = path.next_action.as_deref()?;
    let action = ctx.scenario.action(id);
    if action.is_none() {
        debug!(scenario = %ctx.scenario.id, action = id, "Routed action not in scenario");
    }
    action
}

/// Show `action`, make it the current question and install its paths.
pub fn route_action(action: &SelfFixAction, message: Option<&str>, state: &mut DiagnosticState) -> Payload {
    state.mark_shown(&action.id);
    state.record_asked(&action.id);

    let (question, options) = match &action.followup_question {
        Some(q) => {
            state.pending_resolution_paths = q.resolution_paths.clone();
            (Some(q.text.clone()), action.followup_labels())
        }
        None => {
            state.pending_resolution_paths = acknowledge_paths(&action.name);
            (None, acknowledge_options())
        }
    };
    let text = question.clone().unwrap_or_else(|| action.name.clone());
    state.set_current_question(Some(&action.id), &text, &options);

    debug!(action = %action.id, "Instruction shown");
    Payload::Instruction {
        id: action.id.clone(),
        title: action.name.clone(),
        action_type: action.action_type,
        steps: action.steps.clone(),
        warning: action.warning.clone(),
        condition: action.condition.clone(),
        message: message.map(str::to_string),
        question,
        options,
    }
}

fn generic_instruction(
    id: &str,
    title: &str,
    steps: Vec<String>,
    message: Option<String>,
    state: &mut DiagnosticState,
) -> Payload {
    let options = acknowledge_options();
    state.mark_shown(id);
    state.record_asked(id);
    state.set_current_question(Some(id), title, &options);
    state.pending_resolution_paths = acknowledge_paths(title);
    Payload::Instruction {
        id: id.to_string(),
        title: title.to_string(),
        action_type: ActionType::Inspect,
        steps,
        warning: None,
        condition: None,
        message,
        question: None,
        options,
    }
}

fn ask_next_question(question: &KbQuestion, state: &mut DiagnosticState) -> Payload {
    let id = question.id.clone().unwrap_or_else(|| "verification".to_string());
    let options = question.option_labels();
    state.set_current_question(Some(&id), &question.text, &options);
    state.record_asked(&id);
    state.pending_resolution_paths = question.resolution_paths.clone();
    Payload::question(question.text.clone(), options, Some(&id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Resolved(ResolutionStatus),
    Mechanic(ResolutionStatus),
    Tow,
}

/// Terminal report for a resolution outcome.
fn report(ctx: ResolutionContext<'_>, path: &ResolutionPath, outcome: Outcome, state: &DiagnosticState) -> Payload {
    Payload::DiagnosisReport(Box::new(outcome_report(ctx, path, outcome, state)))
}

fn outcome_report(
    ctx: ResolutionContext<'_>,
    path: &ResolutionPath,
    outcome: Outcome,
    state: &DiagnosticState,
) -> DiagnosisReport {
    let ranked = rank_causes(ctx.scenario, &state.cause_scores);
    let top_cause = ranked.first().filter(|(_, s)| *s > 0.0);
    let issue = path
        .diagnosis
        .clone()
        .or_else(|| top_cause.map(|(c, _)| c.name.clone()))
        .unwrap_or_else(|| ctx.scenario.description.clone());
    let top_score = top_cause.map(|(_, s)| *s).unwrap_or(0.0);

    let (title, confidence, severity, color, status_text, default_instruction, tow) = match outcome {
        Outcome::Resolved(status) => (
            format!("✅ Resolved: {}", issue),
            0.8,
            Severity::Low,
            StatusColor::Green,
            if status == ResolutionStatus::ResolvedTemp {
                "Resolved for now"
            } else {
                "Issue resolved"
            },
            if status == ResolutionStatus::ResolvedTemp {
                "It works for now. Have it checked at a garage soon."
            } else {
                "If the light comes back, visit a garage."
            },
            false,
        ),
        Outcome::Mechanic(status) => (
            format!("🔧 Visit a garage: {}", issue),
            0.7,
            Severity::High,
            StatusColor::Orange,
            if status == ResolutionStatus::NeedsMechanicUrgent {
                "Visit a garage today"
            } else {
                "Visit a garage soon"
            },
            "Drive carefully to a garage for a professional check.",
            false,
        ),
        Outcome::Tow => (
            format!("🚨 Tow required: {}", issue),
            0.85,
            Severity::Critical,
            StatusColor::Red,
            "Do not drive",
            "Do not keep driving. Call a tow truck.",
            true,
        ),
    };
    let instruction = path
        .recommendation
        .clone()
        .or_else(|| path.message.clone())
        .unwrap_or_else(|| default_instruction.to_string());
    let tow_conditions: Vec<String> = if tow {
        ctx.scenario.tow_conditions.clone()
    } else {
        Vec::new()
    };

    let mut recommendations = vec![instruction.clone()];
    recommendations.extend(path.next_steps.iter().cloned());

    let facts = SummaryFacts {
        light_id: &ctx.light.id,
        light_name: ctx.light.display_name(),
        scenario_id: &ctx.scenario.id,
        scenario_description: &ctx.scenario.description,
        top: Some((issue.as_str(), confidence)),
        additional: ranked
            .iter()
            .skip(1)
            .filter(|(_, s)| *s > 0.0)
            .take(3)
            .map(|(c, s)| (c.name.as_str(), *s))
            .collect(),
        recommendation: &instruction,
        severity,
        needs_tow: tow,
    };
    let (user, mechanic) = build_summaries(&facts, state);

    let mut report = DiagnosisReport {
        title,
        confidence,
        confidence_level: ConfidenceLevel::from_confidence(confidence),
        display_confidence: confidence,
        display_confidence_level: ConfidenceLevel::from_confidence(confidence),
        severity,
        summary: path.message.clone().unwrap_or_default(),
        results: vec![DiagnosisResult {
            issue: issue.clone(),
            probability: confidence,
            explanation: path.recommendation.clone().unwrap_or_default(),
            display_percent: None,
        }],
        status: ReportStatus {
            color,
            text: status_text.to_string(),
            instruction: instruction.clone(),
        },
        next_steps: path.next_steps.clone(),
        recommendations,
        disclaimer: DISCLAIMER.to_string(),
        show_tow_button: tow,
        tow_conditions: tow_conditions.clone(),
        mechanic_report: Some(MechanicReport {
            top_suspect: issue,
            score: top_score,
            severity,
            status: status_text.to_string(),
            instruction,
            tow_conditions,
            blind_spots: Vec::new(),
        }),
        conversation_summaries: ConversationSummaries { user, mechanic },
    };
    report.refresh_display_confidence();
    report
}

/// Resolved report from free text, with no path behind it.
pub fn resolved_from_text(ctx: ResolutionContext<'_>, state: &DiagnosticState) -> Payload {
    let mut path = ResolutionPath::new(ResolutionStatus::Resolved);
    path.message = Some("The light went off.".to_string());
    report(ctx, &path, Outcome::Resolved(ResolutionStatus::Resolved), state)
}
