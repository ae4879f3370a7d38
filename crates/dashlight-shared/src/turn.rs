//! Turn orchestrator.
//!
//! One call takes the caller's state and the user's text and returns either
//! a reply envelope or a deferral the async layer resolves with the
//! completion service. The engine never fails a turn: lookup problems fold
//! into deferrals or the fixed fallback payloads.

use crate::analyzer::{analyze_context, light_severity, Analysis};
use crate::error::DiagError;
use crate::fallback::fallback_report_payload;
use crate::gate::should_diagnose;
use crate::graph::{step_turn, GraphState, GraphTurn};
use crate::knowledge::{Knowledge, Scenario, Severity, WarningLight};
use crate::options::match_label;
use crate::payload::{Envelope, Payload, StepView};
use crate::planner::{next_step, NextStep, MIN_ASKED_FOR_DIAGNOSIS};
use crate::resolution::{
    apply_path, find_path, immediate_action_prompt, is_resolved_text, resolved_from_text,
    route_action, Resolution, ResolutionContext, IMMEDIATE_ACTION_ID, IMMEDIATE_CONFIRM_ID,
    IMMEDIATE_QUESTION,
};
use crate::safety::{continuing_rule, safety_alert, scan, SafetyRule, SAFETY_ACK_ID, SAFETY_ACK_OPTION};
use crate::scenario::{resolve_scenario, scenario_boosts, ScenarioResolution};
use crate::scoring::{apply_boosts, update_scores};
use crate::state::{ActiveFlow, DiagnosticState};
use crate::synthesis::{generate_diagnosis, DisplayTables};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const FIRST_QUESTION_ID: &str = "first_question";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnInput {
    pub text: String,
    /// Only shapes completion prompts.
    pub has_images: bool,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            has_images: false,
        }
    }
}

/// Why the engine handed a turn to the completion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// The answer matched none of the offered options.
    UnmatchedOption,
    /// The light or scenario could not be found in the KB.
    NoScenario,
    /// Nothing left to ask and too few answers to diagnose.
    KbExhausted,
    /// No light or scenario recognized in the opening text.
    ConsultAi,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deferral {
    pub reason: DeferReason,
    /// State as it stood after the engine's own updates.
    pub state: DiagnosticState,
    pub safety_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply(Envelope),
    Deferred(Deferral),
}

impl TurnOutcome {
    fn with_safety_note(self, note: Option<String>) -> Self {
        match self {
            TurnOutcome::Reply(envelope) => match note {
                Some(_) => TurnOutcome::Reply(envelope.with_safety_note(note)),
                None => TurnOutcome::Reply(envelope),
            },
            TurnOutcome::Deferred(mut deferral) => {
                if note.is_some() {
                    deferral.safety_note = note;
                }
                TurnOutcome::Deferred(deferral)
            }
        }
    }
}

fn reply(payload: Payload, state: DiagnosticState) -> TurnOutcome {
    TurnOutcome::Reply(Envelope::new(payload, state))
}

fn defer(reason: DeferReason, state: DiagnosticState) -> TurnOutcome {
    debug!(reason = ?reason, "Turn deferred");
    TurnOutcome::Deferred(Deferral {
        reason,
        state,
        safety_note: None,
    })
}

/// Alert for a critical rule. A continuing alert waits for the user's
/// acknowledgement before its scenario starts.
fn raise_alert(rule: &SafetyRule, mut state: DiagnosticState) -> TurnOutcome {
    let payload = safety_alert(rule, &state);
    if let Some(next) = rule.continues_into() {
        state.pending_scenario_id = Some(next.to_string());
        state.set_current_question(Some(SAFETY_ACK_ID), rule.message, payload.options());
    }
    reply(payload, state)
}

/// The diagnostic engine over one loaded knowledge bundle.
#[derive(Debug, Clone)]
pub struct Engine {
    knowledge: Arc<Knowledge>,
    display: DisplayTables,
}

impl Engine {
    pub fn new(knowledge: Arc<Knowledge>) -> Self {
        Self {
            knowledge,
            display: DisplayTables::default(),
        }
    }

    pub fn with_display(mut self, display: DisplayTables) -> Self {
        self.display = display;
        self
    }

    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    pub fn display(&self) -> &DisplayTables {
        &self.display
    }

    /// Run one turn. `state` is never modified; the new state travels in
    /// the outcome.
    pub fn turn(&self, state: &DiagnosticState, input: &TurnInput) -> TurnOutcome {
        let mut state = state.clone();
        let text = input.text.trim();

        let mut note = None;
        if let Some(rule) = scan(text) {
            if rule.is_critical() {
                return raise_alert(rule, state);
            }
            note = Some(rule.message.to_string());
        }

        if state.current_question_id.as_deref() == Some(SAFETY_ACK_ID) {
            if let Some(outcome) = self.acknowledge_alert(&mut state) {
                return outcome.with_safety_note(note);
            }
        }

        let outcome = match state.active_flow {
            Some(ActiveFlow::Scenario) => self.graph_turn(state, text),
            Some(ActiveFlow::Kb) => self.kb_turn(state, text),
            None => self.entry_turn(state, text),
        };
        outcome.with_safety_note(note)
    }

    fn entry_turn(&self, state: DiagnosticState, text: &str) -> TurnOutcome {
        if let Some(light_id) = state.detected_light_type.clone() {
            return self.start_or_defer(&state, &light_id);
        }
        match analyze_context(text, &self.knowledge) {
            Analysis::SafetyStop(rule) => raise_alert(rule, state),
            Analysis::WarningLight { light_id, .. } => self.start_or_defer(&state, &light_id),
            Analysis::StartScenario(id) => match self.start_graph(&state, &id) {
                Ok(envelope) => TurnOutcome::Reply(envelope),
                Err(err) => {
                    warn!(scenario = %id, error = %err, "Could not start scenario graph");
                    defer(DeferReason::NoScenario, state)
                }
            },
            Analysis::ConsultAi => defer(DeferReason::ConsultAi, state),
        }
    }

    fn start_or_defer(&self, state: &DiagnosticState, light_id: &str) -> TurnOutcome {
        match self.start_light(state, light_id) {
            Ok(envelope) => TurnOutcome::Reply(envelope),
            Err(err) => {
                warn!(light = light_id, error = %err, "Could not start light flow");
                defer(DeferReason::NoScenario, state.clone())
            }
        }
    }

    /// Start the KB flow for `light_id` and serve its first question.
    pub fn start_light(&self, state: &DiagnosticState, light_id: &str) -> Result<Envelope, DiagError> {
        let light = self.knowledge.kb.light(light_id)?;
        let mut state = state.clone();
        state.detected_light_type = Some(light.id.clone());
        state.light_severity = light_severity(light.severity);
        state.current_light_scenario = None;
        state.cause_scores.clear();
        state.asked_question_ids = vec![FIRST_QUESTION_ID.to_string()];
        state.shown_instruction_ids.clear();
        state.pending_resolution_paths.clear();
        state.active_flow = Some(ActiveFlow::Kb);
        state.graph = None;

        let question = &light.first_question;
        let mut text = format!("Detected {}.", light.display_name());
        if light.severity == Severity::Critical {
            text.push_str(" This is a critical light!");
        }
        text.push(' ');
        text.push_str(&question.text);
        let options = question.option_labels();
        state.set_current_question(Some(FIRST_QUESTION_ID), &question.text, &options);

        info!(light = %light.id, severity = %light.severity, "Light flow started");
        Ok(Envelope::new(
            Payload::question(text, options, Some(FIRST_QUESTION_ID)),
            state,
        ))
    }

    /// Start a scenario graph and serve its first step.
    pub fn start_graph(&self, state: &DiagnosticState, scenario_id: &str) -> Result<Envelope, DiagError> {
        let mut state = state.clone();
        let view = self.enter_graph(&mut state, scenario_id)?;
        Ok(Envelope::new(Payload::ScenarioStep { step: view }, state))
    }

    fn enter_graph(&self, state: &mut DiagnosticState, scenario_id: &str) -> Result<StepView, DiagError> {
        let scenario = self.knowledge.graph(scenario_id)?;
        let step = scenario.start_step()?;
        let view = step.view();
        state.active_flow = Some(ActiveFlow::Scenario);
        state.graph = Some(GraphState::start(scenario));
        state.set_current_question(Some(&step.id), &step.text, &view.options);
        info!(scenario = %scenario.id, "Scenario graph started");
        Ok(view)
    }

    /// Any reply to a continuing alert acknowledges it and starts the pending
    /// scenario graph. `None` when there is nothing to start.
    fn acknowledge_alert(&self, state: &mut DiagnosticState) -> Option<TurnOutcome> {
        let scenario_id = state.pending_scenario_id.take();
        if scenario_id.is_some() {
            state.record_answer(SAFETY_ACK_OPTION);
        }
        state.set_current_question(None, "", &[]);
        let scenario_id = scenario_id?;
        let mut started = state.clone();
        match self.enter_graph(&mut started, &scenario_id) {
            Ok(view) => Some(reply(Payload::ScenarioStep { step: view }, started)),
            Err(err) => {
                warn!(scenario = %scenario_id, error = %err, "Safety follow-up scenario missing");
                None
            }
        }
    }

    fn graph_turn(&self, mut state: DiagnosticState, text: &str) -> TurnOutcome {
        let scenario_id = match &state.graph {
            Some(graph) => graph.current_scenario_id.clone(),
            None => {
                state.active_flow = None;
                return defer(DeferReason::NoScenario, state);
            }
        };
        let scenario = match self.knowledge.graph(&scenario_id) {
            Ok(s) => s,
            Err(err) => {
                warn!(scenario = %scenario_id, error = %err, "Scenario graph missing");
                state.active_flow = None;
                state.graph = None;
                return defer(DeferReason::NoScenario, state);
            }
        };
        match step_turn(scenario, &mut state, text) {
            Ok(GraphTurn::Unmatched(_)) => defer(DeferReason::UnmatchedOption, state),
            Ok(GraphTurn::Next(payload)) | Ok(GraphTurn::Alert(payload)) => reply(payload, state),
            Ok(GraphTurn::Finished(report)) => reply(Payload::DiagnosisReport(report), state),
            Err(err) => {
                warn!(scenario = %scenario_id, error = %err, "Scenario graph step failed");
                let payload = fallback_report_payload(&state);
                reply(payload, state)
            }
        }
    }

    fn kb_turn(&self, mut state: DiagnosticState, text: &str) -> TurnOutcome {
        let light = match state
            .detected_light_type
            .as_deref()
            .and_then(|id| self.knowledge.kb.get(id))
        {
            Some(light) => light,
            None => {
                warn!(light = ?state.detected_light_type, "Light missing from knowledge base");
                return defer(DeferReason::NoScenario, state);
            }
        };

        let answer = if state.current_question_options.is_empty() {
            text.to_string()
        } else {
            match match_label(&state.current_question_options, text) {
                Some(m) => m.label,
                None => {
                    let current = state
                        .current_light_scenario
                        .as_deref()
                        .and_then(|id| light.scenario(id));
                    if let Some(scenario) = current.filter(|_| is_resolved_text(text)) {
                        state.record_answer(text);
                        let payload = resolved_from_text(ResolutionContext { light, scenario }, &state);
                        return reply(payload, state);
                    }
                    return defer(DeferReason::UnmatchedOption, state);
                }
            }
        };
        state.record_answer(&answer);
        let question_id = state.current_question_id.clone().unwrap_or_default();

        if state.current_light_scenario.is_none() {
            match resolve_scenario(light, &state.answer_texts(), &state.asked_question_ids) {
                ScenarioResolution::Followup(question) => {
                    let id = question.id.clone().unwrap_or_default();
                    let options = question.option_labels();
                    state.set_current_question(Some(&id), &question.text, &options);
                    state.record_asked(&id);
                    return reply(Payload::question(question.text.clone(), options, Some(&id)), state);
                }
                ScenarioResolution::Resolved(id) => {
                    info!(light = %light.id, scenario = %id, "Scenario selected");
                    apply_boosts(&mut state.cause_scores, scenario_boosts(&light.id, &id));
                    state.current_light_scenario = Some(id);
                }
                ScenarioResolution::Unresolved => return defer(DeferReason::NoScenario, state),
            }
        }

        let scenario = match state
            .current_light_scenario
            .as_deref()
            .and_then(|id| light.scenario(id))
        {
            Some(s) => s,
            None => return defer(DeferReason::NoScenario, state),
        };
        let ctx = ResolutionContext { light, scenario };

        let action_followup = scenario
            .action(&question_id)
            .is_some_and(|a| a.followup_question.is_some());
        if !state.pending_resolution_paths.is_empty() || action_followup {
            match find_path(&state, scenario, &answer, text) {
                Some(path) => {
                    if let Resolution::Respond(payload) = apply_path(ctx, &path, &mut state) {
                        return reply(payload, state);
                    }
                }
                None => {
                    debug!(question = %question_id, answer = %answer, "No resolution path for answer");
                    state.pending_resolution_paths.clear();
                }
            }
        }

        if let Some(action_text) = &scenario.immediate_action {
            if !state.was_shown(IMMEDIATE_ACTION_ID) {
                let payload = immediate_action_prompt(action_text, &mut state);
                return reply(payload, state);
            }
        }

        update_scores(&mut state.cause_scores, &question_id, &answer, scenario);

        if should_diagnose(&state.cause_scores, state.question_count(), state.light_severity) {
            return self.diagnose(light, scenario, state);
        }

        let planned = next_step(
            light,
            scenario,
            &state.asked_question_ids,
            &state.shown_instruction_ids,
            &answer,
        );
        match planned {
            Some(NextStep::Instruction(action)) => {
                let payload = route_action(action, None, &mut state);
                reply(payload, state)
            }
            Some(NextStep::Question(q)) => {
                state.set_current_question(Some(&q.id), &q.text, &q.options);
                state.record_asked(&q.id);
                reply(Payload::question(q.text, q.options, Some(&q.id)), state)
            }
            None if state.question_count() < MIN_ASKED_FOR_DIAGNOSIS => {
                defer(DeferReason::KbExhausted, state)
            }
            None => self.diagnose(light, scenario, state),
        }
    }

    fn diagnose(&self, light: &WarningLight, scenario: &Scenario, mut state: DiagnosticState) -> TurnOutcome {
        state.pending_resolution_paths.clear();
        let report = generate_diagnosis(light, scenario, &state.cause_scores, &state, &self.display);
        reply(Payload::DiagnosisReport(Box::new(report)), state)
    }

    /// Re-serve whatever is on screen, unchanged.
    pub fn reprompt(&self, state: &DiagnosticState) -> Envelope {
        let text = state.current_question_text.clone().unwrap_or_default();
        let options = state.current_question_options.clone();
        let id = state.current_question_id.clone();

        let payload = if id.as_deref() == Some(SAFETY_ACK_ID) {
            match state.pending_scenario_id.as_deref().and_then(continuing_rule) {
                Some(rule) => safety_alert(rule, state),
                None => Payload::question(text, options, id.as_deref()),
            }
        } else if state.active_flow == Some(ActiveFlow::Scenario) {
            Payload::ScenarioStep {
                step: StepView {
                    id: id.unwrap_or_default(),
                    text,
                    options,
                },
            }
        } else if id.as_deref() == Some(IMMEDIATE_CONFIRM_ID) {
            let action_text = state
                .detected_light_type
                .as_deref()
                .zip(state.current_light_scenario.as_deref())
                .and_then(|(l, s)| self.knowledge.kb.scenario(l, s).ok())
                .and_then(|s| s.immediate_action.clone())
                .unwrap_or_else(|| "Stop in a safe place and turn off the engine.".to_string());
            Payload::SafetyInstruction {
                text: action_text,
                question: IMMEDIATE_QUESTION.to_string(),
                options,
            }
        } else {
            Payload::question(text, options, id.as_deref())
        };
        Envelope::new(payload, state.clone())
    }

    /// Diagnose with what the state holds, if a scenario is known.
    pub fn diagnose_now(&self, state: &DiagnosticState) -> Option<Envelope> {
        let light = self.knowledge.kb.get(state.detected_light_type.as_deref()?)?;
        let scenario = light.scenario(state.current_light_scenario.as_deref()?)?;
        let report = generate_diagnosis(light, scenario, &state.cause_scores, state, &self.display);
        Some(Envelope::new(Payload::DiagnosisReport(Box::new(report)), state.clone()))
    }
}
