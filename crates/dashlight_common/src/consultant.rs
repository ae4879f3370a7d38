//! The async turn: one engine turn, plus the completion service whenever the
//! engine defers.
//!
//! Deferrals resolve as follows:
//! - unmatched option: ask the model to map the answer onto a label, once
//!   per question, else re-prompt the same options;
//! - nothing recognized in the opening text: bridge questions until a light
//!   is named, then the light picker, then expert mode;
//! - missing scenario or exhausted KB: ask the model for a diagnosis.
//!
//! Whatever fails, the caller gets a valid envelope. Transport failures
//! during bridging produce the fallback question; every other failure
//! produces the fallback diagnosis.

use crate::config::{DashlightConfig, EngineConfig};
use crate::llm_client::{CompletionClient, CompletionError, HttpCompletionClient};
use crate::prompts::{bridge_prompt, diagnosis_prompt, expert_prompt, option_map_prompt};
use crate::retry::{generate_with_retry, RetryPolicy};
use dashlight_shared::analyzer::light_picker_options;
use dashlight_shared::extract::{parse_payload, ParsedPayload};
use dashlight_shared::fallback::{fallback_question, fallback_report_payload, model_report};
use dashlight_shared::options::DEFAULT_OPTIONS;
use dashlight_shared::{
    DeferReason, Deferral, DiagError, DiagnosticState, Engine, Envelope, Payload, TurnInput,
    TurnOutcome,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PICKER_QUESTION: &str =
    "To be precise: which warning light did you see? If you're not sure, pick the closest one.";

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Knowledge(#[from] DiagError),

    #[error(transparent)]
    Client(#[from] CompletionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsultLimits {
    pub max_bridge_questions: u32,
    pub option_map_attempts: u32,
}

impl Default for ConsultLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ConsultLimits {
    fn from(engine: &EngineConfig) -> Self {
        Self {
            max_bridge_questions: engine.max_bridge_questions,
            option_map_attempts: engine.option_map_attempts,
        }
    }
}

/// What came back from one completion call.
enum Consulted {
    Parsed(ParsedPayload),
    Malformed,
    Failed(CompletionError),
}

pub struct Consultant {
    engine: Engine,
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    limits: ConsultLimits,
}

impl Consultant {
    pub fn new(engine: Engine, client: Arc<dyn CompletionClient>, retry: RetryPolicy) -> Self {
        Self {
            engine,
            client,
            retry,
            limits: ConsultLimits::default(),
        }
    }

    /// Knowledge, display tables, HTTP client, retry policy and limits, all
    /// from one config.
    pub fn from_config(config: &DashlightConfig) -> Result<Self, SetupError> {
        let knowledge = config.engine.load_knowledge()?;
        let engine = Engine::new(knowledge.shared()).with_display(config.display.tables());
        let client = HttpCompletionClient::new(config.llm.clone())?;
        let retry = RetryPolicy::from_config(&config.retry, &config.llm);
        Ok(Self::new(engine, Arc::new(client), retry).with_limits(ConsultLimits::from(&config.engine)))
    }

    pub fn with_limits(mut self, limits: ConsultLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run one turn to a payload. Never fails.
    pub async fn turn(&self, state: &DiagnosticState, input: &TurnInput) -> Envelope {
        match self.engine.turn(state, input) {
            TurnOutcome::Reply(envelope) => envelope,
            TurnOutcome::Deferred(deferral) => {
                let note = deferral.safety_note.clone();
                let envelope = self.resolve(input, deferral).await;
                if note.is_some() {
                    envelope.with_safety_note(note)
                } else {
                    envelope
                }
            }
        }
    }

    async fn resolve(&self, input: &TurnInput, deferral: Deferral) -> Envelope {
        info!(reason = ?deferral.reason, "Resolving deferred turn");
        match deferral.reason {
            DeferReason::UnmatchedOption => self.map_option(input, deferral.state).await,
            DeferReason::ConsultAi => self.bridge(input, deferral.state).await,
            DeferReason::NoScenario | DeferReason::KbExhausted => self.expert_diagnosis(deferral.state).await,
        }
    }

    async fn consult(&self, prompt: &str) -> Consulted {
        match generate_with_retry(self.client.as_ref(), prompt, &self.retry).await {
            Ok(text) => match parse_payload(&text) {
                Ok(parsed) => Consulted::Parsed(parsed),
                Err(err) => {
                    warn!(error = %err, "Unparseable completion");
                    Consulted::Malformed
                }
            },
            Err(err) => Consulted::Failed(err),
        }
    }

    async fn map_option(&self, input: &TurnInput, state: DiagnosticState) -> Envelope {
        let options = state.current_question_options.clone();
        if options.is_empty() || state.option_map_attempts >= self.limits.option_map_attempts {
            debug!(attempts = state.option_map_attempts, "Option mapping exhausted, re-prompting");
            return self.engine.reprompt(&state);
        }

        let mut next = state;
        next.option_map_attempts += 1;
        let question = next.current_question_text.clone().unwrap_or_default();
        let prompt = option_map_prompt(&input.text, &question, &options);

        match self.consult(&prompt).await {
            Consulted::Parsed(ParsedPayload::OptionMapping {
                selected: Some(label), ..
            }) if options.contains(&label) => {
                info!(answer = %input.text, label = %label, "Answer mapped onto option");
                let mapped = TurnInput {
                    text: label,
                    has_images: input.has_images,
                };
                match self.engine.turn(&next, &mapped) {
                    TurnOutcome::Reply(envelope) => envelope,
                    TurnOutcome::Deferred(d) => match d.reason {
                        DeferReason::UnmatchedOption => self.engine.reprompt(&next),
                        DeferReason::ConsultAi => self.bridge(&mapped, d.state).await,
                        DeferReason::NoScenario | DeferReason::KbExhausted => {
                            self.expert_diagnosis(d.state).await
                        }
                    },
                }
            }
            Consulted::Parsed(ParsedPayload::OptionMapping {
                clarification: Some(text),
                ..
            }) => {
                debug!(clarification = %text, "Model asked for clarification");
                clarify(self.engine.reprompt(&next), text)
            }
            _ => {
                debug!("No usable option mapping, re-prompting");
                self.engine.reprompt(&next)
            }
        }
    }

    fn start_light(&self, state: &DiagnosticState, light_id: &str) -> Option<Envelope> {
        match self.engine.start_light(state, light_id) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                warn!(light = light_id, error = %err, "Model named a light the KB does not have");
                None
            }
        }
    }

    async fn bridge(&self, input: &TurnInput, mut state: DiagnosticState) -> Envelope {
        let max = self.limits.max_bridge_questions;
        let no_light = state.detected_light_type.is_none();
        if !input.text.trim().is_empty() {
            state.record_answer(input.text.trim());
        }
        let kb = &self.engine.knowledge().kb;

        let can_bridge = no_light && !input.has_images && state.bridge_question_count < max;
        if can_bridge || (no_light && input.has_images) {
            let remaining = max.saturating_sub(state.bridge_question_count);
            let prompt = bridge_prompt(&input.text, &state, kb, remaining, input.has_images);
            match self.consult(&prompt).await {
                Consulted::Parsed(ParsedPayload::LightDetected(id)) => {
                    if let Some(envelope) = self.start_light(&state, &id) {
                        return envelope;
                    }
                }
                Consulted::Parsed(ParsedPayload::Question { text, options }) => {
                    if can_bridge {
                        state.bridge_question_count += 1;
                    }
                    info!(count = state.bridge_question_count, "Bridge question");
                    return model_question(state, text, options);
                }
                Consulted::Parsed(ParsedPayload::Diagnosis(diagnosis)) => {
                    let report = model_report(&diagnosis, &state);
                    return Envelope::new(Payload::DiagnosisReport(Box::new(report)), state);
                }
                Consulted::Failed(err) => {
                    warn!(error = %err, "Bridge question failed");
                    return Envelope::new(fallback_question(), state);
                }
                Consulted::Parsed(_) | Consulted::Malformed => {
                    let payload = fallback_report_payload(&state);
                    return Envelope::new(payload, state);
                }
            }
        }

        if no_light && !state.light_picker_shown && state.bridge_question_count >= max {
            info!("Bridge exhausted, showing light picker");
            state.light_picker_shown = true;
            state.active_flow = None;
            let options = light_picker_options(kb);
            state.set_current_question(None, PICKER_QUESTION, &options);
            return Envelope::new(Payload::question(PICKER_QUESTION, options, None), state);
        }

        self.expert(input, state).await
    }

    async fn expert(&self, input: &TurnInput, state: DiagnosticState) -> Envelope {
        let prompt = expert_prompt(&input.text, &state, &self.engine.knowledge().kb, input.has_images);
        match self.consult(&prompt).await {
            Consulted::Parsed(ParsedPayload::LightDetected(id)) => match self.start_light(&state, &id) {
                Some(envelope) => envelope,
                None => Envelope::new(fallback_report_payload(&state), state),
            },
            Consulted::Parsed(ParsedPayload::Question { text, options }) => model_question(state, text, options),
            Consulted::Parsed(ParsedPayload::Diagnosis(diagnosis)) => {
                let report = model_report(&diagnosis, &state);
                Envelope::new(Payload::DiagnosisReport(Box::new(report)), state)
            }
            _ => {
                warn!("Expert consultation produced nothing usable");
                Envelope::new(fallback_report_payload(&state), state)
            }
        }
    }

    async fn expert_diagnosis(&self, state: DiagnosticState) -> Envelope {
        let prompt = diagnosis_prompt(&state, &self.engine.knowledge().kb);
        match self.consult(&prompt).await {
            Consulted::Parsed(ParsedPayload::Diagnosis(diagnosis)) => {
                info!(light = ?state.detected_light_type, "Model diagnosis");
                let report = model_report(&diagnosis, &state);
                Envelope::new(Payload::DiagnosisReport(Box::new(report)), state)
            }
            _ => {
                warn!(light = ?state.detected_light_type, "No model diagnosis, using fallback");
                Envelope::new(fallback_report_payload(&state), state)
            }
        }
    }
}

/// A question the model wrote, outside any KB flow.
fn model_question(mut state: DiagnosticState, text: String, options: Vec<String>) -> Envelope {
    let options = if options.is_empty() {
        DEFAULT_OPTIONS.iter().map(|o| o.to_string()).collect()
    } else {
        options
    };
    state.active_flow = None;
    state.set_current_question(None, &text, &options);
    Envelope::new(Payload::question(text, options, None), state)
}

/// Same options, the model's clarifying text in place of the question.
fn clarify(mut envelope: Envelope, clarification: String) -> Envelope {
    match &mut envelope.payload {
        Payload::Question { text, .. } => *text = clarification,
        Payload::ScenarioStep { step } => step.text = clarification,
        Payload::SafetyInstruction { question, .. } => *question = clarification,
        _ => {}
    }
    envelope
}
