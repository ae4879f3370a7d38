//! Tests for consultant.rs

use dashlight_common::consultant::PICKER_QUESTION;
use dashlight_common::{
    CompletionError, ConsultLimits, Consultant, DashlightConfig, FakeCompletionClient, RetryPolicy,
};
use dashlight_shared::analyzer::LIGHT_PICKER_OTHER;
use dashlight_shared::fallback::{FALLBACK_QUESTION, FALLBACK_TITLE};
use dashlight_shared::knowledge::Knowledge;
use dashlight_shared::payload::Payload;
use dashlight_shared::{ActiveFlow, DiagnosticState, Engine, Envelope, TurnInput};
use std::sync::Arc;
use std::time::Duration;

fn consultant(client: Arc<FakeCompletionClient>) -> Consultant {
    let engine = Engine::new(Knowledge::embedded().unwrap().shared());
    Consultant::new(engine, client, RetryPolicy::immediate(2, Duration::from_secs(1)))
}

async fn tpms_first_question(c: &Consultant) -> Envelope {
    c.engine().start_light(&DiagnosticState::new(), "tpms_light").unwrap()
}

fn question_text(env: &Envelope) -> &str {
    match &env.payload {
        Payload::Question { text, .. } => text,
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_unmatched_answer_is_mapped() {
    let client = Arc::new(FakeCompletionClient::always(
        r#"{"type":"option_map","selectedOptionLabel":"Steady, and the car pulls to one side","needClarification":null}"#,
    ));
    let c = consultant(client.clone());
    let env = tpms_first_question(&c).await;

    let env = c.turn(&env.context, &TurnInput::text("it pulls to the left a bit")).await;
    assert_eq!(client.call_count(), 1);
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("steady_pulling"));
    assert!(env.context.cause_scores["low_tire_puncture"] >= 1.5);
}

#[tokio::test]
async fn test_clarification_over_instruction_reprompts_its_question() {
    let client = Arc::new(FakeCompletionClient::always(
        r#"{"selectedOptionLabel": null, "needClarification": "Does any tire look lower than the others?"}"#,
    ));
    let c = consultant(client.clone());
    let start = tpms_first_question(&c).await;
    let shown = c.engine().turn(&start.context, &TurnInput::text("2"));
    let shown = match shown {
        dashlight_shared::TurnOutcome::Reply(env) => env,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(shown.kind(), "instruction");

    let env = c.turn(&shown.context, &TurnInput::text("hmm, hard to tell from here")).await;
    assert_eq!(question_text(&env), "Does any tire look lower than the others?");
    assert_eq!(env.payload.options(), shown.payload.options());
}

#[tokio::test]
async fn test_clarification_then_reprompt_without_model() {
    let client = Arc::new(FakeCompletionClient::always(
        r#"{"selectedOptionLabel": null, "needClarification": "Is the light blinking or steady?"}"#,
    ));
    let c = consultant(client.clone());
    let start = tpms_first_question(&c).await;

    let env = c.turn(&start.context, &TurnInput::text("it pulls to the left a bit")).await;
    assert_eq!(question_text(&env), "Is the light blinking or steady?");
    assert_eq!(env.payload.options(), start.payload.options());
    assert_eq!(env.context.option_map_attempts, 1);
    assert!(env.context.current_light_scenario.is_none());

    let env = c.turn(&env.context, &TurnInput::text("dunno, hard to say")).await;
    assert_eq!(client.call_count(), 1);
    assert_eq!(question_text(&env), "How does the tire pressure light behave?");
    assert_eq!(env.payload.options(), start.payload.options());
}

#[tokio::test]
async fn test_invented_label_is_rejected() {
    let client = Arc::new(FakeCompletionClient::always(
        r#"{"selectedOptionLabel": "Completely flat", "needClarification": null}"#,
    ));
    let c = consultant(client.clone());
    let start = tpms_first_question(&c).await;
    let env = c.turn(&start.context, &TurnInput::text("it pulls to the left a bit")).await;
    assert_eq!(env.kind(), "question");
    assert_eq!(env.payload.options(), start.payload.options());
    assert_eq!(env.context.option_map_attempts, 1);
    assert!(env.context.answers.is_empty());
}

#[tokio::test]
async fn test_bridge_then_picker_then_light() {
    let client = Arc::new(FakeCompletionClient::always(
        r#"{"type":"question","text":"What color is the symbol?","options":["Red","Yellow"]}"#,
    ));
    let c = consultant(client.clone());

    let mut env = c
        .turn(&DiagnosticState::new(), &TurnInput::text("a strange symbol appeared on my dashboard"))
        .await;
    for expected in 1..=3 {
        assert_eq!(question_text(&env), "What color is the symbol?");
        assert_eq!(env.context.bridge_question_count, expected);
        assert!(env.context.active_flow.is_none());
        if expected < 3 {
            env = c.turn(&env.context, &TurnInput::text("Yellow")).await;
        }
    }

    let env = c.turn(&env.context, &TurnInput::text("Yellow")).await;
    assert_eq!(client.call_count(), 3);
    assert_eq!(question_text(&env), PICKER_QUESTION);
    assert!(env.context.light_picker_shown);
    let options = env.payload.options();
    assert_eq!(options[0], "oil pressure light (oil_pressure_light)");
    assert_eq!(options.last().map(String::as_str), Some(LIGHT_PICKER_OTHER));

    let env = c.turn(&env.context, &TurnInput::text(options[0].clone())).await;
    assert_eq!(env.context.detected_light_type.as_deref(), Some("oil_pressure_light"));
    assert_eq!(env.context.active_flow, Some(ActiveFlow::Kb));
    assert_eq!(client.call_count(), 3);
}

#[tokio::test]
async fn test_bridge_model_names_light() {
    let client = Arc::new(FakeCompletionClient::always(
        "Sure:\n```json\n{\"type\":\"question\",\"warning_light\":\"battery_light\",\"text\":\"ok\"}\n```",
    ));
    let c = consultant(client);
    let env = c
        .turn(&DiagnosticState::new(), &TurnInput::text("a strange symbol appeared on my dashboard"))
        .await;
    assert!(question_text(&env).starts_with("Detected battery light."));
    assert_eq!(env.context.detected_light_type.as_deref(), Some("battery_light"));
}

#[tokio::test]
async fn test_bridge_transport_failure_gives_fallback_question() {
    let client = Arc::new(FakeCompletionClient::always_error(CompletionError::Http {
        status: 500,
        message: "boom".into(),
    }));
    let c = consultant(client.clone());
    let env = c
        .turn(&DiagnosticState::new(), &TurnInput::text("a strange symbol appeared on my dashboard"))
        .await;
    assert_eq!(question_text(&env), FALLBACK_QUESTION);
    assert!(!env.end_conversation);
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn test_unknown_light_goes_to_expert() {
    let client = Arc::new(FakeCompletionClient::new(vec![
        Ok(r#"{"warning_light":"flux_capacitor_light"}"#.into()),
        Ok(r#"{"type":"diagnosis_report","title":"Dashboard fault","results":[{"issue":"Loose instrument cluster connector","probability":0.6,"explanation":"Random symbols"}],"severity":"low"}"#.into()),
    ]));
    let c = consultant(client.clone());
    let env = c
        .turn(&DiagnosticState::new(), &TurnInput::text("a strange symbol appeared on my dashboard"))
        .await;
    assert_eq!(client.call_count(), 2);
    assert!(env.end_conversation);
    match &env.payload {
        Payload::DiagnosisReport(report) => {
            assert_eq!(report.title, "Dashboard fault");
            assert_eq!(report.results[0].issue, "Loose instrument cluster connector");
        }
        other => panic!("unexpected {:?}", other),
    }
}

fn missing_light_state() -> DiagnosticState {
    let mut state = DiagnosticState::new();
    state.detected_light_type = Some("flux_capacitor_light".into());
    state.active_flow = Some(ActiveFlow::Kb);
    state
}

#[tokio::test]
async fn test_kb_gap_uses_model_diagnosis() {
    let client = Arc::new(FakeCompletionClient::always(
        "```json\n{\"type\":\"diagnosis_report\",\"confidence\":0.97,\"results\":[{\"issue\":\"Sensor fault\",\"probability\":0.7,\"explanation\":\"\"}],}\n```",
    ));
    let c = consultant(client);
    let env = c.turn(&missing_light_state(), &TurnInput::text("Yes")).await;
    match &env.payload {
        Payload::DiagnosisReport(report) => {
            assert_eq!(report.results[0].issue, "Sensor fault");
            assert!(report.confidence <= 0.92);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_kb_gap_falls_back_when_model_fails() {
    let client = Arc::new(FakeCompletionClient::always_error(CompletionError::Timeout(12_000)));
    let c = consultant(client.clone());
    let env = c.turn(&missing_light_state(), &TurnInput::text("Yes")).await;
    assert_eq!(client.call_count(), 2);
    assert!(env.end_conversation);
    match &env.payload {
        Payload::DiagnosisReport(report) => assert_eq!(report.title, FALLBACK_TITLE),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_completion_falls_back() {
    let client = Arc::new(FakeCompletionClient::always("I am not sure what you mean."));
    let c = consultant(client);
    let env = c.turn(&missing_light_state(), &TurnInput::text("Yes")).await;
    match &env.payload {
        Payload::DiagnosisReport(report) => assert_eq!(report.title, FALLBACK_TITLE),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_option_mapping_disabled_by_limits() {
    let client = Arc::new(FakeCompletionClient::always("{}"));
    let c = consultant(client.clone()).with_limits(ConsultLimits {
        max_bridge_questions: 3,
        option_map_attempts: 0,
    });
    let start = tpms_first_question(&c).await;
    let env = c.turn(&start.context, &TurnInput::text("it pulls to the left a bit")).await;
    assert_eq!(client.call_count(), 0);
    assert_eq!(question_text(&env), "How does the tire pressure light behave?");
    assert_eq!(env.payload.options(), start.payload.options());
    assert_eq!(env.context.option_map_attempts, 0);
}

#[tokio::test]
async fn test_from_default_config_works_offline() {
    let c = Consultant::from_config(&DashlightConfig::default()).unwrap();
    let start = c.engine().start_light(&DiagnosticState::new(), "tpms_light").unwrap();
    let env = c.turn(&start.context, &TurnInput::text("it pulls to the left a bit")).await;
    assert_eq!(env.kind(), "question");
    assert_eq!(env.context.option_map_attempts, 1);
}
