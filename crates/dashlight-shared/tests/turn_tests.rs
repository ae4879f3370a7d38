//! Tests for turn.rs

use dashlight_shared::knowledge::Knowledge;
use dashlight_shared::payload::{AlertLevel, Payload, StatusColor};
use dashlight_shared::resolution::confirm_options;
use dashlight_shared::safety::SAFETY_ACK_OPTION;
use dashlight_shared::{
    ActiveFlow, DeferReason, DiagnosticState, Engine, Envelope, Severity, TurnInput, TurnOutcome,
};

fn engine() -> Engine {
    Engine::new(Knowledge::embedded().unwrap().shared())
}

fn reply(engine: &Engine, state: &DiagnosticState, text: &str) -> Envelope {
    match engine.turn(state, &TurnInput::text(text)) {
        TurnOutcome::Reply(envelope) => envelope,
        TurnOutcome::Deferred(d) => panic!("unexpected deferral {:?} for {:?}", d.reason, text),
    }
}

fn instruction_id(env: &Envelope) -> Option<&str> {
    match &env.payload {
        Payload::Instruction { id, .. } => Some(id),
        _ => None,
    }
}

#[test]
fn test_oil_immediate_stop_routes_to_dipstick() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "oil_pressure_light").unwrap();

    let env = reply(&engine, &env.context, "Yes");
    assert_eq!(env.kind(), "safety_instruction");
    assert_eq!(env.payload.options(), confirm_options().as_slice());
    assert_eq!(env.payload.options(), ["yes, I stopped", "on my way to stop", "can't"]);
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("while_driving"));

    let env = reply(&engine, &env.context, "yes, I stopped");
    assert_eq!(env.kind(), "instruction");
    assert_eq!(instruction_id(&env), Some("check_dipstick_emergency"));
    match &env.payload {
        Payload::Instruction { message, .. } => {
            assert_eq!(message.as_deref(), Some("Great. Now let's check the oil level."))
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(env.context.was_shown("check_dipstick_emergency"));
    assert!(!env.end_conversation);
}

#[test]
fn test_oil_dipstick_low_then_top_up_resolves() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "oil_pressure_light").unwrap();
    let env = reply(&engine, &env.context, "Yes");
    let env = reply(&engine, &env.context, "yes, I stopped");
    let env = reply(&engine, &env.context, "The oil is below MIN");
    assert_eq!(instruction_id(&env), Some("top_up_oil"));

    let env = reply(&engine, &env.context, "1");
    match &env.payload {
        Payload::DiagnosisReport(report) => {
            assert_eq!(report.status.color, StatusColor::Green);
            assert_eq!(report.severity, Severity::Low);
            let user = &report.conversation_summaries.user;
            let mechanic = &report.conversation_summaries.mechanic;
            assert_eq!(user.top_issue, mechanic.top_diagnosis.issue);
            assert!(mechanic
                .user_actions_performed
                .contains(&"Checked the oil level on the dipstick".to_string()));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(env.end_conversation);
}

#[test]
fn test_oil_cannot_stop_needs_tow() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "oil_pressure_light").unwrap();
    let env = reply(&engine, &env.context, "Yes");
    let env = reply(&engine, &env.context, "can't");
    match &env.payload {
        Payload::DiagnosisReport(report) => {
            assert_eq!(report.severity, Severity::Critical);
            assert!(report.show_tow_button);
            assert!(!report.tow_conditions.is_empty());
            let mechanic = &report.conversation_summaries.mechanic;
            assert_eq!(report.results[0].probability, mechanic.top_diagnosis.probability);
            let percent = format!("({}%)", (report.results[0].probability * 100.0).round());
            assert!(mechanic.formatted_text.contains(&percent));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_oil_on_my_way_asks_again() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "oil_pressure_light").unwrap();
    let env = reply(&engine, &env.context, "Yes");
    let env = reply(&engine, &env.context, "on my way to stop");
    assert_eq!(env.kind(), "safety_instruction");
    let env = reply(&engine, &env.context, "yes, I stopped");
    assert_eq!(instruction_id(&env), Some("check_dipstick_emergency"));
}

#[test]
fn test_cap_forces_diagnosis_without_threshold() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "tpms_light").unwrap();
    let mut env = reply(&engine, &env.context, "Flashing for a minute, then steady");
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("flashing"));

    for _ in 0..4 {
        assert_eq!(env.kind(), "question");
        env = reply(&engine, &env.context, "No");
        assert!(env.context.cause_scores.values().all(|s| *s < 4.0));
    }
    assert_eq!(env.context.question_count(), 6);
    assert_eq!(env.kind(), "question");

    let env = reply(&engine, &env.context, "No");
    assert_eq!(env.kind(), "diagnosis_report");
    assert!(env.context.cause_scores.values().all(|s| *s <= 0.25));
    match &env.payload {
        Payload::DiagnosisReport(report) => {
            assert!(report.confidence <= 0.92);
            assert_eq!(report.severity, Severity::Moderate);
            let mechanic = &report.conversation_summaries.mechanic;
            assert_eq!(report.results[0].probability, mechanic.top_diagnosis.probability);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_first_action_shown_once() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "tpms_light").unwrap();
    let mut env = reply(&engine, &env.context, "2");
    let mut shown = Vec::new();

    for _ in 0..20 {
        if let Some(id) = instruction_id(&env) {
            shown.push(id.to_string());
        }
        if env.end_conversation {
            break;
        }
        let text = if instruction_id(&env) == Some("visual_check_tires") {
            "No, they all look fine"
        } else {
            "Not sure"
        };
        env = reply(&engine, &env.context, text);
    }

    assert!(env.end_conversation);
    assert_eq!(shown.iter().filter(|id| *id == "visual_check_tires").count(), 1);
    assert_eq!(
        env.context
            .shown_instruction_ids
            .iter()
            .filter(|id| *id == "visual_check_tires")
            .count(),
        1
    );
}

#[test]
fn test_safety_preempts_active_flow() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "tpms_light").unwrap();
    let env = reply(&engine, &env.context, "2");
    assert!(env.context.detected_light_type.is_some());
    assert!(env.context.current_light_scenario.is_some());

    let env = reply(&engine, &env.context, "wait, I see smoke and flames");
    assert_eq!(env.kind(), "safety_alert");
    match &env.payload {
        Payload::SafetyAlert { level, final_card, .. } => {
            assert_eq!(*level, AlertLevel::Critical);
            let card = final_card.as_ref().unwrap();
            assert_eq!(card.severity, Severity::Critical);
            assert!(card.show_tow_button);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(env.end_conversation);
}

#[test]
fn test_battery_followup_defers_scenario() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "battery_light").unwrap();
    let env = reply(&engine, &env.context, "While driving");
    match &env.payload {
        Payload::Question { question_id, .. } => assert_eq!(question_id.as_deref(), Some("followup_driving")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(env.context.current_light_scenario.is_none());

    let env = reply(&engine, &env.context, "Yes, they dim");
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("while_driving_dimming"));
}

#[test]
fn test_check_engine_legacy_followup_fixes_scenario_once() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "check_engine_light").unwrap();
    let env = reply(&engine, &env.context, "Steady");
    match &env.payload {
        Payload::Question { question_id, .. } => assert_eq!(question_id.as_deref(), Some("followup_steady")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(env.context.current_light_scenario.is_none());

    let env = reply(&engine, &env.context, "Yes, the engine shakes");
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("steady_symptoms"));

    let next = env.payload.options().first().cloned().unwrap_or_else(|| "No".to_string());
    let env = reply(&engine, &env.context, &next);
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("steady_symptoms"));
}

#[test]
fn test_scenario_stays_fixed_after_selection() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "tpms_light").unwrap();
    let env = reply(&engine, &env.context, "Steady, and the car pulls to one side");
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("steady_pulling"));
    assert_eq!(env.context.cause_scores["low_tire_puncture"], 1.5);

    let mut state = env.context.clone();
    state.current_question_id = Some("first_question".into());
    state.current_question_options = vec!["Flashing for a minute, then steady".into()];
    state.pending_resolution_paths.clear();
    let env = reply(&engine, &state, "Flashing for a minute, then steady");
    assert_eq!(env.context.current_light_scenario.as_deref(), Some("steady_pulling"));
}

#[test]
fn test_continuing_alert_waits_for_acknowledgement() {
    let engine = engine();
    let env = reply(&engine, &DiagnosticState::new(), "the temperature gauge in the red");
    assert_eq!(env.kind(), "safety_alert");
    assert!(!env.end_conversation);
    match &env.payload {
        Payload::SafetyAlert { options, final_card, .. } => {
            assert_eq!(options, &vec![SAFETY_ACK_OPTION.to_string()]);
            assert!(final_card.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(env.context.current_question_options, vec![SAFETY_ACK_OPTION]);
    assert_eq!(env.context.pending_scenario_id.as_deref(), Some("overheating"));
    assert!(env.context.graph.is_none());
    assert_eq!(engine.reprompt(&env.context).kind(), "safety_alert");

    let env = reply(&engine, &env.context, "OK, I understand");
    assert_eq!(env.kind(), "scenario_step");
    assert_eq!(env.context.active_flow, Some(ActiveFlow::Scenario));
    assert!(env.context.pending_scenario_id.is_none());
    assert_eq!(env.context.current_question_options, env.payload.options());
    assert!(env.payload.options().iter().any(|o| o == "Yes, there is steam or smoke"));
}

#[test]
fn test_graph_flow_runs_to_report() {
    let engine = engine();
    let mut env = reply(&engine, &DiagnosticState::new(), "my car won't start");
    assert_eq!(env.context.active_flow, Some(ActiveFlow::Scenario));

    for _ in 0..10 {
        if env.kind() != "scenario_step" {
            break;
        }
        env = reply(&engine, &env.context, "1");
    }
    match &env.payload {
        Payload::DiagnosisReport(report) => {
            assert!(report.confidence <= 0.9);
            assert_eq!(report.mechanic_report.as_ref().unwrap().top_suspect, "Battery");
            assert_eq!(
                report.results[0].probability,
                report.conversation_summaries.mechanic.top_diagnosis.probability
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(env.context.active_flow.is_none());
}

#[test]
fn test_graph_stop_alert_blocks() {
    let engine = engine();
    let env = engine.start_graph(&DiagnosticState::new(), "overheating").unwrap();
    let env = reply(&engine, &env.context, "Yes, there is steam or smoke");
    assert_eq!(env.kind(), "scenario_step");
    let env = reply(&engine, &env.context, "1");
    match &env.payload {
        Payload::SafetyAlert { level, stop_chat, final_card, .. } => {
            assert_eq!(*level, AlertLevel::Critical);
            assert!(*stop_chat);
            assert!(final_card.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unknown_light_defers() {
    let engine = engine();
    let mut state = DiagnosticState::new();
    state.detected_light_type = Some("flux_capacitor_light".into());
    state.active_flow = Some(ActiveFlow::Kb);
    match engine.turn(&state, &TurnInput::text("Yes")) {
        TurnOutcome::Deferred(d) => assert_eq!(d.reason, DeferReason::NoScenario),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_input_state_is_untouched() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "tpms_light").unwrap();
    let before = env.context.clone();
    let _ = engine.turn(&env.context, &TurnInput::text("1"));
    assert_eq!(env.context, before);
}

#[test]
fn test_envelope_serializes_flat() {
    let engine = engine();
    let env = engine.start_light(&DiagnosticState::new(), "tpms_light").unwrap();
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["type"], "question");
    assert_eq!(json["context"]["activeFlow"], "KB");
    assert_eq!(json["endConversation"], false);

    let back: Envelope = serde_json::from_value(json).unwrap();
    assert_eq!(back, env);
}
