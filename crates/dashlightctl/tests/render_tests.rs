//! Tests for render.rs

use dashlight_shared::fallback::{fallback_question, fallback_report_payload, FALLBACK_TITLE};
use dashlight_shared::knowledge::Knowledge;
use dashlight_shared::{DiagnosticState, Engine, Envelope, TurnInput, TurnOutcome};
use dashlightctl::render::{render, Painter};

const PLAIN: Painter = Painter { color: false };

fn reply(engine: &Engine, state: &DiagnosticState, text: &str) -> Envelope {
    match engine.turn(state, &TurnInput::text(text)) {
        TurnOutcome::Reply(envelope) => envelope,
        TurnOutcome::Deferred(d) => panic!("unexpected deferral {:?}", d.reason),
    }
}

#[test]
fn test_critical_report_shows_tow() {
    let engine = Engine::new(Knowledge::embedded().unwrap().shared());
    let env = engine.start_light(&DiagnosticState::new(), "oil_pressure_light").unwrap();
    let env = reply(&engine, &env.context, "Yes");
    let text = render(&env, PLAIN);
    assert!(text.contains("[1] yes, I stopped"));

    let env = reply(&engine, &env.context, "can't");
    let text = render(&env, PLAIN);
    assert!(text.contains("Severity: critical"));
    assert!(text.contains("[TOW] Call a tow truck"));
    assert!(text.contains("[RESULTS]"));
}

#[test]
fn test_continuing_alert_lists_acknowledge_option() {
    let engine = Engine::new(Knowledge::embedded().unwrap().shared());
    let env = reply(&engine, &DiagnosticState::new(), "the temperature gauge in the red");
    let text = render(&env, PLAIN);
    assert!(text.contains("[1] I understand, I'll continue carefully"));
    assert!(!text.contains("[TOW]"));
}

#[test]
fn test_instruction_numbers_steps() {
    let engine = Engine::new(Knowledge::embedded().unwrap().shared());
    let env = engine.start_light(&DiagnosticState::new(), "oil_pressure_light").unwrap();
    let env = reply(&engine, &env.context, "Yes");
    let env = reply(&engine, &env.context, "yes, I stopped");
    let text = render(&env, PLAIN);
    assert!(text.starts_with("Great. Now let's check the oil level.\n"));
    assert!(text.contains("  1. "));
}

#[test]
fn test_safety_note_comes_first() {
    let env = Envelope::new(fallback_question(), DiagnosticState::new())
        .with_safety_note(Some("Pull over if the steering feels heavy.".into()));
    let text = render(&env, PLAIN);
    assert!(text.starts_with("[WARNING] Pull over if the steering feels heavy.\n"));
}

#[test]
fn test_fallback_report() {
    let env = Envelope::new(fallback_report_payload(&DiagnosticState::new()), DiagnosticState::new());
    let text = render(&env, PLAIN);
    assert!(text.starts_with(FALLBACK_TITLE));
    assert!(!text.contains("[TOW]"));
}
