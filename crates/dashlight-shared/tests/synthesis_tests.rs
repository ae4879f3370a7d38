//! Tests for synthesis.rs

use dashlight_shared::knowledge::Knowledge;
use dashlight_shared::payload::{ConfidenceLevel, StatusColor};
use dashlight_shared::scoring::Scores;
use dashlight_shared::state::AnswerRecord;
use dashlight_shared::synthesis::{engine_confidence, generate_diagnosis, DisplayTables, MAX_CONFIDENCE};
use dashlight_shared::{DiagnosticState, Severity};

#[test]
fn test_confidence_never_exceeds_cap() {
    let mut top = -10.0;
    while top <= 100.0 {
        for answers in [0, 1, 3, 6, 20, 500] {
            for critical in [false, true] {
                let c = engine_confidence(top, answers, critical);
                assert!(c <= MAX_CONFIDENCE, "{} for top {} answers {}", c, top, answers);
                assert!(c >= 0.40);
            }
        }
        top += 0.25;
    }
}

#[test]
fn test_base_tiers() {
    assert!((engine_confidence(0.0, 0, false) - 0.40).abs() < 1e-9);
    assert!((engine_confidence(0.5, 0, false) - (0.50 + 0.5 * 0.15)).abs() < 1e-9);
    assert!((engine_confidence(2.0, 0, false) - (0.55 + 0.24)).abs() < 1e-9);
    assert!((engine_confidence(2.0, 0, true) - (0.60 + 0.24)).abs() < 1e-9);
}

#[test]
fn test_critical_light_report() {
    let k = Knowledge::embedded().unwrap();
    let light = k.kb.light("oil_pressure_light").unwrap();
    let scenario = light.scenario("flickers_idle").unwrap();
    let mut scores = Scores::new();
    scores.insert("low_oil_level".into(), 50.0);
    scores.insert("worn_engine".into(), 3.0);
    let mut state = DiagnosticState::new();
    state.answers.push(AnswerRecord {
        question: "Does it flicker at idle?".into(),
        answer: "Yes".into(),
    });

    let report = generate_diagnosis(light, scenario, &scores, &state, &DisplayTables::default());
    assert_eq!(report.severity, Severity::Critical);
    assert_eq!(report.status.color, StatusColor::Red);
    assert!(report.show_tow_button);
    assert!(report.confidence <= MAX_CONFIDENCE);
    assert_eq!(report.results[0].issue, "Low engine oil level");
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.display_confidence, report.results[0].probability);
    assert_eq!(report.display_confidence_level, ConfidenceLevel::High);
    assert_eq!(report.results[0].display_percent, Some(85));
    assert_eq!(report.results[1].display_percent, Some(10));
}

#[test]
fn test_two_confidences_stay_distinct() {
    let k = Knowledge::embedded().unwrap();
    let light = k.kb.light("tpms_light").unwrap();
    let scenario = light.scenario("flashing").unwrap();
    let mut scores = Scores::new();
    scores.insert("sensor_fault".into(), 0.5);
    let report = generate_diagnosis(light, scenario, &scores, &DiagnosticState::new(), &DisplayTables::default());
    assert_eq!(report.confidence_level, ConfidenceLevel::from_confidence(report.confidence));
    assert_eq!(report.display_confidence_level, ConfidenceLevel::from_confidence(report.display_confidence));
    assert!(report.confidence != report.display_confidence);
}

#[test]
fn test_display_tables_pad_and_truncate() {
    let tables = DisplayTables::default();
    assert_eq!(tables.display_probabilities(ConfidenceLevel::Medium, 2), vec![65, 25]);
    assert_eq!(tables.display_probabilities(ConfidenceLevel::Low, 5), vec![45, 35, 20, 0, 0]);
}
