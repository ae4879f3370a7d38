//! Tests for validate.rs

use dashlight_shared::knowledge::Knowledge;
use dashlight_shared::validate::{validate_graph, validate_kb, validate_knowledge};
use std::io::Write;

#[test]
fn test_embedded_bundle_is_clean() {
    let k = Knowledge::embedded().unwrap();
    let report = validate_knowledge(&k);
    assert!(report.is_ok(), "{:?}", report.errors);
}

#[test]
fn test_kb_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "fog_light": {{
                "names": {{"en": ["fog light"]}},
                "severity": "low",
                "first_question": {{"text": "Is it on?", "options": ["Yes", "No"]}}
            }}
        }}"#
    )
    .unwrap();

    let k = Knowledge::from_paths(Some(file.path()), None).unwrap();
    assert_eq!(k.kb.len(), 1);
    let report = validate_kb(&k.kb);
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn test_bad_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    let err = Knowledge::from_paths(Some(file.path()), None).unwrap_err();
    assert_eq!(err.code(), "kb_parse");

    let err = Knowledge::from_paths(Some(std::path::Path::new("/nonexistent/kb.json")), None).unwrap_err();
    assert_eq!(err.code(), "kb_load");
}

#[test]
fn test_graph_dangling_step() {
    let k = Knowledge::embedded().unwrap();
    let mut graph = k.graph("flat_tire").unwrap().clone();
    graph.starting_step_id = "nowhere".into();
    let report = validate_graph(&graph);
    assert!(report.errors.iter().any(|e| e.contains("starting step \"nowhere\"")));
}
