//! Tests for config.rs

use dashlight_common::config::ConfigError;
use dashlight_common::DashlightConfig;
use std::io::Write;
use std::path::Path;

#[test]
fn test_load_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[llm]
enabled = true
model = "mistral:7b"
timeout_secs = 20

[retry]
max_attempts = 5
backoff_ms = [100]

[engine]
max_bridge_questions = 2
"#
    )
    .unwrap();

    let (config, source) = DashlightConfig::load(Some(file.path())).unwrap();
    assert_eq!(source.as_deref(), Some(file.path()));
    assert_eq!(config.llm.model, "mistral:7b");
    assert_eq!(config.llm.timeout_secs, 20);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.backoff_ms, vec![100]);
    assert_eq!(config.retry.jitter_ms, 250);
    assert_eq!(config.engine.max_bridge_questions, 2);
    assert_eq!(config.engine.option_map_attempts, 1);
}

#[test]
fn test_missing_explicit_file_is_error() {
    let err = DashlightConfig::load(Some(Path::new("/nonexistent/dashlight.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn test_bad_toml_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[llm\nenabled = ").unwrap();
    let err = DashlightConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_round_trip_through_toml() {
    let config = DashlightConfig::default();
    let text = config.to_toml().unwrap();
    let back = DashlightConfig::from_toml_str(&text, Path::new("x.toml")).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_engine_paths_load_knowledge() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"fog_light": {{"names": {{"en": ["fog light"]}}, "first_question": {{"text": "On?", "options": ["Yes"]}}}}}}"#
    )
    .unwrap();
    let mut config = DashlightConfig::default();
    config.engine.kb_path = Some(file.path().to_path_buf());
    let knowledge = config.engine.load_knowledge().unwrap();
    assert_eq!(knowledge.kb.len(), 1);
    assert!(knowledge.kb.get("fog_light").is_some());
}
