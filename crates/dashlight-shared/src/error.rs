//! Error types for the diagnostic engine.
//!
//! Only loader, lookup and validation APIs return these. A diagnostic turn
//! never fails: every internal problem folds into a payload.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiagError {
    #[error("Unknown warning light: {0}")]
    UnknownLight(String),

    #[error("Unknown scenario '{scenario}' for '{owner}'")]
    UnknownScenario { owner: String, scenario: String },

    #[error("Unknown step '{step}' in scenario '{scenario}'")]
    UnknownStep { scenario: String, step: String },

    #[error("Knowledge base could not be read: {0}")]
    KbLoad(#[from] std::io::Error),

    #[error("Knowledge base is not valid JSON: {0}")]
    KbParse(#[from] serde_json::Error),

    #[error("Knowledge base is invalid: {0}")]
    InvalidKb(String),
}

impl DiagError {
    pub fn code(&self) -> &'static str {
        match self {
            DiagError::UnknownLight(_) => "unknown_light",
            DiagError::UnknownScenario { .. } => "unknown_scenario",
            DiagError::UnknownStep { .. } => "unknown_step",
            DiagError::KbLoad(_) => "kb_load",
            DiagError::KbParse(_) => "kb_parse",
            DiagError::InvalidKb(_) => "invalid_kb",
        }
    }
}

/// Failure to pull a JSON value out of completion text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Completion text is empty")]
    Empty,

    #[error("No JSON object or array found in completion text")]
    NoJsonSpan,

    #[error("Malformed JSON in completion text: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(DiagError::UnknownLight("x".into()).code(), "unknown_light");
        assert_eq!(DiagError::InvalidKb("bad".into()).code(), "invalid_kb");
        let err = DiagError::UnknownStep {
            scenario: "overheating".into(),
            step: "nope".into(),
        };
        assert_eq!(err.code(), "unknown_step");
        assert!(err.to_string().contains("nope"));
    }
}
