//! Subcommand implementations. Each takes its reader/writer so tests can
//! drive it without a terminal.

use crate::render::{render, Painter};
use anyhow::{Context, Result};
use dashlight_common::Consultant;
use dashlight_common::DashlightConfig;
use dashlight_shared::knowledge::Knowledge;
use dashlight_shared::validate::validate_knowledge;
use dashlight_shared::{DiagnosticState, Envelope, TurnInput, VersionInfo};
use serde::Deserialize;
use std::io::{BufRead, Read, Write};
use std::path::Path;
use tracing::{debug, info};

pub const GREETING: &str = "Describe the warning light or what the car is doing. Type 'quit' to leave.";

/// One turn as read by `dashlightctl turn`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnRequest {
    pub text: String,
    pub has_images: bool,
    pub context: DiagnosticState,
    /// Start this light instead of interpreting `text`.
    pub light: Option<String>,
    /// Start this scenario graph instead of interpreting `text`.
    pub scenario: Option<String>,
}

pub async fn answer(consultant: &Consultant, request: &TurnRequest) -> Result<Envelope> {
    let engine = consultant.engine();
    if let Some(light) = &request.light {
        return Ok(engine.start_light(&request.context, light)?);
    }
    if let Some(scenario) = &request.scenario {
        return Ok(engine.start_graph(&request.context, scenario)?);
    }
    let input = TurnInput {
        text: request.text.clone(),
        has_images: request.has_images,
    };
    Ok(consultant.turn(&request.context, &input).await)
}

/// Read a JSON request, write the JSON envelope.
pub async fn run_turn<R: Read, W: Write>(consultant: &Consultant, mut input: R, mut out: W) -> Result<()> {
    let mut raw = String::new();
    input.read_to_string(&mut raw).context("reading request")?;
    let request: TurnRequest = if raw.trim().is_empty() {
        TurnRequest::default()
    } else {
        serde_json::from_str(&raw).context("parsing request")?
    };
    let envelope = answer(consultant, &request).await?;
    serde_json::to_writer(&mut out, &envelope)?;
    writeln!(out)?;
    Ok(())
}

fn is_quit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q")
}

/// Interactive loop. Ends on quit, end of input, or a terminal payload.
pub async fn chat<R: BufRead, W: Write>(
    consultant: &Consultant,
    light: Option<&str>,
    scenario: Option<&str>,
    input: R,
    mut out: W,
    painter: Painter,
) -> Result<()> {
    let engine = consultant.engine();
    let mut state = DiagnosticState::new();

    let opening = match (light, scenario) {
        (Some(light), _) => Some(engine.start_light(&state, light)?),
        (None, Some(scenario)) => Some(engine.start_graph(&state, scenario)?),
        (None, None) => None,
    };
    match opening {
        Some(envelope) => {
            write!(out, "{}", render(&envelope, painter))?;
            if envelope.end_conversation {
                return Ok(());
            }
            state = envelope.context;
        }
        None => writeln!(out, "{}", GREETING)?,
    }

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_quit(line) {
            break;
        }
        let envelope = consultant.turn(&state, &TurnInput::text(line)).await;
        debug!(kind = envelope.kind(), "Chat turn");
        writeln!(out)?;
        write!(out, "{}", render(&envelope, painter))?;
        if envelope.end_conversation {
            info!("Conversation finished");
            break;
        }
        state = envelope.context;
    }
    Ok(())
}

pub fn list_lights<W: Write>(knowledge: &Knowledge, mut out: W) -> Result<()> {
    for light in knowledge.kb.lights() {
        writeln!(
            out,
            "{:<28} {:<10} {}",
            light.id,
            light.severity.as_str(),
            light.display_name()
        )?;
    }
    Ok(())
}

pub fn list_scenarios<W: Write>(knowledge: &Knowledge, mut out: W) -> Result<()> {
    for (id, graph) in &knowledge.scenarios {
        writeln!(out, "{:<28} {}", id, graph.title)?;
    }
    Ok(())
}

/// Print every problem. `Ok(false)` when the bundle has errors.
pub fn validate_kb<W: Write>(path: Option<&Path>, scenarios: Option<&Path>, mut out: W) -> Result<bool> {
    let knowledge = Knowledge::from_paths(path, scenarios)
        .with_context(|| match path {
            Some(p) => format!("loading {}", p.display()),
            None => "loading embedded knowledge".to_string(),
        })?;
    let report = validate_knowledge(&knowledge);
    for error in &report.errors {
        writeln!(out, "[ERROR] {}", error)?;
    }
    for warning in &report.warnings {
        writeln!(out, "[WARNING] {}", warning)?;
    }
    writeln!(
        out,
        "{} lights, {} scenario graphs: {} errors, {} warnings",
        knowledge.kb.len(),
        knowledge.scenarios.len(),
        report.errors.len(),
        report.warnings.len()
    )?;
    Ok(report.is_ok())
}

pub fn show_config<W: Write>(config: &DashlightConfig, source: Option<&Path>, mut out: W) -> Result<()> {
    match source {
        Some(path) => writeln!(out, "# loaded from {}", path.display())?,
        None => writeln!(out, "# defaults (no config file found)")?,
    }
    write!(out, "{}", config.redacted().to_toml()?)?;
    Ok(())
}

pub fn version<W: Write>(mut out: W) -> Result<()> {
    writeln!(out, "dashlightctl {}", VersionInfo::current())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_words() {
        assert!(is_quit("QUIT"));
        assert!(is_quit("exit"));
        assert!(!is_quit("quite loud"));
    }

    #[test]
    fn test_request_defaults() {
        let request: TurnRequest = serde_json::from_str(r#"{"text": "oil light"}"#).unwrap();
        assert_eq!(request.text, "oil light");
        assert!(!request.has_images);
        assert_eq!(request.context, DiagnosticState::new());
    }
}
