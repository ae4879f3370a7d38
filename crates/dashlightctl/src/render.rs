//! Terminal rendering of envelopes for `chat`.

use dashlight_shared::payload::{AlertLevel, StatusColor};
use dashlight_shared::{DiagnosisReport, Envelope, Payload};
use owo_colors::{OwoColorize, Style};
use std::fmt::Write;

/// Applies styles only when color is on.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    pub color: bool,
}

impl Painter {
    pub fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }
}

fn status_style(color: StatusColor) -> Style {
    match color {
        StatusColor::Red => Style::new().bright_red().bold(),
        StatusColor::Orange | StatusColor::Yellow => Style::new().yellow().bold(),
        StatusColor::Green => Style::new().bright_green().bold(),
        StatusColor::Blue => Style::new().cyan().bold(),
    }
}

fn options(out: &mut String, p: Painter, options: &[String]) {
    for (i, option) in options.iter().enumerate() {
        let _ = writeln!(out, "  {} {}", p.paint(&format!("[{}]", i + 1), Style::new().cyan()), option);
    }
}

fn report(out: &mut String, p: Painter, r: &DiagnosisReport) {
    let _ = writeln!(out, "{}", p.paint(&r.title, Style::new().bold()));
    let _ = writeln!(out, "{}", "=".repeat(r.title.chars().count().clamp(10, 60)));
    let _ = writeln!(out, "{}", p.paint(&r.status.text, status_style(r.status.color)));
    if !r.status.instruction.is_empty() {
        let _ = writeln!(out, "{}", r.status.instruction);
    }
    let _ = writeln!(
        out,
        "Severity: {}  Confidence: {:.0}% ({:?})",
        r.severity.ui_label(),
        r.confidence * 100.0,
        r.confidence_level
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "[RESULTS]");
    for result in &r.results {
        let pct = result
            .display_percent
            .unwrap_or_else(|| (result.probability * 100.0).round() as u32);
        let _ = writeln!(out, "  * {} ({}%)", result.issue, pct);
        if !result.explanation.is_empty() {
            let _ = writeln!(out, "    {}", result.explanation);
        }
    }
    if !r.recommendations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "[RECOMMENDATIONS]");
        for rec in &r.recommendations {
            let _ = writeln!(out, "  * {}", rec);
        }
    }
    if r.show_tow_button {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", p.paint("[TOW] Call a tow truck", Style::new().bright_red().bold()));
        for condition in &r.tow_conditions {
            let _ = writeln!(out, "  - {}", condition);
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[FOR YOUR MECHANIC]");
    let _ = writeln!(out, "{}", r.conversation_summaries.mechanic.formatted_text);
    if !r.disclaimer.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", p.paint(&r.disclaimer, Style::new().dimmed()));
    }
}

pub fn render(envelope: &Envelope, p: Painter) -> String {
    let mut out = String::new();
    if let Some(note) = &envelope.safety_note {
        let _ = writeln!(out, "{} {}", p.paint("[WARNING]", Style::new().yellow().bold()), note);
    }
    match &envelope.payload {
        Payload::Question { text, options: opts, .. } => {
            let _ = writeln!(out, "{}", text);
            options(&mut out, p, opts);
        }
        Payload::ScenarioStep { step } => {
            let _ = writeln!(out, "{}", step.text);
            options(&mut out, p, &step.options);
        }
        Payload::Instruction {
            title,
            steps,
            warning,
            message,
            question,
            options: opts,
            ..
        } => {
            if let Some(message) = message {
                let _ = writeln!(out, "{}", message);
            }
            let _ = writeln!(out, "{}", p.paint(title, Style::new().bold()));
            for (i, step) in steps.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", i + 1, step);
            }
            if let Some(warning) = warning {
                let _ = writeln!(out, "{} {}", p.paint("[CAUTION]", Style::new().yellow()), warning);
            }
            if let Some(question) = question {
                let _ = writeln!(out, "{}", question);
            }
            options(&mut out, p, opts);
        }
        Payload::SafetyInstruction { text, question, options: opts } => {
            let _ = writeln!(out, "{}", p.paint(text, Style::new().bright_red().bold()));
            let _ = writeln!(out, "{}", question);
            options(&mut out, p, opts);
        }
        Payload::SafetyAlert {
            title,
            message,
            level,
            follow_up_message,
            options: opts,
            final_card,
            ..
        } => {
            let style = match level {
                AlertLevel::Critical => Style::new().bright_red().bold(),
                AlertLevel::Warning => Style::new().yellow().bold(),
            };
            let _ = writeln!(out, "{}", p.paint(title, style));
            let _ = writeln!(out, "{}", message);
            if let Some(follow_up) = follow_up_message {
                let _ = writeln!(out, "{}", follow_up);
            }
            options(&mut out, p, opts);
            if let Some(card) = final_card {
                let _ = writeln!(out);
                report(&mut out, p, card);
            }
        }
        Payload::DiagnosisReport(r) => report(&mut out, p, r),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashlight_shared::DiagnosticState;

    #[test]
    fn test_question_lists_numbered_options() {
        let env = Envelope::new(
            Payload::question("Is it on?", vec!["Yes".into(), "No".into()], None),
            DiagnosticState::new(),
        );
        let text = render(&env, Painter { color: false });
        assert_eq!(text, "Is it on?\n  [1] Yes\n  [2] No\n");
    }

    #[test]
    fn test_color_adds_escapes() {
        let env = Envelope::new(
            Payload::question("Is it on?", vec!["Yes".into()], None),
            DiagnosticState::new(),
        );
        assert!(render(&env, Painter { color: true }).contains("\u{1b}["));
    }
}
