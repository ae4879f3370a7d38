//! Option matcher: map a user answer onto the options currently offered.
//!
//! First match wins: a 1-based index, then an exact normalized label, then a
//! partial match with at least six characters of overlap. No match means the
//! caller re-prompts with the same options.

use crate::knowledge::KbOption;

/// Options offered when a question declares none.
pub const DEFAULT_OPTIONS: [&str; 3] = ["Yes", "No", "Not sure"];

/// Minimum overlap, in characters, for a partial match.
const MIN_PARTIAL_CHARS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMatch {
    pub id: Option<String>,
    pub label: String,
    pub index: usize,
}

impl OptionMatch {
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.label)
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn default_options() -> Vec<KbOption> {
    DEFAULT_OPTIONS.iter().map(|l| KbOption::from(*l)).collect()
}

/// Display labels, falling back to the default set.
pub fn option_labels(options: &[KbOption]) -> Vec<String> {
    if options.is_empty() {
        return DEFAULT_OPTIONS.iter().map(|l| l.to_string()).collect();
    }
    options.iter().map(|o| o.label().to_string()).collect()
}

pub fn match_option(options: &[KbOption], answer: &str) -> Option<OptionMatch> {
    if options.is_empty() {
        return match_option(&default_options(), answer);
    }

    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(n) = trimmed.parse::<usize>() {
        return if (1..=options.len()).contains(&n) {
            Some(to_match(&options[n - 1], n - 1))
        } else {
            None
        };
    }

    let wanted = normalize(trimmed);

    if let Some((index, option)) = options
        .iter()
        .enumerate()
        .find(|(_, o)| normalize(o.label()) == wanted)
    {
        return Some(to_match(option, index));
    }

    options
        .iter()
        .enumerate()
        .find(|(_, o)| partial_match(&normalize(o.label()), &wanted))
        .map(|(index, option)| to_match(option, index))
}

/// Same matcher over bare labels.
pub fn match_label(labels: &[String], answer: &str) -> Option<OptionMatch> {
    let options: Vec<KbOption> = labels.iter().map(|l| KbOption::Plain(l.clone())).collect();
    match_option(&options, answer)
}

fn to_match(option: &KbOption, index: usize) -> OptionMatch {
    OptionMatch {
        id: option.id().map(str::to_string),
        label: option.label().to_string(),
        index,
    }
}

fn partial_match(label: &str, answer: &str) -> bool {
    let label_len = label.chars().count();
    let answer_len = answer.chars().count();

    if label_len >= MIN_PARTIAL_CHARS && answer.contains(label) {
        return true;
    }
    if answer_len >= MIN_PARTIAL_CHARS && label.contains(answer) {
        return true;
    }
    if label_len >= MIN_PARTIAL_CHARS {
        let prefix: String = label.chars().take(MIN_PARTIAL_CHARS).collect();
        return answer.contains(&prefix);
    }
    false
}
