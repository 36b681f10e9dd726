//! Trigger detection: marker glyph plus a number
//!
//! A viewer message is a switch request when it contains the marker glyph
//! (default `看`, "look at") and at least one decimal number. The first
//! number is the command:
//!
//! ```text
//! 看8           -> "8"
//! 我想看7.5个   -> "7.5"
//! 看看这个      -> none (no number)
//! 房间123       -> none (no marker)
//! ```
//!
//! The number 108 is part of product names in this domain ("108颗"), so it is
//! treated as an additive base rather than a command: `看7 108颗` means
//! scene 115, and `看108` alone is not a trigger.

use regex::Regex;
use std::sync::OnceLock;

/// Default marker glyph
pub const DEFAULT_MARKER: char = '看';

/// Decorative number folded into the first remaining token
const DECORATIVE_NUMBER: &str = "108";
const DECORATIVE_VALUE: f64 = 108.0;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").unwrap())
}

/// A detected switch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Decimal command string, e.g. "8", "7.5", "115"
    pub command: String,
    /// The spoken content the command was extracted from
    pub content: String,
}

/// Detects switch commands in spoken content
#[derive(Debug, Clone)]
pub struct TriggerParser {
    marker: char,
}

impl TriggerParser {
    /// Create a parser for the given marker glyph
    pub fn new(marker: char) -> Self {
        Self { marker }
    }

    /// The marker glyph this parser looks for
    pub fn marker(&self) -> char {
        self.marker
    }

    /// Extract the command from spoken content, if it is a trigger
    pub fn parse(&self, content: &str) -> Option<String> {
        if content.trim().is_empty() || !content.contains(self.marker) {
            return None;
        }

        let normalized = normalize_digits(content);
        let tokens: Vec<&str> = number_pattern()
            .find_iter(&normalized)
            .map(|m| m.as_str())
            .collect();

        if tokens.contains(&DECORATIVE_NUMBER) {
            let first = tokens.iter().find(|t| **t != DECORATIVE_NUMBER)?;
            let value: f64 = first.parse().ok()?;
            return Some(format_number(value + DECORATIVE_VALUE));
        }

        tokens.first().map(|t| t.to_string())
    }

    /// Parse and pair the command with its content
    pub fn detect(&self, content: &str) -> Option<Trigger> {
        self.parse(content).map(|command| Trigger {
            command,
            content: content.to_string(),
        })
    }
}

impl Default for TriggerParser {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

/// Map full-width digits and the full-width full stop to ASCII
///
/// Chinese input methods often produce `看８` instead of `看8`.
fn normalize_digits(content: &str) -> String {
    content
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '．' => '.',
            _ => c,
        })
        .collect()
}

/// Whole numbers print without a fractional part, others as the decimal value
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}
