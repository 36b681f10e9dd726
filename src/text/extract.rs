//! Spoken-content extraction from chat client log lines
//!
//! The chat client writes one message per line in one of three shapes:
//!
//! ```text
//! 2025-08-29 22:53:09[用户发言]t： 有黄水吗
//! [用户发言]张三： 今天天气怎么样？
//! 14:30:15 李四： 大家好
//! ```
//!
//! Lines that match none of them pass through unchanged.

use regex::Regex;

/// Returned for blank lines and for messages with nothing after the speaker
pub const EMPTY_PLACEHOLDER: &str = "empty";

/// Tag the chat client writes in front of viewer messages
pub const DEFAULT_SPEECH_TAG: &str = "用户发言";

/// Strips timestamp, speech tag and speaker prefixes from log lines
#[derive(Debug, Clone)]
pub struct LineExtractor {
    /// Prefix patterns in priority order; group 1 captures the content
    patterns: Vec<Regex>,
}

impl LineExtractor {
    /// Create an extractor for the given speech tag (without brackets)
    pub fn new(speech_tag: &str) -> Self {
        let tag = regex::escape(speech_tag);

        // Speaker names run up to the first full-width or ASCII colon
        let sources = [
            format!(
                r"^\d{{4}}-\d{{2}}-\d{{2}}\s+\d{{2}}:\d{{2}}:\d{{2}}\[{}\][^：:]*[：:]\s*(.*)$",
                tag
            ),
            format!(r"^\[{}\][^：:]*[：:]\s*(.*)$", tag),
            r"^\d{2}:\d{2}:\d{2}\s+[^：:]*[：:]\s*(.*)$".to_string(),
        ];

        let patterns = sources
            .iter()
            .filter_map(|source| match Regex::new(source) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Skipping invalid line pattern {:?}: {}", source, e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Extract the spoken content from a raw log line
    ///
    /// Never fails: unstructured lines are returned trimmed, blank input and
    /// blank content yield [`EMPTY_PLACEHOLDER`].
    pub fn extract(&self, line: &str) -> String {
        let line = line.trim();
        if line.is_empty() {
            return EMPTY_PLACEHOLDER.to_string();
        }

        for pattern in &self.patterns {
            if let Some(caps) = pattern.captures(line) {
                let content = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                return if content.is_empty() {
                    EMPTY_PLACEHOLDER.to_string()
                } else {
                    content.to_string()
                };
            }
        }

        line.to_string()
    }
}

impl Default for LineExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SPEECH_TAG)
    }
}
