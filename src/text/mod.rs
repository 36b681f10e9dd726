//! Text processing module
//!
//! Turns a raw chat log line into a switch command:
//! - [`LineExtractor`] strips timestamp, speech tag and speaker prefixes
//! - [`TriggerParser`] finds the marker glyph and extracts the command number

pub mod extract;
pub mod trigger;

pub use extract::{LineExtractor, DEFAULT_SPEECH_TAG, EMPTY_PLACEHOLDER};
pub use trigger::{Trigger, TriggerParser, DEFAULT_MARKER};

use crate::config::MonitorConfig;

/// Extractor and parser configured together from the monitor settings
#[derive(Debug, Clone)]
pub struct TextPipeline {
    extractor: LineExtractor,
    parser: TriggerParser,
}

impl TextPipeline {
    /// Create a pipeline from configuration
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            extractor: LineExtractor::new(&config.speech_tag),
            parser: TriggerParser::new(config.marker),
        }
    }

    /// Extract the content and detect a trigger in one pass
    ///
    /// Returns the cleaned content alongside the trigger so callers can log
    /// non-trigger lines too.
    pub fn process(&self, line: &str) -> (String, Option<Trigger>) {
        let content = self.extractor.extract(line);
        let trigger = self.parser.detect(&content);
        (content, trigger)
    }
}

impl Default for TextPipeline {
    fn default() -> Self {
        Self {
            extractor: LineExtractor::default(),
            parser: TriggerParser::default(),
        }
    }
}
