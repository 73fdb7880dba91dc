//! Rendering raw traffic into (markup, plain) pairs.

use super::markup::escape;
use crate::config::ConsoleConfig;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction or origin of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Rx,
    Tx,
    System,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Rx => "RX",
            Self::Tx => "TX",
            Self::System => "SYS",
        }
    }

    fn css_class(self) -> &'static str {
        match self {
            Self::Rx => "rx",
            Self::Tx => "tx",
            Self::System => "sys",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One rendered line, ready for [`LogCache::cache_formatted`](super::LogCache::cache_formatted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedLine {
    pub kind: MessageKind,
    pub markup: String,
    /// The original text, unescaped and untrimmed.
    pub plain: String,
    pub timestamp: DateTime<Local>,
}

impl FormattedLine {
    pub fn into_pair(self) -> (String, String) {
        (self.markup, self.plain)
    }
}

/// Renders text into markup whose visible content is exactly the text.
///
/// Timestamp, direction and source travel as attributes, so stripping the
/// tags of the markup gives back the plain representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFormatter {
    pub show_timestamps: bool,
    pub show_source: bool,
}

impl Default for LogFormatter {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            show_source: true,
        }
    }
}

impl From<&ConsoleConfig> for LogFormatter {
    fn from(config: &ConsoleConfig) -> Self {
        Self {
            show_timestamps: config.show_timestamps,
            show_source: config.show_source,
        }
    }
}

impl LogFormatter {
    pub fn new(show_timestamps: bool, show_source: bool) -> Self {
        Self {
            show_timestamps,
            show_source,
        }
    }

    pub fn format_rx(&self, source: &str, text: &str) -> FormattedLine {
        self.format(MessageKind::Rx, source, text)
    }

    pub fn format_tx(&self, source: &str, text: &str) -> FormattedLine {
        self.format(MessageKind::Tx, source, text)
    }

    pub fn format_system(&self, source: &str, text: &str) -> FormattedLine {
        self.format(MessageKind::System, source, text)
    }

    pub fn format(&self, kind: MessageKind, source: &str, text: &str) -> FormattedLine {
        self.format_at(kind, source, text, Local::now())
    }

    pub fn format_at(
        &self,
        kind: MessageKind,
        source: &str,
        text: &str,
        timestamp: DateTime<Local>,
    ) -> FormattedLine {
        let body = escape(text);
        let mut markup = String::with_capacity(body.len() + 96);
        markup.push_str("<div class=\"log-line ");
        markup.push_str(kind.css_class());
        markup.push('"');
        if self.show_timestamps {
            markup.push_str(" data-time=\"");
            markup.push_str(&timestamp.format("%H:%M:%S").to_string());
            markup.push('"');
        }
        if self.show_source {
            markup.push_str(" data-label=\"");
            markup.push_str(kind.label());
            markup.push_str("\" data-source=\"");
            markup.push_str(&escape(source));
            markup.push('"');
        }
        markup.push_str(" style=\"white-space:pre-wrap\"><span class=\"body\">");
        markup.push_str(&body);
        markup.push_str("</span></div>");

        FormattedLine {
            kind,
            markup,
            plain: text.to_string(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_cache::strip_html;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn noon() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 1)
            .single()
            .unwrap()
    }

    #[test]
    fn test_markup_layout() {
        let line = LogFormatter::default().format_at(MessageKind::Rx, "CPU1", "OK", noon());
        assert_eq!(
            line.markup,
            "<div class=\"log-line rx\" data-time=\"12:00:01\" data-label=\"RX\" \
             data-source=\"CPU1\" style=\"white-space:pre-wrap\">\
             <span class=\"body\">OK</span></div>"
        );
        assert_eq!(line.plain, "OK");
    }

    #[test]
    fn test_header_attributes_are_optional() {
        let line = LogFormatter::new(false, false).format_tx("CPU1", "AT");
        assert!(!line.markup.contains("data-time"));
        assert!(!line.markup.contains("data-source"));
        assert_eq!(line.kind, MessageKind::Tx);
    }

    #[test]
    fn test_tag_text_is_escaped() {
        let line = LogFormatter::default().format_system("CPU1", "<tag>");
        assert!(line.markup.contains("&lt;tag&gt;"));
        assert!(!line.markup.contains("<tag>"));
        assert_eq!(line.plain, "<tag>");
        assert_eq!(strip_html(&line.markup), line.plain);
    }

    #[test]
    fn test_hostile_source_label_is_escaped() {
        let line = LogFormatter::default().format_rx("a\"><b>", "x");
        assert_eq!(strip_html(&line.markup), "x");
    }

    #[test]
    fn test_degenerate_inputs_produce_entries() {
        let formatter = LogFormatter::default();
        for text in ["", "   ", "\t\r\n"] {
            let line = formatter.format_rx("CPU1", text);
            assert_eq!(line.plain, text);
            assert_eq!(strip_html(&line.markup), text);
        }
    }

    #[test]
    fn test_long_text_is_not_truncated() {
        let text = "x<".repeat(6_000);
        let line = LogFormatter::default().format_rx("CPU1", &text);
        assert_eq!(line.plain.len(), 12_000);
        assert_eq!(strip_html(&line.markup), text);
    }
}
