//! Inline color markup used in station and line names.
//!
//! Names may contain `<color>text</>` spans. They are parsed once into
//! [`StyledText`] runs so renderers never see raw markup.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::color::{parse_color, Rgb};

static SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<([^<>/]+)>(.*?)</>").expect("invalid markup regex"));

/// A contiguous piece of text with an optional validated color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub color: Option<Rgb>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
        }
    }
}

/// Parsed markup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyledText {
    pub runs: Vec<TextRun>,
}

impl StyledText {
    /// Parse `input`. Spans with an unrecognized color keep their text uncolored;
    /// unterminated tags are kept verbatim.
    pub fn parse(input: &str) -> Self {
        let mut runs = Vec::new();
        let mut cursor = 0;
        for caps in SPAN_RE.captures_iter(input) {
            let (Some(whole), Some(token), Some(body)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            push_run(&mut runs, &input[cursor..whole.start()], None);
            push_run(&mut runs, body.as_str(), parse_color(token.as_str()));
            cursor = whole.end();
        }
        push_run(&mut runs, &input[cursor..], None);
        Self { runs }
    }

    /// Text with markup removed.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.text.is_empty())
    }

    /// The text followed by `separator` and the text again, the unit a marquee scrolls.
    pub fn looped(&self, separator: &str) -> Self {
        let mut runs = self.runs.clone();
        push_run(&mut runs, separator, None);
        runs.extend(self.runs.iter().cloned());
        Self { runs }
    }
}

fn push_run(runs: &mut Vec<TextRun>, text: &str, color: Option<Rgb>) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = runs.last_mut() {
        if last.color == color {
            last.text.push_str(text);
            return;
        }
    }
    runs.push(TextRun {
        text: text.to_string(),
        color,
    });
}

/// Shorthand for `StyledText::parse(input).plain_text()`.
pub fn strip(input: &str) -> String {
    StyledText::parse(input).plain_text()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_colored_spans() {
        let text = StyledText::parse("浦东<#e4002b>国际</>机场");
        assert_eq!(
            text.runs,
            vec![
                TextRun::plain("浦东"),
                TextRun {
                    text: "国际".to_string(),
                    color: Some(Rgb::new(0xe4, 0x00, 0x2b)),
                },
                TextRun::plain("机场"),
            ]
        );
        assert_eq!(text.plain_text(), "浦东国际机场");
    }

    #[test]
    fn invalid_color_keeps_text_uncolored() {
        let text = StyledText::parse("A<url(evil)>B</>C");
        assert_eq!(text.runs, vec![TextRun::plain("ABC")]);
    }

    #[test]
    fn unterminated_tag_is_literal() {
        assert_eq!(strip("Line <red>1"), "Line <red>1");
        assert_eq!(strip("<red>1</><blue>2</>"), "12");
    }

    #[test]
    fn looped_duplicates_runs_with_separator() {
        let looped = StyledText::parse("<red>A</>").looped(" · ");
        assert_eq!(looped.plain_text(), "A · A");
        assert_eq!(looped.runs.len(), 3);
    }
}
