//! Final reformat of the accumulated answer into three separated sections:
//!
//! ```text
//! 【风险等级】：...
//!
//! 【风险点】：...
//!
//! 【喂养建议】：...
//! ```
//!
//! Text that never mentions a section marker is only trimmed.

use regex::Regex;
use std::sync::LazyLock;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use super::thinking_filter::strip_labeled_sections;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Section {
    RiskLevel,
    RiskPoint,
    FeedingAdvice,
}

impl Section {
    pub fn marker(self) -> &'static str {
        match self {
            Self::RiskLevel => "【风险等级】",
            Self::RiskPoint => "【风险点】",
            Self::FeedingAdvice => "【喂养建议】",
        }
    }

    /// First section whose marker occurs in `line`, in section order.
    fn detect(line: &str) -> Option<Self> {
        Self::iter().find(|section| line.contains(section.marker()))
    }

    fn colon_pattern(self) -> &'static Regex {
        match self {
            Self::RiskLevel => &RISK_LEVEL_COLON,
            Self::RiskPoint => &RISK_POINT_COLON,
            Self::FeedingAdvice => &FEEDING_ADVICE_COLON,
        }
    }

    fn header_pattern(self) -> &'static Regex {
        match self {
            Self::RiskLevel => &RISK_LEVEL_HEADER,
            Self::RiskPoint => &RISK_POINT_HEADER,
            Self::FeedingAdvice => &FEEDING_ADVICE_HEADER,
        }
    }

    fn canonical(self) -> String {
        format!("{}{}", self.marker(), CANONICAL_COLON)
    }
}

const CANONICAL_COLON: char = '：';

fn marker_regex(body: &str) -> Regex {
    Regex::new(body).expect("Invalid section marker regex")
}

// `marker` + colon (either width) with surrounding whitespace.
static RISK_LEVEL_COLON: LazyLock<Regex> = LazyLock::new(|| marker_regex(r"【风险等级】\s*[:：]\s*"));
static RISK_POINT_COLON: LazyLock<Regex> = LazyLock::new(|| marker_regex(r"【风险点】\s*[:：]\s*"));
static FEEDING_ADVICE_COLON: LazyLock<Regex> =
    LazyLock::new(|| marker_regex(r"【喂养建议】\s*[:：]\s*"));

// Same, colon optional: header lines always end up with one.
static RISK_LEVEL_HEADER: LazyLock<Regex> = LazyLock::new(|| marker_regex(r"【风险等级】\s*[:：]?\s*"));
static RISK_POINT_HEADER: LazyLock<Regex> = LazyLock::new(|| marker_regex(r"【风险点】\s*[:：]?\s*"));
static FEEDING_ADVICE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| marker_regex(r"【喂养建议】\s*[:：]?\s*"));

// Everything from one marker up to (not including) the next one.
static LEVEL_TO_POINT: LazyLock<Regex> =
    LazyLock::new(|| marker_regex(r"(?s)【风险等级】[:：]?([^【]*?)【风险点】"));
static POINT_TO_ADVICE: LazyLock<Regex> =
    LazyLock::new(|| marker_regex(r"(?s)【风险点】[:：]?([^【]*?)【喂养建议】"));

static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| marker_regex(r"\n{3,}"));

pub fn format_response(raw: &str) -> String {
    let text = strip_labeled_sections(raw.trim());

    if Section::iter().all(|section| !text.contains(section.marker())) {
        return text.trim().to_string();
    }

    let text = normalize_colons(&text);
    let text = separate_sections(&text);
    let text = normalize_colons(&text);
    let text = SectionWalker::default().walk(&text);
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");

    text.trim().to_string()
}

fn normalize_colons(text: &str) -> String {
    Section::iter().fold(text.to_string(), |acc, section| {
        section
            .colon_pattern()
            .replace_all(&acc, section.canonical().as_str())
            .into_owned()
    })
}

fn separate_sections(text: &str) -> String {
    let text = LEVEL_TO_POINT.replace_all(text, "【风险等级】：${1}\n\n【风险点】");
    POINT_TO_ADVICE
        .replace_all(&text, "【风险点】：${1}\n\n【喂养建议】")
        .into_owned()
}

/// Line-oriented regrouping. Lines before the first marker pass through
/// as-is; a marker line opens a section; every other non-blank line joins
/// the open section; a closed section is followed by one blank line.
#[derive(Debug, Default)]
struct SectionWalker {
    output: Vec<String>,
    open: Option<(Section, Vec<String>)>,
}

impl SectionWalker {
    fn walk(mut self, text: &str) -> String {
        for line in text.split('\n') {
            self.feed(line);
        }
        self.close(false);
        self.output.join("\n")
    }

    fn feed(&mut self, raw_line: &str) {
        let line = raw_line.trim();

        if let Some(section) = Section::detect(line) {
            self.close(true);
            let header = section
                .header_pattern()
                .replace_all(line, section.canonical().as_str())
                .into_owned();
            self.open = Some((section, vec![header]));
            return;
        }

        match self.open.as_mut() {
            Some(_) if line.is_empty() => {}
            Some((_, lines)) => lines.push(line.to_string()),
            None => self.output.push(raw_line.to_string()),
        }
    }

    fn close(&mut self, blank_after: bool) {
        if let Some((_, lines)) = self.open.take() {
            self.output.extend(lines);
            if blank_after {
                self.output.push(String::new());
            }
        }
    }
}
