//! Section parsing: split a content asset into typed, offset-located sections.
//!
//! Sections are emitted in field-declaration order (headline, body, CTA,
//! disclaimer), which is not necessarily the visual order of the published
//! asset. Offsets index into [`ContentAsset::document`], the non-empty fields
//! joined with [`SECTION_SEPARATOR`] in that same order.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{ContentSection, SectionType};

/// Joins consecutive sections in an asset document.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Longest single-line paragraph still treated as a headline.
const MAX_HEADLINE_CHARS: usize = 120;

/// Longest paragraph still treated as a call to action.
const MAX_CTA_CHARS: usize = 160;

const DISCLOSURE_MARKERS: &[&str] = &[
    "important safety information",
    "prescribing information",
    "contraindications",
    "side effects",
    "indications and usage",
    "this material is intended",
];

const CTA_MARKERS: &[&str] = &[
    "talk to your doctor",
    "ask your doctor",
    "learn more",
    "visit",
    "call",
    "sign up",
    "download",
    "request",
    "contact",
];

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").expect("paragraph break regex is valid"));

/// A structured promotional asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAsset {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub cta_text: String,
    #[serde(default)]
    pub disclaimer: String,
}

impl ContentAsset {
    /// Fields in declaration order.
    fn fields(&self) -> [(SectionType, &str); 4] {
        [
            (SectionType::Headline, self.headline.as_str()),
            (SectionType::Body, self.body.as_str()),
            (SectionType::Cta, self.cta_text.as_str()),
            (SectionType::Disclaimer, self.disclaimer.as_str()),
        ]
    }

    /// The text that section offsets index into.
    pub fn document(&self) -> String {
        self.fields()
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(_, text)| *text)
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }

    /// Split unstructured content into asset fields by paragraph.
    ///
    /// See [`parse_text`] for the classification rules. Every non-empty
    /// field is a verbatim slice of `content`.
    pub fn from_text(content: &str) -> Self {
        let mut asset = ContentAsset::default();
        for (section_type, range) in layout(content) {
            let text = content[range].to_string();
            match section_type {
                SectionType::Headline => asset.headline = text,
                SectionType::Body => asset.body = text,
                SectionType::Cta => asset.cta_text = text,
                SectionType::Disclaimer => asset.disclaimer = text,
            }
        }
        asset
    }
}

fn looks_like_disclaimer(paragraph: &str) -> bool {
    let lower = paragraph.to_lowercase();
    DISCLOSURE_MARKERS.iter().any(|m| lower.contains(m))
}

fn looks_like_headline(paragraph: &str) -> bool {
    !paragraph.contains('\n') && paragraph.chars().count() <= MAX_HEADLINE_CHARS
}

fn looks_like_cta(paragraph: &str) -> bool {
    let lower = paragraph.to_lowercase();
    paragraph.chars().count() <= MAX_CTA_CHARS && CTA_MARKERS.iter().any(|m| lower.contains(m))
}

/// Trimmed, non-empty paragraph spans of `content`.
fn paragraphs(content: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut push_trimmed = |range: Range<usize>| {
        let slice = &content[range.clone()];
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            let start = range.start + (slice.len() - slice.trim_start().len());
            spans.push(start..start + trimmed.len());
        }
    };

    let mut start = 0;
    for brk in PARAGRAPH_BREAK.find_iter(content) {
        push_trimmed(start..brk.start());
        start = brk.end();
    }
    push_trimmed(start..content.len());
    spans
}

/// Byte ranges of each detected section, in declaration order.
fn layout(content: &str) -> Vec<(SectionType, Range<usize>)> {
    let paras = paragraphs(content);
    let (mut lo, mut hi) = (0, paras.len());
    let text = |i: usize| &content[paras[i].clone()];

    let mut disclaimer = None;
    if hi - lo > 1 && looks_like_disclaimer(text(hi - 1)) {
        hi -= 1;
        disclaimer = Some(paras[hi].clone());
    }
    let mut headline = None;
    if hi - lo > 1 && looks_like_headline(text(lo)) {
        headline = Some(paras[lo].clone());
        lo += 1;
    }
    let mut cta = None;
    if hi - lo > 1 && looks_like_cta(text(hi - 1)) {
        hi -= 1;
        cta = Some(paras[hi].clone());
    }
    let body = (hi > lo).then(|| paras[lo].start..paras[hi - 1].end);

    [
        (SectionType::Headline, headline),
        (SectionType::Body, body),
        (SectionType::Cta, cta),
        (SectionType::Disclaimer, disclaimer),
    ]
    .into_iter()
    .filter_map(|(section_type, range)| range.map(|r| (section_type, r)))
    .collect()
}

fn section(
    section_type: SectionType,
    ordinal: usize,
    text: &str,
    start_offset: usize,
) -> ContentSection {
    ContentSection {
        id: format!("{}-{}", section_type.as_str(), ordinal),
        section_type,
        text: text.to_string(),
        start_offset,
        end_offset: start_offset + text.len(),
    }
}

/// Emit one section per non-empty field, offsets accumulating in declaration order.
pub fn parse(asset: &ContentAsset) -> Vec<ContentSection> {
    let mut sections = Vec::new();
    let mut offset = 0;

    for (section_type, text) in asset.fields() {
        if text.trim().is_empty() {
            continue;
        }
        let parsed = section(section_type, sections.len(), text, offset);
        offset = parsed.end_offset + SECTION_SEPARATOR.len();
        sections.push(parsed);
    }

    tracing::debug!(sections = sections.len(), "Parsed content sections");
    sections
}

/// Sections of unstructured content, with offsets into `content` itself.
///
/// A trailing paragraph carrying disclosure language becomes the
/// disclaimer, a short single-line opener becomes the headline, and a short
/// closing paragraph with action wording becomes the CTA. Whatever remains
/// is the body. Single-paragraph content is all body.
pub fn parse_text(content: &str) -> Vec<ContentSection> {
    let sections: Vec<_> = layout(content)
        .into_iter()
        .enumerate()
        .map(|(ordinal, (section_type, range))| {
            section(section_type, ordinal, &content[range.clone()], range.start)
        })
        .collect();
    tracing::debug!(sections = sections.len(), "Parsed content sections from text");
    sections
}
