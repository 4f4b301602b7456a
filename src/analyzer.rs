//! Section analysis: brand messaging, regulatory, tone and claim checks.
//!
//! Every check is a plain function over one section. The analyzer runs all
//! four checks over every section and concatenates the results in section
//! order, then check order. Overlapping findings from different checks are
//! kept because each carries its own remediation.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::{Match, Regex, RegexBuilder};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::models::{
    BrandGuidelines, ContentIssue, ContentSection, IssueCategory, IssueSeverity, RegulatoryRisk,
    SectionType, ValidationContext,
};

/// Sections longer than this (in chars) must carry safety language.
pub const SAFETY_DISCLOSURE_MIN_CHARS: usize = 200;

/// Unsubstantiated-claim vocabulary with a compliant rewording for each term.
const UNSUBSTANTIATED_TERMS: &[(&str, &str)] = &[
    ("proven", "shown in clinical studies"),
    ("guaranteed", "may help"),
    ("best", "an effective option"),
    ("most effective", "effective"),
    ("clinically proven", "clinically studied"),
    ("#1", "a leading"),
];

const SAFETY_PHRASES: &[&str] = &[
    "important safety information",
    "contraindications",
    "side effects",
];

const CASUAL_TERMS: &[&str] = &[
    "hey", "wow", "awesome", "cool", "amazing", "gonna", "wanna", "kinda", "sorta",
];

const PROFESSIONAL_AUDIENCES: &[&str] = &[
    "hcp",
    "healthcare professional",
    "physician",
    "prescriber",
];

static MEDICAL_OUTCOME_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"\breduc(?:es|ed|e)?\s+[\w\s'-]{1,40}?\s+by\s+\d+(?:\.\d+)?\s?%",
            "Quantified reduction claim",
        ),
        (
            concat!(
                r"\bimprov(?:es|ed|e)?\s+[\w\s'-]{1,40}?\s+in\s+",
                r"(?:as\s+little\s+as\s+)?\d+\s+(?:days?|weeks?|months?)\b",
            ),
            "Time-bound improvement claim",
        ),
        (r"\bproven\s+to\b", "Proof-of-efficacy claim"),
        (
            r"\bclinically\s+(?:demonstrated|shown|proven)\b",
            "Clinical demonstration claim",
        ),
    ]
    .into_iter()
    .map(|(pattern, label)| {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("medical outcome patterns are valid");
        (regex, label)
    })
    .collect()
});

/// Signature shared by the four section checks.
pub type SectionCheck =
    fn(&ContentSection, &BrandGuidelines, &ValidationContext) -> Vec<ContentIssue>;

/// All checks, in the order their results are concatenated.
pub const SECTION_CHECKS: [SectionCheck; 4] =
    [check_messaging, check_regulatory, check_tone, check_claims];

/// Runs every check across every section.
#[derive(Debug, Clone)]
pub struct SectionAnalyzer {
    parallel: bool,
}

impl Default for SectionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionAnalyzer {
    pub fn new() -> Self {
        Self { parallel: true }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Issues for all sections, in section order then check order.
    pub fn analyze(
        &self,
        sections: &[ContentSection],
        guidelines: &BrandGuidelines,
        context: &ValidationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentIssue>> {
        let units: Vec<(&ContentSection, SectionCheck)> = sections
            .iter()
            .flat_map(|section| SECTION_CHECKS.iter().map(move |check| (section, *check)))
            .collect();

        let run = |&(section, check): &(&ContentSection, SectionCheck)| -> Vec<ContentIssue> {
            if cancel.is_cancelled() {
                return Vec::new();
            }
            check(section, guidelines, context)
        };

        let per_unit: Vec<Vec<ContentIssue>> = if self.parallel {
            units.par_iter().map(run).collect()
        } else {
            units.iter().map(run).collect()
        };

        cancel.check()?;

        let issues: Vec<ContentIssue> = per_unit.into_iter().flatten().collect();
        tracing::debug!(
            sections = sections.len(),
            issues = issues.len(),
            "Section analysis complete"
        );
        Ok(issues)
    }
}

/// All four checks over a single section.
pub fn analyze_section(
    section: &ContentSection,
    guidelines: &BrandGuidelines,
    context: &ValidationContext,
) -> Vec<ContentIssue> {
    SECTION_CHECKS
        .iter()
        .flat_map(|check| check(section, guidelines, context))
        .collect()
}

/// Fields of an issue that vary per finding.
struct Draft {
    severity: IssueSeverity,
    regulatory_risk: RegulatoryRisk,
    confidence: f64,
    description: String,
    suggestion: String,
    specific_text: String,
    /// Byte offset of `specific_text` within the section text.
    offset: Option<usize>,
    replacement: String,
}

/// Numbers issues per (section, check) so ids are stable across runs.
struct IssueSink<'a> {
    section: &'a ContentSection,
    category: IssueCategory,
    issues: Vec<ContentIssue>,
}

impl<'a> IssueSink<'a> {
    fn new(section: &'a ContentSection, category: IssueCategory) -> Self {
        Self {
            section,
            category,
            issues: Vec::new(),
        }
    }

    fn push(&mut self, draft: Draft) {
        self.issues.push(ContentIssue {
            id: format!(
                "issue-{}-{}-{}",
                self.section.id,
                self.category.as_str(),
                self.issues.len()
            ),
            category: self.category,
            severity: draft.severity,
            description: draft.description,
            suggestion: draft.suggestion,
            section: self.section.clone(),
            specific_text: draft.specific_text,
            match_offset: draft.offset,
            suggested_replacement: draft.replacement,
            confidence_score: draft.confidence,
            regulatory_risk: draft.regulatory_risk,
        });
    }

    fn finish(self) -> Vec<ContentIssue> {
        self.issues
    }
}

/// First whole-word, case-insensitive occurrence of `term` in `text`.
///
/// Word boundaries are only enforced on sides of the term that start or end
/// with a word character, so terms such as `#1` still match.
pub fn find_whole_word<'t>(text: &'t str, term: &str) -> Option<Match<'t>> {
    let term = term.trim();
    let first = term.chars().next()?;
    let last = term.chars().last()?;
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    let pattern = format!(
        "{}{}{}",
        if is_word(first) { r"\b" } else { "" },
        regex::escape(term),
        if is_word(last) { r"\b" } else { "" },
    );
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()?;
    regex.find(text)
}

/// Prohibited brand terms, plus absent key messages in headline and body.
pub fn check_messaging(
    section: &ContentSection,
    guidelines: &BrandGuidelines,
    _context: &ValidationContext,
) -> Vec<ContentIssue> {
    let mut sink = IssueSink::new(section, IssueCategory::Messaging);

    for term in &guidelines.prohibited_terms {
        if let Some(found) = find_whole_word(&section.text, term) {
            sink.push(Draft {
                severity: IssueSeverity::High,
                regulatory_risk: RegulatoryRisk::Medium,
                confidence: 0.95,
                description: format!("Prohibited brand term \"{}\" used", term.trim()),
                suggestion: format!(
                    "Remove \"{}\" or replace it with approved brand language.",
                    found.as_str()
                ),
                specific_text: found.as_str().to_string(),
                offset: Some(found.start()),
                replacement: String::new(),
            });
        }
    }

    let carries_messages = matches!(
        section.section_type,
        SectionType::Headline | SectionType::Body
    );
    let key_messages: Vec<&str> = guidelines
        .key_messages
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .collect();
    if carries_messages && !key_messages.is_empty() {
        let lower = section.text.to_lowercase();
        let any_present = key_messages
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()));
        if !any_present {
            sink.push(Draft {
                severity: IssueSeverity::Medium,
                regulatory_risk: RegulatoryRisk::None,
                confidence: 0.8,
                description: format!(
                    "No key brand message appears in the {}",
                    section.section_type.as_str()
                ),
                suggestion: format!(
                    "Work in at least one key message, e.g. \"{}\".",
                    key_messages[0]
                ),
                specific_text: String::new(),
                offset: None,
                replacement: key_messages[0].to_string(),
            });
        }
    }

    sink.finish()
}

/// Unsubstantiated vocabulary, missing fair balance, and outcome claims.
pub fn check_regulatory(
    section: &ContentSection,
    _guidelines: &BrandGuidelines,
    context: &ValidationContext,
) -> Vec<ContentIssue> {
    let mut sink = IssueSink::new(section, IssueCategory::Regulatory);

    for (term, replacement) in UNSUBSTANTIATED_TERMS {
        if let Some(found) = find_whole_word(&section.text, term) {
            sink.push(Draft {
                severity: IssueSeverity::Critical,
                regulatory_risk: RegulatoryRisk::Critical,
                confidence: 0.9,
                description: format!(
                    "Unsubstantiated claim language: \"{}\"",
                    found.as_str()
                ),
                suggestion: "Remove absolute language or cite substantial evidence.".to_string(),
                specific_text: found.as_str().to_string(),
                offset: Some(found.start()),
                replacement: replacement.to_string(),
            });
        }
    }

    let needs_disclosure = matches!(
        section.section_type,
        SectionType::Disclaimer | SectionType::Body
    ) && section.text.chars().count() > SAFETY_DISCLOSURE_MIN_CHARS;
    if needs_disclosure {
        let lower = section.text.to_lowercase();
        if !SAFETY_PHRASES.iter().any(|p| lower.contains(p)) {
            let mut suggestion = String::from(
                "Add Important Safety Information, including contraindications and common side \
                 effects.",
            );
            if context.asset_type.eq_ignore_ascii_case("email") {
                suggestion.push_str(" Link to the full ISI from the email body.");
            }
            sink.push(Draft {
                severity: IssueSeverity::Critical,
                regulatory_risk: RegulatoryRisk::Critical,
                confidence: 0.95,
                description: "Missing safety disclosure required for fair balance".to_string(),
                suggestion,
                specific_text: String::new(),
                offset: None,
                replacement: "Important Safety Information".to_string(),
            });
        }
    }

    for (regex, label) in MEDICAL_OUTCOME_PATTERNS.iter() {
        for found in regex.find_iter(&section.text) {
            sink.push(Draft {
                severity: IssueSeverity::Critical,
                regulatory_risk: RegulatoryRisk::High,
                confidence: 0.85,
                description: format!("{}: \"{}\"", label, found.as_str()),
                suggestion: "Outcome claims must match the label and cite the pivotal study."
                    .to_string(),
                specific_text: found.as_str().to_string(),
                offset: Some(found.start()),
                replacement: String::new(),
            });
        }
    }

    sink.finish()
}

fn expects_professional_tone(guidelines: &BrandGuidelines, context: &ValidationContext) -> bool {
    match guidelines.primary_tone.as_deref() {
        Some(tone) => tone.trim().eq_ignore_ascii_case("professional"),
        None => {
            let audience = context.target_audience.to_lowercase();
            PROFESSIONAL_AUDIENCES.iter().any(|a| audience.contains(a))
        }
    }
}

/// Casual vocabulary in a brand that speaks professionally.
///
/// Without an explicit tone, professional is assumed for HCP audiences.
pub fn check_tone(
    section: &ContentSection,
    guidelines: &BrandGuidelines,
    context: &ValidationContext,
) -> Vec<ContentIssue> {
    let mut sink = IssueSink::new(section, IssueCategory::Tone);
    if !expects_professional_tone(guidelines, context) {
        return sink.finish();
    }

    for term in CASUAL_TERMS {
        if let Some(found) = find_whole_word(&section.text, term) {
            sink.push(Draft {
                severity: IssueSeverity::Medium,
                regulatory_risk: RegulatoryRisk::None,
                confidence: 0.7,
                description: format!(
                    "Casual language \"{}\" conflicts with professional tone",
                    found.as_str()
                ),
                suggestion: "Use measured, clinical wording.".to_string(),
                specific_text: found.as_str().to_string(),
                offset: Some(found.start()),
                replacement: String::new(),
            });
        }
    }

    sink.finish()
}

/// Medical-outcome claims needing substantiation, regardless of section type.
pub fn check_claims(
    section: &ContentSection,
    _guidelines: &BrandGuidelines,
    _context: &ValidationContext,
) -> Vec<ContentIssue> {
    let mut sink = IssueSink::new(section, IssueCategory::Claims);

    for (regex, label) in MEDICAL_OUTCOME_PATTERNS.iter() {
        for found in regex.find_iter(&section.text) {
            sink.push(Draft {
                severity: IssueSeverity::Critical,
                regulatory_risk: RegulatoryRisk::High,
                confidence: 0.85,
                description: format!("{} requires substantiation", label),
                suggestion: "Attach the supporting study to the claim reference list."
                    .to_string(),
                specific_text: found.as_str().to_string(),
                offset: Some(found.start()),
                replacement: String::new(),
            });
        }
    }

    sink.finish()
}
