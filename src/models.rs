//! Core data models for mlrguard.
//!
//! Every value here is created fresh per analysis run. The only field a
//! caller may change afterwards is `DetectedClaim::is_overridden` (with its
//! reason), which records a human review decision.
//!
//! All offsets are UTF-8 byte offsets into the analyzed content, `start`
//! inclusive and `end` exclusive, always on char boundaries. Use
//! [`Highlight::utf16_range`] when a host indexes strings in UTF-16.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of regulated statement a pattern recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Clinical,
    Comparative,
    Safety,
    Statistical,
    Indication,
    Superlative,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Clinical => "clinical",
            ClaimType::Comparative => "comparative",
            ClaimType::Safety => "safety",
            ClaimType::Statistical => "statistical",
            ClaimType::Indication => "indication",
            ClaimType::Superlative => "superlative",
        }
    }
}

/// Severity attached to a library pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSeverity {
    Info,
    Warning,
    Error,
}

impl PatternSeverity {
    /// Ranking bucket shared with [`IssueSeverity::rank`].
    pub fn rank(&self) -> u8 {
        match self {
            PatternSeverity::Error => 3,
            PatternSeverity::Warning => 2,
            PatternSeverity::Info => 1,
        }
    }
}

/// Compliance classification of a detected claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    Compliant,
    Warning,
    Violation,
}

impl ComplianceStatus {
    pub fn rank(&self) -> u8 {
        match self {
            ComplianceStatus::Violation => 3,
            ComplianceStatus::Warning => 2,
            ComplianceStatus::Compliant => 1,
        }
    }
}

/// Which section check produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Messaging,
    Regulatory,
    Tone,
    Claims,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Messaging => "messaging",
            IssueCategory::Regulatory => "regulatory",
            IssueCategory::Tone => "tone",
            IssueCategory::Claims => "claims",
        }
    }
}

/// Severity of a section-scoped issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl IssueSeverity {
    /// Ranking bucket: critical sits with `error`, high and medium with
    /// `warning`, low with `info`.
    pub fn rank(&self) -> u8 {
        match self {
            IssueSeverity::Critical => 3,
            IssueSeverity::High | IssueSeverity::Medium => 2,
            IssueSeverity::Low => 1,
        }
    }

    /// Compliance status an issue of this severity stands for when it is
    /// ranked or counted next to claims.
    pub fn compliance_equivalent(&self) -> ComplianceStatus {
        match self {
            IssueSeverity::Critical | IssueSeverity::High => ComplianceStatus::Violation,
            IssueSeverity::Medium => ComplianceStatus::Warning,
            IssueSeverity::Low => ComplianceStatus::Compliant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegulatoryRisk {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Impact of a risk factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

impl Impact {
    pub fn weight(&self) -> u32 {
        match self {
            Impact::Low => 1,
            Impact::Medium => 2,
            Impact::High => 3,
            Impact::Critical => 4,
        }
    }

    /// Deduction from the baseline approval probability.
    pub fn approval_penalty(&self) -> f64 {
        match self {
            Impact::Low => 0.02,
            Impact::Medium => 0.05,
            Impact::High => 0.10,
            Impact::Critical => 0.20,
        }
    }
}

/// Likelihood of a risk factor materialising in review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    Low,
    Medium,
    High,
}

impl Likelihood {
    pub fn weight(&self) -> u32 {
        match self {
            Likelihood::Low => 1,
            Likelihood::Medium => 2,
            Likelihood::High => 3,
        }
    }
}

/// Overall risk of an asset. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Content,
    Regulatory,
    Messaging,
    Timeline,
    Process,
}

/// Semantic role of a section of a content asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Headline,
    Body,
    Cta,
    Disclaimer,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Headline => "headline",
            SectionType::Body => "body",
            SectionType::Cta => "cta",
            SectionType::Disclaimer => "disclaimer",
        }
    }
}

/// A contiguous, typed slice of a content document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSection {
    pub id: String,
    pub section_type: SectionType,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// The pattern metadata carried by a detected claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPattern {
    pub pattern_index: usize,
    pub claim_type: ClaimType,
    pub severity: PatternSeverity,
    pub reason: String,
    pub required_evidence: Vec<String>,
    pub category: String,
}

/// A regulated phrase located in the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedClaim {
    pub id: String,
    pub text: String,
    pub matched_pattern: MatchedPattern,
    pub start_offset: usize,
    pub end_offset: usize,
    pub surrounding_context: String,
    pub suggestion: String,
    pub confidence: f64,
    pub compliance_status: ComplianceStatus,
    pub is_overridden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
}

impl DetectedClaim {
    /// Deterministic id for the match of `pattern_index` starting at `start_offset`.
    pub fn make_id(pattern_index: usize, start_offset: usize) -> String {
        format!("claim-{}-{}", pattern_index, start_offset)
    }
}

/// A section-scoped brand or regulatory finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentIssue {
    pub id: String,
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub description: String,
    pub suggestion: String,
    pub section: ContentSection,
    pub specific_text: String,
    /// Byte offset of `specific_text` within `section.text`, when the check
    /// located it. Absence rules leave it unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_offset: Option<usize>,
    pub suggested_replacement: String,
    pub confidence_score: f64,
    pub regulatory_risk: RegulatoryRisk,
}

impl ContentIssue {
    /// Byte range of the flagged text in the analyzed document, or the
    /// whole section when nothing was located (absence rules).
    pub fn located_range(&self) -> (usize, usize) {
        let len = self.specific_text.len();
        let located = self.match_offset.filter(|&local| {
            len > 0
                && local
                    .checked_add(len)
                    .and_then(|end| self.section.text.get(local..end))
                    == Some(self.specific_text.as_str())
        });
        match located {
            Some(local) => {
                let start = self.section.start_offset + local;
                (start, start + len)
            }
            None => (self.section.start_offset, self.section.end_offset),
        }
    }
}

/// Brand-policy term lists supplied by the brand rule collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandRules {
    #[serde(default)]
    pub forbidden_terms: Vec<String>,
    #[serde(default)]
    pub caution_terms: Vec<String>,
    #[serde(default)]
    pub approved_language: Vec<String>,
}

/// Messaging and tone guidance for a brand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandGuidelines {
    #[serde(default)]
    pub key_messages: Vec<String>,
    #[serde(default)]
    pub prohibited_terms: Vec<String>,
    #[serde(default)]
    pub primary_tone: Option<String>,
}

/// Brand positioning used to fill gaps in [`BrandGuidelines`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandVision {
    #[serde(default)]
    pub primary_tone: Option<String>,
    #[serde(default)]
    pub key_messages: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Who, where and what an asset is for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationContext {
    pub brand_id: String,
    #[serde(default)]
    pub therapeutic_area: String,
    #[serde(default)]
    pub asset_type: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_guidelines: Option<BrandGuidelines>,
}

impl ValidationContext {
    pub fn new(brand_id: impl Into<String>) -> Self {
        Self {
            brand_id: brand_id.into(),
            region: "US".to_string(),
            ..Self::default()
        }
    }

    pub fn with_asset_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = asset_type.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = audience.into();
        self
    }

    pub fn with_therapeutic_area(mut self, area: impl Into<String>) -> Self {
        self.therapeutic_area = area.into();
        self
    }

    pub fn with_guidelines(mut self, guidelines: BrandGuidelines) -> Self {
        self.brand_guidelines = Some(guidelines);
        self
    }

    /// Check that the mandatory fields are present.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.brand_id.trim().is_empty() {
            return Err(crate::error::MlrError::InvalidContext(
                "brandId is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A named exposure contributing to the overall risk profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub category: RiskCategory,
    pub description: String,
    pub impact: Impact,
    pub likelihood: Likelihood,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    pub overall_risk: RiskLevel,
    pub risk_factors: Vec<RiskFactor>,
    pub mitigation_strategies: Vec<String>,
    pub estimated_approval_probability: f64,
    pub expected_turnaround_hours: u32,
}

/// Finding counts used to gate the review workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub valid: usize,
    pub warnings: usize,
    pub failures: usize,
}

impl Summary {
    /// Count findings by status.
    ///
    /// Overridden claims count as valid. Issues are counted through
    /// [`IssueSeverity::compliance_equivalent`].
    pub fn tally(claims: &[DetectedClaim], issues: &[ContentIssue]) -> Self {
        let mut summary = Summary::default();
        let statuses = claims
            .iter()
            .map(|c| {
                if c.is_overridden {
                    ComplianceStatus::Compliant
                } else {
                    c.compliance_status
                }
            })
            .chain(issues.iter().map(|i| i.severity.compliance_equivalent()));

        for status in statuses {
            match status {
                ComplianceStatus::Violation => summary.failures += 1,
                ComplianceStatus::Warning => summary.warnings += 1,
                ComplianceStatus::Compliant => summary.valid += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightSeverity {
    Error,
    Warning,
    Info,
}

impl From<ComplianceStatus> for HighlightSeverity {
    fn from(status: ComplianceStatus) -> Self {
        match status {
            ComplianceStatus::Violation => HighlightSeverity::Error,
            ComplianceStatus::Warning => HighlightSeverity::Warning,
            ComplianceStatus::Compliant => HighlightSeverity::Info,
        }
    }
}

/// A span for the UI to underline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub start: usize,
    pub end: usize,
    /// Claim type or issue category.
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: HighlightSeverity,
    pub message: String,
}

impl Highlight {
    /// Convert the byte range to UTF-16 code unit offsets within `content`.
    ///
    /// Returns `None` if the range does not fall on char boundaries of `content`.
    pub fn utf16_range(&self, content: &str) -> Option<(usize, usize)> {
        if self.start > self.end
            || !content.is_char_boundary(self.start)
            || !content.is_char_boundary(self.end)
        {
            return None;
        }
        let start = content[..self.start].encode_utf16().count();
        let len = content[self.start..self.end].encode_utf16().count();
        Some((start, start + len))
    }
}

/// Collaborator that fell back to defaults during an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DegradedSource {
    BrandRules,
    ApprovedIndication,
    Guidelines,
    BrandVision,
}

/// Top-level output of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub claims: Vec<DetectedClaim>,
    pub issues: Vec<ContentIssue>,
    pub risk_profile: RiskProfile,
    pub summary: Summary,
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub degraded: Vec<DegradedSource>,
    pub content_hash: String,
    pub pattern_library_version: String,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Whether any collaborator fell back to defaults.
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Record a human override on one claim.
    ///
    /// Summary, claim order and highlights are recomputed so the claim reads
    /// as compliant everywhere.
    pub fn override_claim(
        &mut self,
        claim_id: &str,
        reason: impl Into<String>,
    ) -> crate::error::Result<()> {
        let claim = self.claim_mut(claim_id)?;
        claim.is_overridden = true;
        claim.override_reason = Some(reason.into());
        self.refresh_findings();
        tracing::info!(claim_id = %claim_id, "Claim overridden");
        Ok(())
    }

    /// Undo a previous override and recompute the derived views.
    pub fn clear_override(&mut self, claim_id: &str) -> crate::error::Result<()> {
        let claim = self.claim_mut(claim_id)?;
        claim.is_overridden = false;
        claim.override_reason = None;
        self.refresh_findings();
        tracing::info!(claim_id = %claim_id, "Claim override cleared");
        Ok(())
    }

    fn claim_mut(&mut self, claim_id: &str) -> crate::error::Result<&mut DetectedClaim> {
        self.claims
            .iter_mut()
            .find(|c| c.id == claim_id)
            .ok_or_else(|| crate::error::MlrError::OverrideTarget(claim_id.to_string()))
    }

    fn refresh_findings(&mut self) {
        crate::ranker::rank_claims(&mut self.claims);
        self.summary = Summary::tally(&self.claims, &self.issues);
        self.highlights = crate::ranker::build_highlights(&self.claims, &self.issues);
    }
}
