//! Presentation order for findings.
//!
//! Findings are stable-sorted by severity, then compliance risk, then
//! confidence, all descending. Equal keys keep detection order.

use std::cmp::Ordering;

use serde::Serialize;

use crate::models::{
    ComplianceStatus, ContentIssue, DetectedClaim, Highlight, HighlightSeverity,
};

/// A claim or an issue, borrowed from an analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "finding", rename_all = "lowercase")]
pub enum Finding<'a> {
    Claim(&'a DetectedClaim),
    Issue(&'a ContentIssue),
}

impl Finding<'_> {
    pub fn id(&self) -> &str {
        match self {
            Finding::Claim(c) => &c.id,
            Finding::Issue(i) => &i.id,
        }
    }

    pub fn severity_rank(&self) -> u8 {
        match self {
            Finding::Claim(c) => c.matched_pattern.severity.rank(),
            Finding::Issue(i) => i.severity.rank(),
        }
    }

    /// Overridden claims rank as compliant.
    pub fn compliance(&self) -> ComplianceStatus {
        match self {
            Finding::Claim(c) if c.is_overridden => ComplianceStatus::Compliant,
            Finding::Claim(c) => c.compliance_status,
            Finding::Issue(i) => i.severity.compliance_equivalent(),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Finding::Claim(c) => c.confidence,
            Finding::Issue(i) => i.confidence_score,
        }
    }
}

/// Descending order over (severity, compliance, confidence).
pub fn compare(a: &Finding<'_>, b: &Finding<'_>) -> Ordering {
    b.severity_rank()
        .cmp(&a.severity_rank())
        .then_with(|| b.compliance().rank().cmp(&a.compliance().rank()))
        .then_with(|| b.confidence().total_cmp(&a.confidence()))
}

/// Claims first, then issues, each in detection order, then sorted.
pub fn rank_findings<'a>(
    claims: &'a [DetectedClaim],
    issues: &'a [ContentIssue],
) -> Vec<Finding<'a>> {
    let mut findings: Vec<Finding<'a>> = claims
        .iter()
        .map(Finding::Claim)
        .chain(issues.iter().map(Finding::Issue))
        .collect();
    findings.sort_by(compare);
    findings
}

pub fn rank_claims(claims: &mut [DetectedClaim]) {
    claims.sort_by(|a, b| compare(&Finding::Claim(a), &Finding::Claim(b)));
}

pub fn rank_issues(issues: &mut [ContentIssue]) {
    issues.sort_by(|a, b| compare(&Finding::Issue(a), &Finding::Issue(b)));
}

/// One highlight per finding, in ranked order.
///
/// Overridden claims are kept but downgraded to `info`.
pub fn build_highlights(claims: &[DetectedClaim], issues: &[ContentIssue]) -> Vec<Highlight> {
    rank_findings(claims, issues)
        .into_iter()
        .map(|finding| match finding {
            Finding::Claim(claim) => Highlight {
                id: claim.id.clone(),
                start: claim.start_offset,
                end: claim.end_offset,
                kind: claim.matched_pattern.claim_type.as_str().to_string(),
                severity: HighlightSeverity::from(finding.compliance()),
                message: claim.matched_pattern.reason.clone(),
            },
            Finding::Issue(issue) => {
                let (start, end) = issue.located_range();
                Highlight {
                    id: issue.id.clone(),
                    start,
                    end,
                    kind: issue.category.as_str().to_string(),
                    severity: HighlightSeverity::from(finding.compliance()),
                    message: issue.description.clone(),
                }
            }
        })
        .collect()
}
