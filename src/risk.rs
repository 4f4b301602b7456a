//! Risk aggregation: turn findings and context into an explainable profile.
//!
//! Every number in a [`RiskProfile`] is a closed-form function of the named
//! risk factors listed in it:
//!
//! ```text
//! score       = Σ impact.weight × likelihood.weight
//! overall     = critical if any factor is critical, else high > 15, medium > 8, low
//! approval    = clamp(0.75 − Σ impact.approval_penalty, 0.10, 0.95)
//! turnaround  = round(48 × (1 + 0.2 × factors) × (1.5 if any critical))
//! ```

use crate::models::{
    ComplianceStatus, ContentIssue, DegradedSource, DetectedClaim, Impact, IssueCategory,
    IssueSeverity, Likelihood, RiskCategory, RiskFactor, RiskLevel, RiskProfile, ValidationContext,
};

const BASE_APPROVAL_PROBABILITY: f64 = 0.75;
const MIN_APPROVAL_PROBABILITY: f64 = 0.10;
const MAX_APPROVAL_PROBABILITY: f64 = 0.95;
const BASE_TURNAROUND_HOURS: f64 = 48.0;
const HIGH_RISK_SCORE: u32 = 15;
const MEDIUM_RISK_SCORE: u32 = 8;

const CONSUMER_AUDIENCES: &[&str] = &["patient", "consumer", "caregiver", "dtc"];
const HIGH_SCRUTINY_AREAS: &[&str] = &[
    "oncology",
    "rare disease",
    "pediatric",
    "psychiatry",
    "cardiology",
];
const CHANNEL_ASSET_TYPES: &[&str] = &["email", "social"];

fn factor(
    category: RiskCategory,
    description: String,
    impact: Impact,
    likelihood: Likelihood,
    mitigation: &str,
) -> RiskFactor {
    RiskFactor {
        category,
        description,
        impact,
        likelihood,
        mitigation: mitigation.to_string(),
    }
}

/// Factors implied by the findings themselves. Overridden claims are ignored.
pub fn finding_risk_factors(claims: &[DetectedClaim], issues: &[ContentIssue]) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    let active = || claims.iter().filter(|c| !c.is_overridden);

    let violations = active()
        .filter(|c| c.compliance_status == ComplianceStatus::Violation)
        .count();
    if violations > 0 {
        factors.push(factor(
            RiskCategory::Content,
            format!("{} claim(s) use language forbidden by brand policy", violations),
            Impact::High,
            Likelihood::High,
            "Remove or rewrite language flagged by brand policy",
        ));
    }

    let warnings = active()
        .filter(|c| c.compliance_status == ComplianceStatus::Warning)
        .count();
    if warnings > 0 {
        factors.push(factor(
            RiskCategory::Content,
            format!("{} claim(s) need substantiation", warnings),
            Impact::Medium,
            if warnings > 3 {
                Likelihood::High
            } else {
                Likelihood::Medium
            },
            "Attach references for each flagged claim before MLR submission",
        ));
    }

    let critical_regulatory = issues
        .iter()
        .filter(|i| {
            i.severity == IssueSeverity::Critical
                && matches!(i.category, IssueCategory::Regulatory | IssueCategory::Claims)
        })
        .count();
    if critical_regulatory > 0 {
        factors.push(factor(
            RiskCategory::Regulatory,
            format!("{} critical regulatory finding(s)", critical_regulatory),
            Impact::Critical,
            Likelihood::High,
            "Resolve critical regulatory findings with medical and legal reviewers before routing",
        ));
    }

    let brand_voice: Vec<_> = issues
        .iter()
        .filter(|i| matches!(i.category, IssueCategory::Messaging | IssueCategory::Tone))
        .collect();
    if !brand_voice.is_empty() {
        let impact = if brand_voice.iter().any(|i| i.severity == IssueSeverity::High) {
            Impact::Medium
        } else {
            Impact::Low
        };
        factors.push(factor(
            RiskCategory::Messaging,
            format!("{} brand messaging or tone issue(s)", brand_voice.len()),
            impact,
            Likelihood::Medium,
            "Align copy with brand messaging and tone guidelines",
        ));
    }

    factors
}

/// Factors implied by who, where and how the asset will be used.
pub fn context_risk_factors(
    context: &ValidationContext,
    degraded: &[DegradedSource],
) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    let audience = context.target_audience.to_lowercase();
    if CONSUMER_AUDIENCES.iter().any(|a| audience.contains(a)) {
        factors.push(factor(
            RiskCategory::Regulatory,
            "Consumer-facing audience requires heightened fair balance".to_string(),
            Impact::Medium,
            Likelihood::Medium,
            "Confirm ISI prominence and plain-language risk statements",
        ));
    }

    let region = context.region.trim();
    if !region.is_empty() && !region.eq_ignore_ascii_case("US") {
        factors.push(factor(
            RiskCategory::Regulatory,
            format!("Market {} requires local label alignment", region),
            Impact::Medium,
            Likelihood::Medium,
            "Route through local affiliate review",
        ));
    }

    let area = context.therapeutic_area.to_lowercase();
    if let Some(matched) = HIGH_SCRUTINY_AREAS.iter().find(|a| area.contains(*a)) {
        factors.push(factor(
            RiskCategory::Regulatory,
            format!("High-scrutiny therapeutic area ({})", matched),
            Impact::High,
            Likelihood::Low,
            "Assign a medical reviewer with therapeutic-area expertise",
        ));
    }

    let asset_type = context.asset_type.to_lowercase();
    if CHANNEL_ASSET_TYPES.iter().any(|t| asset_type.contains(t)) {
        factors.push(factor(
            RiskCategory::Timeline,
            format!("{} assets carry channel-specific requirements", context.asset_type),
            Impact::Low,
            Likelihood::Medium,
            "Verify channel requirements such as ISI placement and character limits",
        ));
    }

    if !degraded.is_empty() {
        let sources: Vec<_> = degraded.iter().map(|d| format!("{:?}", d)).collect();
        factors.push(factor(
            RiskCategory::Process,
            format!(
                "Analysis ran on default guidelines ({} unavailable)",
                sources.join(", ")
            ),
            Impact::Medium,
            Likelihood::Medium,
            "Re-run analysis once brand guidelines are reachable",
        ));
    }

    factors
}

pub fn risk_score(factors: &[RiskFactor]) -> u32 {
    factors
        .iter()
        .map(|f| f.impact.weight() * f.likelihood.weight())
        .sum()
}

pub fn overall_risk(factors: &[RiskFactor]) -> RiskLevel {
    if factors.iter().any(|f| f.impact == Impact::Critical) {
        return RiskLevel::Critical;
    }
    let score = risk_score(factors);
    if score > HIGH_RISK_SCORE {
        RiskLevel::High
    } else if score > MEDIUM_RISK_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn approval_probability(factors: &[RiskFactor]) -> f64 {
    let penalty: f64 = factors.iter().map(|f| f.impact.approval_penalty()).sum();
    let probability = ((BASE_APPROVAL_PROBABILITY - penalty) * 100.0).round() / 100.0;
    probability.clamp(MIN_APPROVAL_PROBABILITY, MAX_APPROVAL_PROBABILITY)
}

pub fn turnaround_hours(factors: &[RiskFactor]) -> u32 {
    let critical = if factors.iter().any(|f| f.impact == Impact::Critical) {
        1.5
    } else {
        1.0
    };
    (BASE_TURNAROUND_HOURS * (1.0 + 0.2 * factors.len() as f64) * critical).round() as u32
}

/// Build the profile from findings plus contextual factors.
///
/// Finding-derived factors come first, then `contextual` in the order given.
pub fn aggregate(
    claims: &[DetectedClaim],
    issues: &[ContentIssue],
    contextual: &[RiskFactor],
) -> RiskProfile {
    let mut risk_factors = finding_risk_factors(claims, issues);
    risk_factors.extend_from_slice(contextual);
    profile_from_factors(risk_factors)
}

pub fn profile_from_factors(risk_factors: Vec<RiskFactor>) -> RiskProfile {
    let mut mitigation_strategies: Vec<String> = Vec::new();
    for f in &risk_factors {
        if !mitigation_strategies.contains(&f.mitigation) {
            mitigation_strategies.push(f.mitigation.clone());
        }
    }

    let profile = RiskProfile {
        overall_risk: overall_risk(&risk_factors),
        estimated_approval_probability: approval_probability(&risk_factors),
        expected_turnaround_hours: turnaround_hours(&risk_factors),
        mitigation_strategies,
        risk_factors,
    };
    tracing::debug!(
        overall_risk = ?profile.overall_risk,
        factors = profile.risk_factors.len(),
        score = risk_score(&profile.risk_factors),
        "Risk profile aggregated"
    );
    profile
}
