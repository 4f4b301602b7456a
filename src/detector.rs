//! Claim detection: scan content against the pattern library.
//!
//! Each pattern is scanned independently with a fresh `find_iter` over the
//! immutable content, so no matcher state survives between scans or between
//! calls. Scans run on the rayon pool and are merged in pattern order.

use std::sync::Arc;

use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::config::DEFAULT_CONTEXT_WINDOW;
use crate::error::Result;
use crate::models::{
    BrandRules, ClaimType, ComplianceStatus, DetectedClaim, MatchedPattern, PatternSeverity,
    ValidationContext,
};
use crate::patterns::{Pattern, PatternLibrary};

/// Stand-in used when the approved indication could not be fetched.
pub const INDICATION_PLACEHOLDER: &str = "[approved indication]";

const BASE_CONFIDENCE: f64 = 0.7;
const MIN_CONFIDENCE: f64 = 0.3;
const MAX_CONFIDENCE: f64 = 1.0;

/// Why a single pattern scan was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanError {
    EmptyMatch { offset: usize },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::EmptyMatch { offset } => write!(f, "empty match at byte {}", offset),
        }
    }
}

/// Per-call inputs resolved from collaborators.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInputs<'a> {
    pub context: &'a ValidationContext,
    pub brand_rules: &'a BrandRules,
    pub approved_indication: Option<&'a str>,
}

/// Scans content for regulated claims.
#[derive(Debug, Clone)]
pub struct ClaimDetector {
    library: Arc<PatternLibrary>,
    context_window: usize,
    parallel: bool,
}

impl ClaimDetector {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self {
            library,
            context_window: DEFAULT_CONTEXT_WINDOW,
            parallel: true,
        }
    }

    pub fn with_context_window(mut self, chars: usize) -> Self {
        self.context_window = chars;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// Detect claims with no deadline and a placeholder indication.
    pub fn detect(
        &self,
        content: &str,
        context: &ValidationContext,
        brand_rules: &BrandRules,
    ) -> Vec<DetectedClaim> {
        let inputs = DetectionInputs {
            context,
            brand_rules,
            approved_indication: None,
        };
        // A fresh token never trips, so this cannot be Err.
        self.detect_cancellable(content, &inputs, &CancellationToken::new())
            .unwrap_or_default()
    }

    /// Detect claims, abandoning the run if `cancel` trips.
    ///
    /// Output order is pattern order, then match order within a pattern.
    pub fn detect_cancellable(
        &self,
        content: &str,
        inputs: &DetectionInputs<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DetectedClaim>> {
        let patterns = self.library.list_patterns();
        let scan = |(index, pattern): (usize, &Pattern)| -> Vec<DetectedClaim> {
            if cancel.is_cancelled() {
                return Vec::new();
            }
            match self.scan_pattern(index, pattern, content, inputs) {
                Ok(claims) => claims,
                Err(e) => {
                    tracing::warn!(
                        pattern_index = index,
                        category = %pattern.category,
                        error = %e,
                        "Skipping pattern after scan failure"
                    );
                    Vec::new()
                }
            }
        };

        let per_pattern: Vec<Vec<DetectedClaim>> = if self.parallel {
            patterns.par_iter().enumerate().map(scan).collect()
        } else {
            patterns.iter().enumerate().map(scan).collect()
        };

        cancel.check()?;

        let claims: Vec<DetectedClaim> = per_pattern.into_iter().flatten().collect();
        tracing::debug!(
            patterns = patterns.len(),
            claims = claims.len(),
            "Claim detection complete"
        );
        Ok(claims)
    }

    fn scan_pattern(
        &self,
        index: usize,
        pattern: &Pattern,
        content: &str,
        inputs: &DetectionInputs<'_>,
    ) -> std::result::Result<Vec<DetectedClaim>, ScanError> {
        let mut claims = Vec::new();

        for found in pattern.matcher.find_iter(content) {
            if found.start() == found.end() {
                return Err(ScanError::EmptyMatch {
                    offset: found.start(),
                });
            }

            let text = found.as_str();
            claims.push(DetectedClaim {
                id: DetectedClaim::make_id(index, found.start()),
                text: text.to_string(),
                matched_pattern: MatchedPattern {
                    pattern_index: index,
                    claim_type: pattern.claim_type,
                    severity: pattern.severity,
                    reason: pattern.reason.clone(),
                    required_evidence: pattern.required_evidence.clone(),
                    category: pattern.category.clone(),
                },
                start_offset: found.start(),
                end_offset: found.end(),
                surrounding_context: surrounding_context(
                    content,
                    found.start(),
                    found.end(),
                    self.context_window,
                )
                .to_string(),
                suggestion: build_suggestion(pattern, inputs),
                confidence: score_confidence(text, pattern.severity),
                compliance_status: classify_compliance(
                    text,
                    pattern.severity,
                    inputs.brand_rules,
                ),
                is_overridden: false,
                override_reason: None,
            });
        }

        Ok(claims)
    }
}

/// The match plus up to `window` characters on either side, clamped to the content.
pub fn surrounding_context(content: &str, start: usize, end: usize, window: usize) -> &str {
    let ctx_start = content[..start]
        .char_indices()
        .rev()
        .take(window)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let ctx_end = content[end..]
        .char_indices()
        .nth(window)
        .map(|(i, _)| end + i)
        .unwrap_or(content.len());
    &content[ctx_start..ctx_end]
}

/// Confidence that a match is a genuine regulated claim.
pub fn score_confidence(text: &str, severity: PatternSeverity) -> f64 {
    let mut confidence = BASE_CONFIDENCE;
    if severity == PatternSeverity::Error {
        confidence += 0.2;
    }
    let lower = text.to_lowercase();
    if lower.contains("superior") || lower.contains("better") {
        confidence += 0.1;
    }
    if text.chars().count() < 5 {
        confidence -= 0.2;
    }
    // Two decimals keeps scores stable across float accumulation order.
    ((confidence * 100.0).round() / 100.0).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Classify a matched phrase against brand policy.
///
/// Forbidden terms win over caution terms, which win over approved language.
/// Unlisted phrases fall back to the pattern severity: anything at warning or
/// above still needs reviewer attention.
pub fn classify_compliance(
    text: &str,
    severity: PatternSeverity,
    brand_rules: &BrandRules,
) -> ComplianceStatus {
    let lower = text.to_lowercase();
    let contains = |term: &String| {
        let term = term.trim().to_lowercase();
        !term.is_empty() && lower.contains(&term)
    };

    if brand_rules.forbidden_terms.iter().any(contains) {
        return ComplianceStatus::Violation;
    }
    if brand_rules.caution_terms.iter().any(contains) {
        return ComplianceStatus::Warning;
    }
    if brand_rules
        .approved_language
        .iter()
        .any(|phrase| phrase.to_lowercase().contains(&lower))
    {
        return ComplianceStatus::Compliant;
    }
    match severity {
        PatternSeverity::Error | PatternSeverity::Warning => ComplianceStatus::Warning,
        PatternSeverity::Info => ComplianceStatus::Compliant,
    }
}

fn build_suggestion(pattern: &Pattern, inputs: &DetectionInputs<'_>) -> String {
    let mut suggestion = match pattern.claim_type {
        ClaimType::Clinical => {
            "Cite the supporting clinical study and link to full prescribing information."
                .to_string()
        }
        ClaimType::Comparative => {
            "Support the comparison with head-to-head data or remove the comparative language."
                .to_string()
        }
        ClaimType::Safety => {
            "Replace absolute safety language with balanced risk information from the label."
                .to_string()
        }
        ClaimType::Statistical => {
            "Footnote the source of this figure, including study population and endpoint."
                .to_string()
        }
        ClaimType::Indication => format!(
            "Align indication wording with the approved label: \"{}\".",
            inputs.approved_indication.unwrap_or(INDICATION_PLACEHOLDER)
        ),
        ClaimType::Superlative => {
            "Remove the superlative or substantiate it against all alternatives.".to_string()
        }
    };

    if !pattern.required_evidence.is_empty() {
        suggestion.push_str(&format!(
            " Required evidence: {}.",
            pattern.required_evidence.join("; ")
        ));
    }

    let context = inputs.context;
    let is_email = context.asset_type.eq_ignore_ascii_case("email");
    if is_email && pattern.severity == PatternSeverity::Error {
        suggestion.push_str(
            " Email assets must keep this claim within the first screen alongside the ISI link.",
        );
    }

    let region = context.region.trim();
    if !region.is_empty()
        && !region.eq_ignore_ascii_case("US")
        && pattern.claim_type == ClaimType::Indication
    {
        suggestion.push_str(&format!(
            " Confirm the indication is approved in {}; local labels may differ.",
            region
        ));
    }

    suggestion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationContext;
    use crate::patterns::{PatternConfig, PatternLibrary};

    fn detector() -> ClaimDetector {
        ClaimDetector::new(Arc::new(PatternLibrary::builtin().expect("compile")))
    }

    fn literal(pattern: &str, claim_type: ClaimType, severity: PatternSeverity) -> PatternConfig {
        PatternConfig {
            pattern: pattern.to_string(),
            claim_type,
            severity,
            reason: "test".to_string(),
            required_evidence: vec![],
            category: String::new(),
            case_insensitive: true,
        }
    }

    #[test]
    fn detects_clinical_and_comparative_claims() {
        let content = "This treatment is clinically proven and superior to all alternatives.";
        let claims =
            detector().detect(content, &ValidationContext::new("b"), &BrandRules::default());

        let clinical = claims
            .iter()
            .find(|c| c.text == "clinically proven")
            .expect("clinical claim");
        assert_eq!(clinical.matched_pattern.claim_type, ClaimType::Clinical);
        assert_eq!(clinical.matched_pattern.severity, PatternSeverity::Warning);
        assert!(clinical.compliance_status.rank() >= ComplianceStatus::Warning.rank());

        let comparative = claims
            .iter()
            .find(|c| c.text == "superior to")
            .expect("comparative claim");
        assert_eq!(comparative.matched_pattern.claim_type, ClaimType::Comparative);
        assert_eq!(comparative.matched_pattern.severity, PatternSeverity::Error);
        assert!(comparative.compliance_status.rank() >= ComplianceStatus::Warning.rank());
    }

    #[test]
    fn forbidden_term_is_a_violation() {
        let rules = BrandRules {
            forbidden_terms: vec!["cure".to_string()],
            ..BrandRules::default()
        };
        let content = "may cure your condition";
        let claims = detector().detect(content, &ValidationContext::new("b"), &rules);
        let cure = claims.iter().find(|c| c.text == "cure").expect("cure claim");
        assert_eq!(cure.compliance_status, ComplianceStatus::Violation);
    }

    #[test]
    fn caution_term_is_a_warning_and_forbidden_wins() {
        let rules = BrandRules {
            forbidden_terms: vec!["superior".to_string()],
            caution_terms: vec!["superior".to_string(), "proven".to_string()],
            approved_language: vec![],
        };
        assert_eq!(
            classify_compliance("superior to", PatternSeverity::Info, &rules),
            ComplianceStatus::Violation
        );
        assert_eq!(
            classify_compliance("clinically proven", PatternSeverity::Info, &rules),
            ComplianceStatus::Warning
        );
    }

    #[test]
    fn blank_brand_terms_never_match() {
        let rules = BrandRules {
            forbidden_terms: vec!["".to_string(), "   ".to_string()],
            ..BrandRules::default()
        };
        assert_eq!(
            classify_compliance("well tolerated", PatternSeverity::Info, &rules),
            ComplianceStatus::Compliant
        );
    }

    #[test]
    fn approved_language_is_compliant() {
        let rules = BrandRules {
            approved_language: vec!["Clinically proven to lower A1C".to_string()],
            ..BrandRules::default()
        };
        assert_eq!(
            classify_compliance("clinically proven", PatternSeverity::Warning, &rules),
            ComplianceStatus::Compliant
        );
    }

    #[test]
    fn offsets_slice_back_to_claim_text() {
        let content = "Réduit de 50% — clinically shown and better than placebo.";
        let claims =
            detector().detect(content, &ValidationContext::new("b"), &BrandRules::default());
        assert!(!claims.is_empty());
        for claim in &claims {
            assert_eq!(&content[claim.start_offset..claim.end_offset], claim.text);
            assert!(claim.surrounding_context.contains(&claim.text));
        }
    }

    #[test]
    fn surrounding_context_is_clamped() {
        let content = "best";
        assert_eq!(surrounding_context(content, 0, 4, 50), "best");

        let content = "0123456789best0123456789";
        assert_eq!(surrounding_context(content, 10, 14, 3), "789best012");
        assert_eq!(surrounding_context(content, 10, 14, 0), "best");
    }

    #[test]
    fn confidence_rules() {
        assert_eq!(score_confidence("clinically proven", PatternSeverity::Warning), 0.7);
        assert_eq!(score_confidence("the best choice", PatternSeverity::Error), 0.9);
        assert_eq!(score_confidence("superior to", PatternSeverity::Error), 1.0);
        assert_eq!(score_confidence("cure", PatternSeverity::Warning), 0.5);
        assert_eq!(score_confidence("50%", PatternSeverity::Info), 0.5);
    }

    #[test]
    fn ids_derive_from_pattern_and_offset() {
        let content = "the best and the best";
        let claims =
            detector().detect(content, &ValidationContext::new("b"), &BrandRules::default());
        let ids: Vec<_> = claims
            .iter()
            .filter(|c| c.text == "best")
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["claim-2-4", "claim-2-17"]);
    }

    #[test]
    fn empty_match_pattern_is_skipped_not_fatal() {
        let library = PatternLibrary::from_configs(
            "t",
            &[
                literal(r"\b", ClaimType::Clinical, PatternSeverity::Info),
                literal(r"\bcure\b", ClaimType::Indication, PatternSeverity::Warning),
            ],
        )
        .expect("compile");
        let claims = ClaimDetector::new(Arc::new(library)).detect(
            "may cure",
            &ValidationContext::new("b"),
            &BrandRules::default(),
        );
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].matched_pattern.pattern_index, 1);
    }

    #[test]
    fn every_occurrence_is_reported_in_long_documents() {
        let content = "Response rate 12%. ".repeat(1_500);
        let claims =
            detector().detect(&content, &ValidationContext::new("b"), &BrandRules::default());
        let statistical: Vec<_> = claims
            .iter()
            .filter(|c| c.matched_pattern.claim_type == ClaimType::Statistical)
            .collect();
        assert_eq!(statistical.len(), 1_500);
        let last = statistical.last().expect("matches");
        assert_eq!(&content[last.start_offset..last.end_offset], "12%");
    }

    #[test]
    fn email_error_claims_get_placement_advice() {
        let context = ValidationContext::new("b").with_asset_type("Email");
        let claims = detector().detect("superior to placebo", &context, &BrandRules::default());
        assert!(claims[0].suggestion.contains("Email assets"));

        let web = ValidationContext::new("b").with_asset_type("Web");
        let claims = detector().detect("superior to placebo", &web, &BrandRules::default());
        assert!(!claims[0].suggestion.contains("Email assets"));
    }

    #[test]
    fn non_us_indication_claims_get_market_advice() {
        let context = ValidationContext::new("b").with_region("EU");
        let inputs = DetectionInputs {
            context: &context,
            brand_rules: &BrandRules::default(),
            approved_indication: Some("adults with type 2 diabetes"),
        };
        let claims = detector()
            .detect_cancellable("indicated for adults", &inputs, &CancellationToken::new())
            .expect("not cancelled");
        let indication = claims
            .iter()
            .find(|c| c.matched_pattern.claim_type == ClaimType::Indication)
            .expect("indication claim");
        assert!(indication.suggestion.contains("adults with type 2 diabetes"));
        assert!(indication.suggestion.contains("approved in EU"));
    }

    #[test]
    fn missing_indication_uses_placeholder() {
        let claims = detector().detect(
            "treats chronic pain",
            &ValidationContext::new("b"),
            &BrandRules::default(),
        );
        assert!(claims[0].suggestion.contains(INDICATION_PLACEHOLDER));
    }

    #[test]
    fn cancelled_detection_returns_error() {
        let context = ValidationContext::new("b");
        let inputs = DetectionInputs {
            context: &context,
            brand_rules: &BrandRules::default(),
            approved_indication: None,
        };
        let token = CancellationToken::new();
        token.cancel();
        let result = detector().detect_cancellable("the best", &inputs, &token);
        assert!(matches!(result, Err(crate::error::MlrError::Cancelled)));
    }

    #[test]
    fn parallel_and_sequential_scans_agree() {
        let content =
            "Clinically proven, 40% better than placebo; the #1 breakthrough. Treats pain.";
        let context = ValidationContext::new("b");
        let rules = BrandRules::default();
        let parallel = detector().with_parallel(true).detect(content, &context, &rules);
        let sequential = detector().with_parallel(false).detect(content, &context, &rules);
        assert_eq!(parallel, sequential);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::models::ValidationContext;
    use proptest::prelude::*;

    fn content_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                Just("clinically proven".to_string()),
                Just("superior to".to_string()),
                Just("the best".to_string()),
                Just("25%".to_string()),
                Just("cures".to_string()),
                Just("héllo wörld".to_string()),
                "[a-z ]{0,15}",
            ],
            0..12,
        )
        .prop_map(|parts| parts.join(" "))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every claim's offsets slice back to its text, and confidence stays in bounds.
        #[test]
        fn prop_offsets_and_confidence(content in content_strategy()) {
            let library = PatternLibrary::builtin().expect("compile");
            let detector = ClaimDetector::new(Arc::new(library));
            let context = ValidationContext::new("b");
            let claims = detector.detect(&content, &context, &BrandRules::default());
            for claim in &claims {
                let sliced = &content[claim.start_offset..claim.end_offset];
                prop_assert_eq!(sliced, claim.text.as_str());
                prop_assert!(claim.end_offset <= content.len());
                prop_assert!((0.3..=1.0).contains(&claim.confidence));
            }
        }

        /// Identical input yields identical claims.
        #[test]
        fn prop_detection_is_deterministic(content in content_strategy()) {
            let library = PatternLibrary::builtin().expect("compile");
            let detector = ClaimDetector::new(Arc::new(library));
            let context = ValidationContext::new("b");
            let first = detector.detect(&content, &context, &BrandRules::default());
            let second = detector.detect(&content, &context, &BrandRules::default());
            prop_assert_eq!(first, second);
        }
    }
}
