//! Pattern library: the versioned set of regulated-phrase rules.
//!
//! A library is compiled once from [`PatternConfig`] entries and is immutable
//! afterwards. Shipping new rules means building a new library (with a new
//! version) and swapping the `Arc` held by the engine; readers never observe
//! a half-updated library.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{MlrError, Result};
use crate::models::{ClaimType, PatternSeverity};

/// Version tag of the built-in rule set.
pub const BUILTIN_LIBRARY_VERSION: &str = "builtin-2024.1";

/// Compiled size ceiling for a single pattern.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Serializable description of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternConfig {
    pub pattern: String,
    pub claim_type: ClaimType,
    pub severity: PatternSeverity,
    pub reason: String,
    #[serde(default)]
    pub required_evidence: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
}

fn default_case_insensitive() -> bool {
    true
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub matcher: Regex,
    pub claim_type: ClaimType,
    pub severity: PatternSeverity,
    pub reason: String,
    pub required_evidence: Vec<String>,
    pub category: String,
}

impl Pattern {
    fn compile(index: usize, config: &PatternConfig) -> Result<Self> {
        let matcher = RegexBuilder::new(&config.pattern)
            .case_insensitive(config.case_insensitive)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|source| MlrError::PatternCompile { index, source })?;

        let category = if config.category.is_empty() {
            config.claim_type.as_str().to_string()
        } else {
            config.category.clone()
        };

        Ok(Self {
            matcher,
            claim_type: config.claim_type,
            severity: config.severity,
            reason: config.reason.clone(),
            required_evidence: config.required_evidence.clone(),
            category,
        })
    }
}

/// Immutable, versioned collection of compiled patterns.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    version: String,
    patterns: Vec<Pattern>,
}

impl PatternLibrary {
    /// Compile every config entry.
    ///
    /// Returns an error naming the first pattern that fails to compile; a
    /// library is never built from a partial rule set.
    pub fn from_configs(version: impl Into<String>, configs: &[PatternConfig]) -> Result<Self> {
        let patterns = configs
            .iter()
            .enumerate()
            .map(|(index, config)| Pattern::compile(index, config))
            .collect::<Result<Vec<_>>>()?;

        let version = version.into();
        tracing::info!(version = %version, patterns = patterns.len(), "Pattern library loaded");
        Ok(Self { version, patterns })
    }

    /// The built-in rule set.
    pub fn builtin() -> Result<Self> {
        Self::from_configs(BUILTIN_LIBRARY_VERSION, &default_pattern_configs())
    }

    pub fn list_patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn rule(
    pattern: &str,
    claim_type: ClaimType,
    severity: PatternSeverity,
    reason: &str,
    required_evidence: &[&str],
    category: &str,
) -> PatternConfig {
    PatternConfig {
        pattern: pattern.to_string(),
        claim_type,
        severity,
        reason: reason.to_string(),
        required_evidence: required_evidence.iter().map(|s| s.to_string()).collect(),
        category: category.to_string(),
        case_insensitive: true,
    }
}

/// Default rules for pharmaceutical promotional content.
pub fn default_pattern_configs() -> Vec<PatternConfig> {
    use ClaimType::*;
    use PatternSeverity::*;

    vec![
        rule(
            r"\bclinically\s+(?:proven|tested|shown|demonstrated)\b",
            Clinical,
            Warning,
            "Clinical efficacy claim requires substantiation",
            &["Peer-reviewed clinical study", "Prescribing information reference"],
            "efficacy",
        ),
        rule(
            r"\b(?:superior|better|more\s+effective|preferred)\s+(?:to|than)\b",
            Comparative,
            Error,
            "Comparative claim requires head-to-head evidence",
            &["Head-to-head clinical trial data", "Statistical significance analysis"],
            "comparative",
        ),
        rule(
            r"(?:\b(?:best|safest|most\s+effective|number\s+one|leading)\b|#1\b)",
            Superlative,
            Error,
            "Superlative claim implies unsupported market position",
            &["Comparative data across all alternatives"],
            "superlative",
        ),
        rule(
            concat!(
                r"(?:\b(?:no|zero|without)\s+side[\s-]+effects?\b",
                r"|\b(?:completely|totally|100%)\s+safe\b)",
            ),
            Safety,
            Error,
            "Absolute safety claim contradicts the label",
            &["Full safety profile from prescribing information"],
            "safety",
        ),
        rule(
            r"\b\d+(?:\.\d+)?\s?%",
            Statistical,
            Warning,
            "Statistical claim requires a cited source",
            &["Study citation with population and endpoint", "Confidence interval or p-value"],
            "statistics",
        ),
        rule(
            r"\b(?:treats?|cures?|prevents?|indicated\s+for|approved\s+for)\b",
            Indication,
            Warning,
            "Indication language must match the approved label",
            &["Approved indication statement"],
            "indication",
        ),
        rule(
            r"\b(?:studies|research|data)\s+(?:show|shows|prove|proves|confirm|confirms)\b",
            Clinical,
            Warning,
            "Reference to evidence without citation",
            &["Specific study citation"],
            "efficacy",
        ),
        rule(
            r"\b(?:revolutionary|breakthrough|miracle|game[\s-]changing)\b",
            Superlative,
            Warning,
            "Promotional hyperbole overstates benefit",
            &["Regulatory designation or published consensus"],
            "hyperbole",
        ),
        rule(
            r"\bwell[\s-]tolerated\b",
            Safety,
            Info,
            "Tolerability statement should be balanced with adverse events",
            &["Adverse event table from prescribing information"],
            "safety",
        ),
        rule(
            r"(?:\bvs\.?\s|\bcompared\s+(?:to|with)\b)",
            Comparative,
            Warning,
            "Comparison requires matched study design",
            &["Head-to-head clinical trial data"],
            "comparative",
        ),
    ]
}
