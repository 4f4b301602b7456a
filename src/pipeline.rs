//! Analysis entry points.
//!
//! [`ComplianceEngine`] composes the claim detector, section analyzer, risk
//! aggregator and ranker into one call. The synchronous core never touches
//! the network; collaborators are resolved beforehand, either by the caller
//! or by [`ComplianceEngine::analyze_with_providers`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::analyzer::SectionAnalyzer;
use crate::cache::CachedBrandRuleProvider;
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::detector::{ClaimDetector, DetectionInputs};
use crate::error::{ErrorContext, MlrError, Result};
use crate::models::{
    AnalysisResult, ContentIssue, ContentSection, DetectedClaim, RiskProfile, Summary,
    ValidationContext,
};
use crate::patterns::PatternLibrary;
use crate::providers::{
    resolve_collaborators, BrandRuleProvider, GuidelineProvider, ResolvedInputs,
};
use crate::ranker;
use crate::risk;
use crate::sections::{self, ContentAsset};

/// Stateless compliance analysis over a fixed pattern library.
pub struct ComplianceEngine {
    config: EngineConfig,
    detector: ClaimDetector,
    analyzer: SectionAnalyzer,
}

impl ComplianceEngine {
    /// Compile the configured pattern library. Any invalid pattern is fatal.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let library = config.build_library().map_err(|e| {
            e.log_with_context(&ErrorContext::new("build_library"));
            e
        })?;
        tracing::info!(
            version = %library.version(),
            patterns = library.len(),
            parallel = config.parallel_scan,
            "Compliance engine ready"
        );

        let detector = ClaimDetector::new(Arc::new(library))
            .with_context_window(config.context_window_chars)
            .with_parallel(config.parallel_scan);
        let analyzer = SectionAnalyzer::new().with_parallel(config.parallel_scan);

        Ok(Self {
            config,
            detector,
            analyzer,
        })
    }

    /// Engine over the built-in pattern library with default tuning.
    pub fn builtin() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env()?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn library(&self) -> &PatternLibrary {
        self.detector.library()
    }

    /// Wrap a brand rule provider in a cache using the configured TTL.
    pub fn cached<P: BrandRuleProvider + 'static>(
        &self,
        provider: P,
    ) -> CachedBrandRuleProvider<P> {
        CachedBrandRuleProvider::new(
            provider,
            std::time::Duration::from_secs(self.config.provider_cache_ttl_secs),
        )
    }

    /// Analyze raw content with no collaborators.
    ///
    /// Brand rules are empty and guidelines come from `context`. Fails only
    /// when `context` is invalid.
    pub fn analyze_content(
        &self,
        content: &str,
        context: &ValidationContext,
    ) -> Result<AnalysisResult> {
        self.analyze_resolved(
            content,
            context,
            &ResolvedInputs::from_context(context),
            &CancellationToken::new(),
        )
    }

    /// Analyze raw content with pre-resolved collaborator inputs.
    ///
    /// Sections are inferred from paragraphs; all offsets index into `content`.
    pub fn analyze_resolved(
        &self,
        content: &str,
        context: &ValidationContext,
        inputs: &ResolvedInputs,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        self.run(content, || sections::parse_text(content), context, inputs, cancel)
    }

    /// Analyze a structured asset.
    ///
    /// All offsets index into [`ContentAsset::document`].
    pub fn analyze_asset(
        &self,
        asset: &ContentAsset,
        context: &ValidationContext,
        inputs: &ResolvedInputs,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let document = asset.document();
        self.run(&document, || sections::parse(asset), context, inputs, cancel)
    }

    /// Resolve collaborators, then run the analysis on the blocking pool.
    pub async fn analyze_with_providers(
        self: &Arc<Self>,
        content: String,
        context: ValidationContext,
        rules: &dyn BrandRuleProvider,
        guidance: &dyn GuidelineProvider,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult> {
        context.validate()?;
        let inputs =
            resolve_collaborators(&context, rules, guidance, self.config.provider_timeout()).await;
        cancel.check()?;

        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            engine.analyze_resolved(&content, &context, &inputs, &cancel)
        })
        .await
        .map_err(|e| MlrError::InternalState(format!("analysis task failed: {}", e)))?
    }

    fn run<F>(
        &self,
        content: &str,
        parse_sections: F,
        context: &ValidationContext,
        inputs: &ResolvedInputs,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult>
    where
        F: FnOnce() -> Vec<ContentSection>,
    {
        let error_context = ErrorContext::new("analyze_content").with_brand_id(&context.brand_id);
        if let Err(e) = context.validate() {
            e.log_with_context(&error_context);
            return Err(e);
        }

        let started = Instant::now();
        let content_hash = hex::encode(Sha256::digest(content.as_bytes()));

        if content.trim().is_empty() {
            tracing::debug!(
                request_id = %error_context.request_id,
                "Empty content, nothing to analyze"
            );
            return Ok(self.result(
                Vec::new(),
                Vec::new(),
                risk::profile_from_factors(Vec::new()),
                inputs,
                content_hash,
            ));
        }

        let detection = DetectionInputs {
            context,
            brand_rules: &inputs.brand_rules,
            approved_indication: inputs.approved_indication.as_deref(),
        };

        let outcome = self
            .detector
            .detect_cancellable(content, &detection, cancel)
            .and_then(|claims| {
                let sections = parse_sections();
                let issues = self
                    .analyzer
                    .analyze(&sections, &inputs.guidelines, context, cancel)?;
                Ok((claims, issues))
            });
        let (claims, issues) = match outcome {
            Ok(found) => found,
            Err(e) => {
                e.log_with_context(&error_context);
                return Err(e);
            }
        };

        let contextual = risk::context_risk_factors(context, &inputs.degraded);
        let risk_profile = risk::aggregate(&claims, &issues, &contextual);
        let result = self.result(claims, issues, risk_profile, inputs, content_hash);

        tracing::info!(
            request_id = %error_context.request_id,
            brand_id = %context.brand_id,
            claims = result.claims.len(),
            issues = result.issues.len(),
            overall_risk = ?result.risk_profile.overall_risk,
            degraded = result.is_degraded(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Content analyzed"
        );
        Ok(result)
    }

    fn result(
        &self,
        mut claims: Vec<DetectedClaim>,
        mut issues: Vec<ContentIssue>,
        risk_profile: RiskProfile,
        inputs: &ResolvedInputs,
        content_hash: String,
    ) -> AnalysisResult {
        let summary = Summary::tally(&claims, &issues);
        ranker::rank_claims(&mut claims);
        ranker::rank_issues(&mut issues);
        let highlights = ranker::build_highlights(&claims, &issues);

        AnalysisResult {
            claims,
            issues,
            risk_profile,
            summary,
            highlights,
            degraded: inputs.degraded.clone(),
            content_hash,
            pattern_library_version: self.library().version().to_string(),
            analyzed_at: Utc::now(),
        }
    }
}
