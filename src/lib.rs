//! mlrguard: regulatory and brand compliance analysis for promotional content.
//!
//! Flow of one analysis:
//! - The claim detector scans raw content against the pattern library.
//! - The section parser splits content into headline, body, CTA and disclaimer.
//! - The section analyzer runs messaging, regulatory, tone and claims checks per section.
//! - The risk aggregator folds findings and context into a risk profile.
//! - The ranker orders findings for presentation.
//!
//! ```no_run
//! use mlrguard::{ComplianceEngine, ValidationContext};
//!
//! # fn main() -> mlrguard::Result<()> {
//! let engine = ComplianceEngine::builtin()?;
//! let context = ValidationContext::new("brand-1").with_audience("HCP");
//! let result = engine.analyze_content("Clinically proven relief.", &context)?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```
//!
//! Offsets in every result are UTF-8 byte offsets into the analyzed text
//! (`start` inclusive, `end` exclusive). Hosts that index strings by UTF-16
//! code unit should convert with [`Highlight::utf16_range`].

pub mod analyzer;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod detector;
pub mod error;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod providers;
pub mod ranker;
pub mod risk;
pub mod sections;

pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use error::{MlrError, Result};
pub use models::{
    AnalysisResult, BrandGuidelines, BrandRules, ContentIssue, DetectedClaim, Highlight,
    RiskProfile, Summary, ValidationContext,
};
pub use pipeline::ComplianceEngine;
pub use providers::{BrandRuleProvider, GuidelineProvider, HttpBrandRuleProvider, StaticProvider};
pub use sections::ContentAsset;
