//! External collaborators that supply brand policy and guidelines.
//!
//! Collaborators are resolved once, before analysis starts, each under its
//! own timeout. A failed or slow collaborator is replaced by its documented
//! default and reported in [`ResolvedInputs::degraded`]; it never fails the
//! analysis.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ErrorContext, MlrError, Result};
use crate::models::{
    BrandGuidelines, BrandRules, BrandVision, DegradedSource, ValidationContext,
};

/// Source of brand policy term lists and the approved indication.
#[async_trait]
pub trait BrandRuleProvider: Send + Sync {
    async fn fetch_guidelines(&self, brand_id: &str) -> Result<BrandRules>;

    async fn fetch_approved_indication(&self, brand_id: &str) -> Result<String>;
}

/// Source of messaging and tone guidance.
#[async_trait]
pub trait GuidelineProvider: Send + Sync {
    async fn fetch_brand_guidelines(&self, brand_id: &str) -> Result<BrandGuidelines>;

    async fn fetch_brand_vision(&self, brand_id: &str) -> Result<BrandVision>;
}

/// Fixed, in-memory answers for every brand.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    pub rules: BrandRules,
    pub approved_indication: Option<String>,
    pub guidelines: BrandGuidelines,
    pub vision: BrandVision,
}

#[async_trait]
impl BrandRuleProvider for StaticProvider {
    async fn fetch_guidelines(&self, _brand_id: &str) -> Result<BrandRules> {
        Ok(self.rules.clone())
    }

    async fn fetch_approved_indication(&self, brand_id: &str) -> Result<String> {
        self.approved_indication
            .clone()
            .ok_or_else(|| MlrError::Provider(format!("no approved indication for {}", brand_id)))
    }
}

#[async_trait]
impl GuidelineProvider for StaticProvider {
    async fn fetch_brand_guidelines(&self, _brand_id: &str) -> Result<BrandGuidelines> {
        Ok(self.guidelines.clone())
    }

    async fn fetch_brand_vision(&self, _brand_id: &str) -> Result<BrandVision> {
        Ok(self.vision.clone())
    }
}

/// Brand service reached over HTTP.
///
/// Endpoints, relative to the base URL:
/// `GET /brands/{id}/rules`, `/indication`, `/guidelines` and `/vision`,
/// each returning JSON. The brand id is percent-encoded as a single path
/// segment.
#[derive(Debug, Clone)]
pub struct HttpBrandRuleProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IndicationResponse {
    indication: String,
}

impl HttpBrandRuleProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, brand_id: &str, resource: &str) -> Result<String> {
        if matches!(brand_id, "" | "." | "..") {
            return Err(MlrError::Provider(format!(
                "brand id {:?} is not a valid path segment",
                brand_id
            )));
        }
        Ok(format!(
            "{}/brands/{}/{}",
            self.base_url,
            urlencoding::encode(brand_id),
            resource
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, brand_id: &str, resource: &str) -> Result<T> {
        let url = self.url(brand_id, resource)?;
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(MlrError::Provider(format!("GET {} -> HTTP {}", url, status)));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl BrandRuleProvider for HttpBrandRuleProvider {
    async fn fetch_guidelines(&self, brand_id: &str) -> Result<BrandRules> {
        self.get_json(brand_id, "rules").await
    }

    async fn fetch_approved_indication(&self, brand_id: &str) -> Result<String> {
        let response: IndicationResponse = self.get_json(brand_id, "indication").await?;
        Ok(response.indication)
    }
}

#[async_trait]
impl GuidelineProvider for HttpBrandRuleProvider {
    async fn fetch_brand_guidelines(&self, brand_id: &str) -> Result<BrandGuidelines> {
        self.get_json(brand_id, "guidelines").await
    }

    async fn fetch_brand_vision(&self, brand_id: &str) -> Result<BrandVision> {
        self.get_json(brand_id, "vision").await
    }
}

/// Everything the analysis core needs from collaborators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    pub brand_rules: BrandRules,
    pub approved_indication: Option<String>,
    pub guidelines: BrandGuidelines,
    pub degraded: Vec<DegradedSource>,
}

impl ResolvedInputs {
    /// Inputs for a run with no collaborators: empty brand rules and the
    /// guidelines carried on the context, if any.
    pub fn from_context(context: &ValidationContext) -> Self {
        Self {
            guidelines: context.brand_guidelines.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

async fn bounded<T, F>(operation: &str, timeout: Duration, fetch: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(MlrError::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Fill whatever the guidelines leave open from the brand vision.
pub fn merge_vision(mut guidelines: BrandGuidelines, vision: &BrandVision) -> BrandGuidelines {
    if guidelines.primary_tone.is_none() {
        guidelines.primary_tone = vision.primary_tone.clone();
    }
    if guidelines.key_messages.is_empty() {
        guidelines.key_messages = vision.key_messages.clone();
    }
    guidelines
}

fn needs_vision(guidelines: &BrandGuidelines) -> bool {
    guidelines.primary_tone.is_none() || guidelines.key_messages.is_empty()
}

/// Resolve all collaborators concurrently, each bounded by `timeout`.
///
/// Guidelines carried on the context take precedence over the guideline
/// provider, which is then not called.
pub async fn resolve_collaborators(
    context: &ValidationContext,
    rules: &dyn BrandRuleProvider,
    guidance: &dyn GuidelineProvider,
    timeout: Duration,
) -> ResolvedInputs {
    let brand_id = context.brand_id.as_str();

    let guideline_fetch = async {
        match &context.brand_guidelines {
            Some(guidelines) => Ok(guidelines.clone()),
            None => {
                bounded(
                    "fetch_brand_guidelines",
                    timeout,
                    guidance.fetch_brand_guidelines(brand_id),
                )
                .await
            }
        }
    };

    let (rules_result, indication_result, guidelines_result, vision_result) = futures::join!(
        bounded("fetch_guidelines", timeout, rules.fetch_guidelines(brand_id)),
        bounded(
            "fetch_approved_indication",
            timeout,
            rules.fetch_approved_indication(brand_id)
        ),
        guideline_fetch,
        bounded("fetch_brand_vision", timeout, guidance.fetch_brand_vision(brand_id)),
    );

    let mut degraded = Vec::new();
    let mut fallback = |source: DegradedSource, operation: &str, error: &MlrError| {
        error.log_with_context(&ErrorContext::new(operation).with_brand_id(brand_id));
        degraded.push(source);
    };

    let brand_rules = rules_result.unwrap_or_else(|e| {
        fallback(DegradedSource::BrandRules, "fetch_guidelines", &e);
        BrandRules::default()
    });

    let approved_indication = match indication_result {
        Ok(indication) if !indication.trim().is_empty() => Some(indication),
        Ok(_) => None,
        Err(e) => {
            fallback(DegradedSource::ApprovedIndication, "fetch_approved_indication", &e);
            None
        }
    };

    let guidelines = guidelines_result.unwrap_or_else(|e| {
        fallback(DegradedSource::Guidelines, "fetch_brand_guidelines", &e);
        BrandGuidelines::default()
    });

    let guidelines = match vision_result {
        Ok(vision) => merge_vision(guidelines, &vision),
        Err(e) => {
            if needs_vision(&guidelines) {
                fallback(DegradedSource::BrandVision, "fetch_brand_vision", &e);
            }
            guidelines
        }
    };

    if !degraded.is_empty() {
        tracing::warn!(
            brand_id = %brand_id,
            degraded = ?degraded,
            "Collaborators fell back to defaults"
        );
    }

    ResolvedInputs {
        brand_rules,
        approved_indication,
        guidelines,
        degraded,
    }
}

#[cfg(test)]
pub(crate) mod doubles {
    use super::*;

    /// Fails every call.
    pub struct Unavailable;

    #[async_trait]
    impl BrandRuleProvider for Unavailable {
        async fn fetch_guidelines(&self, brand_id: &str) -> Result<BrandRules> {
            Err(MlrError::Provider(format!("rules unavailable for {}", brand_id)))
        }

        async fn fetch_approved_indication(&self, brand_id: &str) -> Result<String> {
            Err(MlrError::Provider(format!("indication unavailable for {}", brand_id)))
        }
    }

    #[async_trait]
    impl GuidelineProvider for Unavailable {
        async fn fetch_brand_guidelines(&self, brand_id: &str) -> Result<BrandGuidelines> {
            Err(MlrError::Provider(format!("guidelines unavailable for {}", brand_id)))
        }

        async fn fetch_brand_vision(&self, brand_id: &str) -> Result<BrandVision> {
            Err(MlrError::Provider(format!("vision unavailable for {}", brand_id)))
        }
    }

    /// Answers like [`StaticProvider`] after a delay.
    pub struct Slow {
        pub delay: Duration,
        pub inner: StaticProvider,
    }

    #[async_trait]
    impl BrandRuleProvider for Slow {
        async fn fetch_guidelines(&self, brand_id: &str) -> Result<BrandRules> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_guidelines(brand_id).await
        }

        async fn fetch_approved_indication(&self, brand_id: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_approved_indication(brand_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::doubles::{Slow, Unavailable};
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider() -> StaticProvider {
        StaticProvider {
            rules: BrandRules {
                forbidden_terms: vec!["cure".to_string()],
                caution_terms: vec!["better".to_string()],
                approved_language: vec![],
            },
            approved_indication: Some("moderate plaque psoriasis in adults".to_string()),
            guidelines: BrandGuidelines {
                key_messages: vec!["clear skin".to_string()],
                prohibited_terms: vec!["miracle".to_string()],
                primary_tone: None,
            },
            vision: BrandVision {
                primary_tone: Some("professional".to_string()),
                key_messages: vec!["from vision".to_string()],
                values: vec!["trust".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn resolves_all_collaborators() {
        let p = provider();
        let context = ValidationContext::new("brand-1");
        let resolved = resolve_collaborators(&context, &p, &p, Duration::from_secs(1)).await;

        assert!(!resolved.is_degraded());
        assert_eq!(resolved.brand_rules.forbidden_terms, vec!["cure"]);
        assert_eq!(
            resolved.approved_indication.as_deref(),
            Some("moderate plaque psoriasis in adults")
        );
        // Vision fills the missing tone but not the present key messages.
        assert_eq!(resolved.guidelines.primary_tone.as_deref(), Some("professional"));
        assert_eq!(resolved.guidelines.key_messages, vec!["clear skin"]);
    }

    #[tokio::test]
    async fn failures_fall_back_to_defaults() {
        let context = ValidationContext::new("brand-1");
        let timeout = Duration::from_secs(1);
        let resolved = resolve_collaborators(&context, &Unavailable, &Unavailable, timeout).await;

        assert_eq!(resolved.brand_rules, BrandRules::default());
        assert_eq!(resolved.approved_indication, None);
        assert_eq!(resolved.guidelines, BrandGuidelines::default());
        assert_eq!(
            resolved.degraded,
            vec![
                DegradedSource::BrandRules,
                DegradedSource::ApprovedIndication,
                DegradedSource::Guidelines,
                DegradedSource::BrandVision,
            ]
        );
    }

    #[tokio::test]
    async fn context_guidelines_take_precedence() {
        let guidelines = BrandGuidelines {
            key_messages: vec!["ctx message".to_string()],
            prohibited_terms: vec![],
            primary_tone: Some("warm".to_string()),
        };
        let context = ValidationContext::new("brand-1").with_guidelines(guidelines.clone());
        let p = provider();

        let resolved =
            resolve_collaborators(&context, &p, &Unavailable, Duration::from_secs(1)).await;
        assert_eq!(resolved.guidelines, guidelines);
        // Vision was not needed, so its failure is not a degradation.
        assert!(!resolved.is_degraded());
    }

    #[tokio::test]
    async fn slow_collaborator_times_out() {
        let slow = Slow {
            delay: Duration::from_millis(500),
            inner: provider(),
        };
        let p = provider();
        let context = ValidationContext::new("brand-1");
        let resolved = resolve_collaborators(&context, &slow, &p, Duration::from_millis(20)).await;

        assert_eq!(
            resolved.degraded,
            vec![DegradedSource::BrandRules, DegradedSource::ApprovedIndication]
        );
        assert_eq!(resolved.guidelines.key_messages, vec!["clear skin"]);
    }

    #[tokio::test]
    async fn blank_indication_is_treated_as_absent() {
        let mut p = provider();
        p.approved_indication = Some("   ".to_string());
        let context = ValidationContext::new("brand-1");
        let resolved = resolve_collaborators(&context, &p, &p, Duration::from_secs(1)).await;
        assert_eq!(resolved.approved_indication, None);
        assert!(!resolved.is_degraded());
    }

    #[test]
    fn from_context_uses_context_guidelines() {
        let guidelines = BrandGuidelines {
            key_messages: vec!["m".to_string()],
            ..BrandGuidelines::default()
        };
        let context = ValidationContext::new("b").with_guidelines(guidelines.clone());
        let resolved = ResolvedInputs::from_context(&context);
        assert_eq!(resolved.guidelines, guidelines);
        assert_eq!(resolved.brand_rules, BrandRules::default());
        assert!(!resolved.is_degraded());
    }

    #[tokio::test]
    async fn http_provider_reads_brand_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brands/brand-7/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "forbiddenTerms": ["cure"],
                "cautionTerms": ["better"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/brands/brand-7/indication"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "indication": "type 2 diabetes" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/brands/brand-7/guidelines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keyMessages": ["glycemic control"],
                "prohibitedTerms": [],
                "primaryTone": "professional"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/brands/brand-7/vision"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": ["care"] })))
            .mount(&server)
            .await;

        let http = HttpBrandRuleProvider::new(format!("{}/", server.uri()), Duration::from_secs(2))
            .expect("client builds");
        let context = ValidationContext::new("brand-7");
        let resolved = resolve_collaborators(&context, &http, &http, Duration::from_secs(2)).await;

        assert!(!resolved.is_degraded(), "degraded: {:?}", resolved.degraded);
        assert_eq!(resolved.brand_rules.forbidden_terms, vec!["cure"]);
        assert!(resolved.brand_rules.approved_language.is_empty());
        assert_eq!(resolved.approved_indication.as_deref(), Some("type 2 diabetes"));
        assert_eq!(resolved.guidelines.key_messages, vec!["glycemic control"]);
    }

    #[tokio::test]
    async fn http_error_status_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brands/brand-7/rules"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let http = HttpBrandRuleProvider::new(server.uri(), Duration::from_secs(2))
            .expect("client builds");
        let err = http.fetch_guidelines("brand-7").await.expect_err("503 fails");
        assert!(matches!(err, MlrError::Provider(ref msg) if msg.contains("503")));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn http_malformed_body_is_a_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brands/brand-7/vision"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let http = HttpBrandRuleProvider::new(server.uri(), Duration::from_secs(2))
            .expect("client builds");
        let err = http.fetch_brand_vision("brand-7").await.expect_err("bad body fails");
        assert!(matches!(err, MlrError::Json(_)));
    }

    #[tokio::test]
    async fn brand_id_stays_inside_its_own_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brands/other/rules"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "forbiddenTerms": ["other"] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/brands/mine%2F..%2F..%2Fbrands%2Fother/rules"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "forbiddenTerms": ["mine"] })),
            )
            .mount(&server)
            .await;

        let http = HttpBrandRuleProvider::new(server.uri(), Duration::from_secs(2))
            .expect("client builds");
        let rules = http
            .fetch_guidelines("mine/../../brands/other")
            .await
            .expect("encoded id resolves");
        assert_eq!(rules.forbidden_terms, vec!["mine"]);

        let err = http.fetch_guidelines("..").await.expect_err("dot segment rejected");
        assert!(matches!(err, MlrError::Provider(_)));
    }
}
