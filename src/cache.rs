//! Read-through cache for brand collaborators using moka.
//!
//! Brand rules and indications change on a release cadence, so a short TTL
//! cache in front of the provider keeps repeated analyses off the network.
//! Failed fetches are never cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::error::{MlrError, Result};
use crate::models::BrandRules;
use crate::providers::BrandRuleProvider;

const MAX_CACHED_BRANDS: u64 = 10_000;

/// Statistics about cache performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub rules_entries: u64,
    pub indication_entries: u64,
    pub hits: u64,
    pub misses: u64,
    /// 0.0 to 1.0.
    pub hit_rate: f64,
}

#[derive(Clone, Default)]
struct StatsTracker {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl StatsTracker {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Wraps a [`BrandRuleProvider`] with per-brand TTL caching.
pub struct CachedBrandRuleProvider<P> {
    inner: Arc<P>,
    rules: Cache<String, Arc<BrandRules>>,
    indications: Cache<String, Arc<String>>,
    stats: StatsTracker,
}

impl<P: BrandRuleProvider + 'static> CachedBrandRuleProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            rules: Cache::builder()
                .max_capacity(MAX_CACHED_BRANDS)
                .time_to_live(ttl)
                .build(),
            indications: Cache::builder()
                .max_capacity(MAX_CACHED_BRANDS)
                .time_to_live(ttl)
                .build(),
            stats: StatsTracker::default(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            rules_entries: self.rules.entry_count(),
            indication_entries: self.indications.entry_count(),
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            hit_rate: self.stats.hit_rate(),
        }
    }

    /// Flush pending moka maintenance so entry counts are current.
    pub async fn sync(&self) {
        self.rules.run_pending_tasks().await;
        self.indications.run_pending_tasks().await;
    }

    /// Drop cached answers for one brand, e.g. after its rules are republished.
    pub async fn invalidate_brand(&self, brand_id: &str) {
        self.rules.invalidate(brand_id).await;
        self.indications.invalidate(brand_id).await;
        tracing::debug!(brand_id = %brand_id, "Brand cache invalidated");
    }

    pub async fn invalidate_all(&self) {
        self.rules.invalidate_all();
        self.indications.invalidate_all();
        self.sync().await;
    }

    /// Cache-aside lookup. Concurrent misses for one key share a single fetch.
    ///
    /// A miss is counted even when the fetch fails.
    async fn get_or_fetch<V, Fut>(
        &self,
        cache: &Cache<String, Arc<V>>,
        brand_id: &str,
        fetch: Fut,
    ) -> Result<Arc<V>>
    where
        V: Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<V>>,
    {
        self.stats.record(cache.contains_key(brand_id));
        cache
            .try_get_with(brand_id.to_string(), async move { fetch.await.map(Arc::new) })
            .await
            .map_err(|e: Arc<MlrError>| unshare(&e))
    }
}

/// moka hands back errors behind an `Arc`; keep the recoverable kinds recoverable.
fn unshare(error: &MlrError) -> MlrError {
    match error {
        MlrError::Timeout {
            operation,
            timeout_ms,
        } => MlrError::Timeout {
            operation: operation.clone(),
            timeout_ms: *timeout_ms,
        },
        MlrError::Cancelled => MlrError::Cancelled,
        other => MlrError::Provider(other.to_string()),
    }
}

#[async_trait]
impl<P: BrandRuleProvider + 'static> BrandRuleProvider for CachedBrandRuleProvider<P> {
    async fn fetch_guidelines(&self, brand_id: &str) -> Result<BrandRules> {
        let inner = Arc::clone(&self.inner);
        let id = brand_id.to_string();
        let rules = self
            .get_or_fetch(&self.rules, brand_id, async move {
                inner.fetch_guidelines(&id).await
            })
            .await?;
        Ok(rules.as_ref().clone())
    }

    async fn fetch_approved_indication(&self, brand_id: &str) -> Result<String> {
        let inner = Arc::clone(&self.inner);
        let id = brand_id.to_string();
        let indication = self
            .get_or_fetch(&self.indications, brand_id, async move {
                inner.fetch_approved_indication(&id).await
            })
            .await?;
        Ok(indication.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::doubles::Unavailable;
    use crate::providers::StaticProvider;

    /// Counts calls through to a static provider.
    struct Counting {
        calls: AtomicU64,
        inner: StaticProvider,
    }

    #[async_trait]
    impl BrandRuleProvider for Counting {
        async fn fetch_guidelines(&self, brand_id: &str) -> Result<BrandRules> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.fetch_guidelines(brand_id).await
        }

        async fn fetch_approved_indication(&self, brand_id: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.fetch_approved_indication(brand_id).await
        }
    }

    fn counting() -> Counting {
        Counting {
            calls: AtomicU64::new(0),
            inner: StaticProvider {
                rules: BrandRules {
                    forbidden_terms: vec!["cure".to_string()],
                    ..BrandRules::default()
                },
                approved_indication: Some("hypertension".to_string()),
                ..StaticProvider::default()
            },
        }
    }

    #[tokio::test]
    async fn repeated_fetches_hit_the_cache() {
        let cached = CachedBrandRuleProvider::new(counting(), Duration::from_secs(60));

        let first = cached.fetch_guidelines("brand-1").await.expect("fetch");
        let second = cached.fetch_guidelines("brand-1").await.expect("fetch");
        assert_eq!(first, second);
        assert_eq!(cached.inner().calls.load(Ordering::Relaxed), 1);

        cached.sync().await;
        let stats = cached.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.rules_entries, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn brands_are_cached_independently() {
        let cached = CachedBrandRuleProvider::new(counting(), Duration::from_secs(60));
        cached.fetch_approved_indication("a").await.expect("fetch");
        cached.fetch_approved_indication("b").await.expect("fetch");
        assert_eq!(cached.inner().calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn invalidation_forces_refetch() {
        let cached = CachedBrandRuleProvider::new(counting(), Duration::from_secs(60));
        cached.fetch_guidelines("brand-1").await.expect("fetch");
        cached.invalidate_brand("brand-1").await;
        cached.fetch_guidelines("brand-1").await.expect("fetch");
        assert_eq!(cached.inner().calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cached = CachedBrandRuleProvider::new(Unavailable, Duration::from_secs(60));
        let first = cached.fetch_guidelines("brand-1").await;
        let second = cached.fetch_guidelines("brand-1").await;
        assert!(matches!(first, Err(MlrError::Provider(_))));
        assert!(second.is_err());

        cached.sync().await;
        let stats = cached.stats();
        assert_eq!(stats.rules_entries, 0);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn empty_stats_have_zero_hit_rate() {
        let cached = CachedBrandRuleProvider::new(Unavailable, Duration::from_secs(60));
        let stats = cached.stats();
        assert_eq!(stats.hits + stats.misses, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }
}
