use lru::LruCache;
use portico_core::models::{AssetId, CustomerOriginStrategy};
use portico_db::OriginStrategyStore;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const CACHE_CAPACITY: usize = 256;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// A customer's strategies and when they were loaded.
type CachedStrategies = (Instant, Vec<CustomerOriginStrategy>);

/// Picks the origin strategy for an asset.
///
/// A customer's configured strategies are tried in `order`, then the portal
/// strategy for origins in the platform's storage bucket, then the default.
/// Strategies are reloaded once their cache entry is older than the TTL.
pub struct OriginStrategyResolver {
    store: Arc<dyn OriginStrategyStore>,
    portal_regex: String,
    cache: Mutex<LruCache<i32, CachedStrategies>>,
    ttl: Duration,
}

impl OriginStrategyResolver {
    pub fn new(store: Arc<dyn OriginStrategyStore>, storage_bucket: &str) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            portal_regex: portal_regex(storage_bucket),
            cache: Mutex::new(LruCache::new(capacity)),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn strategies_for(&self, customer: i32) -> anyhow::Result<Vec<CustomerOriginStrategy>> {
        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(&customer).cloned());
        if let Some((loaded, strategies)) = cached {
            if loaded.elapsed() < self.ttl {
                return Ok(strategies);
            }
        }

        tracing::info!(customer, "Refreshing customer origin strategies from database");
        let mut strategies = self.store.get_customer_origin_strategies(customer).await?;
        strategies.push(CustomerOriginStrategy::portal_for(customer, self.portal_regex.clone()));
        strategies.sort_by_key(|s| s.order);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(customer, (Instant::now(), strategies.clone()));
        }
        Ok(strategies)
    }

    pub async fn get_customer_origin_strategy(
        &self,
        asset_id: &AssetId,
        origin: &str,
    ) -> anyhow::Result<CustomerOriginStrategy> {
        let strategies = self.strategies_for(asset_id.customer).await?;

        let matching = strategies.into_iter().find(|strategy| match strategy.matches(origin) {
            Ok(is_match) => is_match,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    strategy_id = %strategy.id,
                    customer = asset_id.customer,
                    "Invalid origin strategy regex, skipping"
                );
                false
            }
        });

        let strategy = matching.unwrap_or_else(|| CustomerOriginStrategy::default_for(asset_id.customer));
        tracing::trace!(
            asset_id = %asset_id,
            strategy = %strategy.strategy,
            strategy_id = %strategy.id,
            "Resolved origin strategy"
        );
        Ok(strategy)
    }
}

/// Matches `s3://` and https references to objects in `bucket`.
fn portal_regex(bucket: &str) -> String {
    let bucket = regex::escape(bucket);
    format!(
        r"^(s3://{b}/|https?://{b}\.s3[.-][^/]*amazonaws\.com/|https?://s3[.-][^/]*amazonaws\.com/{b}/)",
        b = bucket
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use portico_core::models::{OriginStrategyType, DEFAULT_STRATEGY_ID, PORTAL_STRATEGY_ID};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockStrategyStore {
        strategies: Mutex<Vec<CustomerOriginStrategy>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OriginStrategyStore for MockStrategyStore {
        async fn get_customer_origin_strategies(
            &self,
            _customer: i32,
        ) -> anyhow::Result<Vec<CustomerOriginStrategy>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.strategies.lock().unwrap().clone())
        }
    }

    fn configured(id: &str, regex: &str, strategy: OriginStrategyType, order: i32) -> CustomerOriginStrategy {
        CustomerOriginStrategy {
            id: id.to_string(),
            customer: 7,
            regex: regex.to_string(),
            strategy,
            credentials: None,
            optimised: false,
            order,
        }
    }

    fn resolver(strategies: Vec<CustomerOriginStrategy>) -> (Arc<MockStrategyStore>, OriginStrategyResolver) {
        let store = Arc::new(MockStrategyStore {
            strategies: Mutex::new(strategies),
            calls: AtomicUsize::new(0),
        });
        (store.clone(), OriginStrategyResolver::new(store, "dlcs-storage"))
    }

    #[tokio::test]
    async fn test_lowest_order_match_wins() {
        let (_, resolver) = resolver(vec![
            configured("late", "^https://secure\\.", OriginStrategyType::Default, 5),
            configured("early", "^https://secure\\.", OriginStrategyType::BasicHttp, 1),
        ]);

        let strategy = resolver
            .get_customer_origin_strategy(&AssetId::new(7, 1, "a"), "https://secure.example.org/a.jpg")
            .await
            .unwrap();
        assert_eq!(strategy.id, "early");
    }

    #[tokio::test]
    async fn test_storage_bucket_origins_use_portal_strategy() {
        let (_, resolver) = resolver(vec![]);

        for origin in [
            "s3://dlcs-storage/7/1/a/original",
            "https://dlcs-storage.s3.eu-west-1.amazonaws.com/7/1/a",
            "https://s3-eu-west-1.amazonaws.com/dlcs-storage/7/1/a",
        ] {
            let strategy = resolver
                .get_customer_origin_strategy(&AssetId::new(7, 1, "a"), origin)
                .await
                .unwrap();
            assert_eq!(strategy.id, PORTAL_STRATEGY_ID, "{origin}");
            assert!(strategy.allows_direct_bucket_copy());
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_default_and_skips_bad_regex() {
        let (_, resolver) = resolver(vec![configured("broken", "(", OriginStrategyType::BasicHttp, 0)]);
        let strategy = resolver
            .get_customer_origin_strategy(&AssetId::new(7, 1, "a"), "https://example.org/a.jpg")
            .await
            .unwrap();
        assert_eq!(strategy.id, DEFAULT_STRATEGY_ID);
        assert_eq!(strategy.strategy, OriginStrategyType::Default);
    }

    #[tokio::test]
    async fn test_strategies_are_cached_per_customer() {
        let (store, resolver) = resolver(vec![]);
        for _ in 0..3 {
            resolver
                .get_customer_origin_strategy(&AssetId::new(7, 1, "a"), "https://example.org/a.jpg")
                .await
                .unwrap();
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_strategies_are_reloaded() {
        let store = Arc::new(MockStrategyStore {
            strategies: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        });
        let resolver = OriginStrategyResolver::new(store.clone(), "dlcs-storage").with_ttl(Duration::ZERO);
        let asset_id = AssetId::new(7, 1, "a");
        let origin = "https://secure.example.org/a.jpg";

        let before = resolver.get_customer_origin_strategy(&asset_id, origin).await.unwrap();
        assert_eq!(before.id, DEFAULT_STRATEGY_ID);

        store
            .strategies
            .lock()
            .unwrap()
            .push(configured("added", "^https://secure\\.", OriginStrategyType::BasicHttp, 1));

        let after = resolver.get_customer_origin_strategy(&asset_id, origin).await.unwrap();
        assert_eq!(after.id, "added");
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }
}
