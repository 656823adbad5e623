//! Per-token model pricing with a shared TTL cache.
//!
//! The whole `/models` table is cached at once. Reads go through the
//! `RwLock`; a refresh holds `fetch_lock` so concurrent misses trigger a
//! single upstream fetch. Failed fetches are never cached, but tasks that
//! waited on a failed refresh share its outcome instead of fetching again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const PRICING_TIMEOUT: Duration = Duration::from_secs(10);

/// USD per token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub prompt: f64,
    pub completion: f64,
}

impl ModelPricing {
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        calculate_cost(input_tokens, output_tokens, self.prompt, self.completion)
    }
}

pub fn calculate_cost(
    input_tokens: u32,
    output_tokens: u32,
    prompt_price: f64,
    completion_price: f64,
) -> f64 {
    f64::from(input_tokens) * prompt_price + f64::from(output_tokens) * completion_price
}

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pricing API returned status {0}")]
    Status(u16),

    #[error("No pricing for model '{0}'")]
    UnknownModel(String),

    #[error("Concurrent pricing refresh failed")]
    RefreshFailed,
}

/// Anything that can produce the full model price table.
#[async_trait]
pub trait PricingSource: Send + Sync {
    async fn fetch_all(&self) -> Result<HashMap<String, ModelPricing>, PricingError>;
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    pricing: Option<RawPricing>,
}

/// Prices arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct RawPricing {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    completion: Option<String>,
}

impl ModelsResponse {
    /// Entries without parseable prices are skipped.
    fn into_table(self) -> HashMap<String, ModelPricing> {
        self.data
            .into_iter()
            .filter_map(|entry| {
                let pricing = entry.pricing?;
                let prompt = pricing.prompt.as_deref().unwrap_or("0").parse().ok()?;
                let completion = pricing.completion.as_deref().unwrap_or("0").parse().ok()?;
                Some((entry.id, ModelPricing { prompt, completion }))
            })
            .collect()
    }
}

/// `GET {base}/models` on OpenRouter.
pub struct OpenRouterPricing {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterPricing {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, PricingError> {
        Ok(Self {
            client: Client::builder().timeout(PRICING_TIMEOUT).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl PricingSource for OpenRouterPricing {
    async fn fetch_all(&self) -> Result<HashMap<String, ModelPricing>, PricingError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PricingError::Status(status.as_u16()));
        }

        let body: ModelsResponse = response.json().await?;
        Ok(body.into_table())
    }
}

struct CachedPricing {
    fetched_at: Instant,
    models: HashMap<String, ModelPricing>,
}

pub struct PricingCache {
    source: Arc<dyn PricingSource>,
    ttl: Duration,
    entry: RwLock<Option<CachedPricing>>,
    fetch_lock: Mutex<()>,
    /// Completed refresh attempts, successful or not.
    refreshes: AtomicU64,
}

impl PricingCache {
    pub fn new(source: Arc<dyn PricingSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entry: RwLock::new(None),
            fetch_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub async fn price_for(&self, model: &str) -> Result<ModelPricing, PricingError> {
        if let Some(cached) = self.cached(model).await {
            return cached;
        }

        let seen = self.refreshes.load(Ordering::SeqCst);
        let _guard = self.fetch_lock.lock().await;

        // Another task may have refreshed while we waited.
        if let Some(cached) = self.cached(model).await {
            return cached;
        }
        if self.refreshes.load(Ordering::SeqCst) != seen {
            return Err(PricingError::RefreshFailed);
        }

        let outcome = match self.source.fetch_all().await {
            Ok(models) => {
                info!("Fetched pricing for {} models", models.len());
                let pricing = models.get(model).copied();
                *self.entry.write().await = Some(CachedPricing {
                    fetched_at: Instant::now(),
                    models,
                });
                pricing.ok_or_else(|| PricingError::UnknownModel(model.to_string()))
            }
            Err(e) => {
                warn!("Pricing fetch failed: {e}");
                Err(e)
            }
        };
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        outcome
    }

    /// `None` when the table is missing or stale.
    async fn cached(&self, model: &str) -> Option<Result<ModelPricing, PricingError>> {
        let entry = self.entry.read().await;
        let cached = entry.as_ref()?;
        if cached.fetched_at.elapsed() >= self.ttl {
            debug!("Pricing cache expired");
            return None;
        }
        Some(
            cached
                .models
                .get(model)
                .copied()
                .ok_or_else(|| PricingError::UnknownModel(model.to_string())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MODEL: &str = "anthropic/claude-3.5-haiku";

    /// Counts fetches; fails the first `failures` of them.
    struct CountingSource {
        fetches: AtomicUsize,
        failures: usize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(failures: usize, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                failures,
                delay,
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PricingSource for CountingSource {
        async fn fetch_all(&self) -> Result<HashMap<String, ModelPricing>, PricingError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.failures {
                return Err(PricingError::Status(503));
            }
            Ok(HashMap::from([(
                MODEL.to_string(),
                ModelPricing {
                    prompt: 0.000_001,
                    completion: 0.000_005,
                },
            )]))
        }
    }

    #[test]
    fn test_calculate_cost() {
        let cost = calculate_cost(1000, 200, 0.000_001, 0.000_005);
        assert!((cost - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_models_table_parses_string_prices() {
        let body: ModelsResponse = serde_json::from_str(
            r#"{"data": [
                {"id": "a/one", "pricing": {"prompt": "0.0000008", "completion": "0.000004"}},
                {"id": "a/free", "pricing": {"prompt": "0", "completion": "0"}},
                {"id": "a/broken", "pricing": {"prompt": "n/a", "completion": "1"}},
                {"id": "a/none"}
            ]}"#,
        )
        .unwrap();
        let table = body.into_table();

        assert_eq!(table.len(), 2);
        assert!((table["a/one"].prompt - 0.000_000_8).abs() < 1e-15);
        assert_eq!(table["a/free"].completion, 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let source = CountingSource::new(0, Duration::from_millis(50));
        let cache = Arc::new(PricingCache::new(source.clone(), Duration::from_secs(60)));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.spawn(async move { cache.price_for(MODEL).await });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_failed_fetch() {
        let source = CountingSource::new(usize::MAX, Duration::from_millis(100));
        let cache = Arc::new(PricingCache::new(source.clone(), Duration::from_secs(60)));
        let started = Instant::now();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.spawn(async move { cache.price_for(MODEL).await });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(matches!(
                result.unwrap(),
                Err(PricingError::Status(503) | PricingError::RefreshFailed)
            ));
        }

        assert_eq!(source.fetches(), 1);
        assert!(started.elapsed() < Duration::from_millis(200));

        // Later misses try again.
        assert!(cache.price_for(MODEL).await.is_err());
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let source = CountingSource::new(0, Duration::ZERO);
        let cache = PricingCache::new(source.clone(), Duration::from_secs(3600));

        cache.price_for(MODEL).await.unwrap();
        tokio::time::advance(Duration::from_secs(1800)).await;
        cache.price_for(MODEL).await.unwrap();
        assert_eq!(source.fetches(), 1);

        tokio::time::advance(Duration::from_secs(1801)).await;
        cache.price_for(MODEL).await.unwrap();
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let source = CountingSource::new(1, Duration::ZERO);
        let cache = PricingCache::new(source.clone(), Duration::from_secs(3600));

        assert!(matches!(
            cache.price_for(MODEL).await,
            Err(PricingError::Status(503))
        ));
        let pricing = cache.price_for(MODEL).await.unwrap();

        assert_eq!(pricing.completion, 0.000_005);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_unknown_model_served_from_cached_table() {
        let source = CountingSource::new(0, Duration::ZERO);
        let cache = PricingCache::new(source.clone(), Duration::from_secs(3600));

        assert!(matches!(
            cache.price_for("other/model").await,
            Err(PricingError::UnknownModel(_))
        ));
        assert!(cache.price_for(MODEL).await.is_ok());
        assert_eq!(source.fetches(), 1);
    }
}
