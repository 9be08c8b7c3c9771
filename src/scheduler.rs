/// Batch collection across the pool catalog
///
/// Pools are sorted by priority, partitioned into fixed-size batches and
/// fetched concurrently within each batch, with a pause between batches so
/// the remote APIs see a bounded burst rate. A fresh cache entry satisfies a
/// pool without any network traffic. One pool failing never aborts the run.
use crate::cache::CacheStore;
use crate::catalog::PoolDescriptor;
use crate::config::CollectorConfig;
use crate::errors::SourceFailure;
use crate::logger::{self, LogTag};
use crate::orchestrator::FallbackOrchestrator;
use crate::series::TimeSeries;
use std::sync::Arc;
use tokio::time::Instant;

/// Result of collecting one pool within a batch run
#[derive(Debug)]
pub struct PoolOutcome {
    pub pool_id: String,
    pub series: TimeSeries,
    pub from_cache: bool,
    pub synthetic_used: bool,
    pub failures: Vec<SourceFailure>,
}

impl PoolOutcome {
    pub fn succeeded(&self) -> bool {
        !self.series.is_empty()
    }
}

/// Aggregate result of one batch run
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<PoolOutcome>,
    /// Pools never attempted because the deadline expired first
    pub skipped: Vec<String>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn cache_hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.from_cache).count()
    }

    pub fn synthetic_fills(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.from_cache && o.synthetic_used)
            .count()
    }
}

pub struct BatchScheduler {
    orchestrator: Arc<FallbackOrchestrator>,
    cache: Arc<CacheStore>,
    config: CollectorConfig,
}

impl BatchScheduler {
    pub fn new(
        orchestrator: Arc<FallbackOrchestrator>,
        cache: Arc<CacheStore>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            config,
        }
    }

    /// Collect `days` of history for every pool, highest priority first.
    /// With a deadline, batches still in the queue when it expires are
    /// reported as skipped and whatever finished is returned.
    pub async fn run(
        &self,
        pools: &[PoolDescriptor],
        days: u32,
        deadline: Option<Instant>,
    ) -> BatchResult {
        let mut ordered: Vec<&PoolDescriptor> = pools.iter().collect();
        ordered.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        let batch_size = self.config.batch_size.max(1);
        let total_batches = ordered.len().div_ceil(batch_size);
        let mut result = BatchResult::default();

        for (index, batch) in ordered.chunks(batch_size).enumerate() {
            if expired(deadline) {
                result
                    .skipped
                    .extend(batch.iter().map(|pool| pool.id.clone()));
                continue;
            }

            logger::info(
                LogTag::Scheduler,
                &format!(
                    "batch {}/{}: {}",
                    index + 1,
                    total_batches,
                    batch
                        .iter()
                        .map(|pool| pool.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );

            let outcomes = futures::future::join_all(
                batch
                    .iter()
                    .map(|pool| self.collect_pool(pool, days, deadline)),
            )
            .await;
            result.outcomes.extend(outcomes);

            // No pause after the final batch
            if index + 1 < total_batches && !expired(deadline) {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
        }

        logger::info(
            LogTag::Scheduler,
            &format!(
                "run complete: {} ok, {} failed, {} cache hits, {} synthetic, {} skipped",
                result.succeeded(),
                result.failed(),
                result.cache_hits(),
                result.synthetic_fills(),
                result.skipped.len()
            ),
        );

        result
    }

    async fn collect_pool(
        &self,
        pool: &PoolDescriptor,
        days: u32,
        deadline: Option<Instant>,
    ) -> PoolOutcome {
        if let Some(series) = self.cache.get(&pool.id, days) {
            logger::debug(
                LogTag::Scheduler,
                &format!("cache hit for {} ({}d)", pool.id, days),
            );
            return PoolOutcome {
                pool_id: pool.id.clone(),
                series,
                from_cache: true,
                synthetic_used: false,
                failures: Vec::new(),
            };
        }

        let outcome = self
            .orchestrator
            .get_time_series_until(pool, days, deadline)
            .await;

        PoolOutcome {
            pool_id: pool.id.clone(),
            series: outcome.series,
            from_cache: false,
            synthetic_used: outcome.synthetic_used,
            failures: outcome.failures,
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{ensure_enabled, SourceAdapter};
    use crate::catalog::{PoolCatalog, PoolCategory};
    use crate::errors::{AdapterError, AdapterResult};
    use crate::series::{Provenance, Snapshot};
    use crate::synthetic::SyntheticGenerator;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Succeeds for every pool except those listed in `fail_for`
    struct ScriptedAdapter {
        fail_for: Vec<String>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedAdapter {
        fn new(fail_for: &[&str]) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "curve_api"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn fetch(&self, pool: &PoolDescriptor, _days: u32) -> AdapterResult<TimeSeries> {
            ensure_enabled(true)?;
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_for.contains(&pool.id) {
                return Err(AdapterError::Transport("connection reset".to_string()));
            }

            let snapshots = (0..8)
                .map(|i| Snapshot {
                    timestamp: Utc.timestamp_opt(1_700_000_000 + i * 3_600, 0).unwrap(),
                    virtual_price: 1.01,
                    tvl: 5_000_000.0,
                    volume_24h: 100_000.0,
                    apy: 0.03,
                    balances: BTreeMap::new(),
                    provenance: Provenance::CurveApi,
                })
                .collect();
            Ok(TimeSeries::from_snapshots(&pool.id, snapshots))
        }
    }

    fn scheduler_with(
        adapter: ScriptedAdapter,
        config: CollectorConfig,
    ) -> (BatchScheduler, Arc<CacheStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Arc::new(CacheStore::new(dir.path()).expect("cache"));
        let synthetic = SyntheticGenerator::new(config.points_per_day, config.noise_sigma, Some(11));
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            vec![Arc::new(adapter)],
            synthetic,
            cache.clone(),
            config.clone(),
        ));
        (
            BatchScheduler::new(orchestrator, cache.clone(), config),
            cache,
            dir,
        )
    }

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            inter_batch_delay_ms: 0,
            batch_size: 2,
            ..CollectorConfig::default()
        }
    }

    fn extra_pool() -> PoolDescriptor {
        PoolDescriptor {
            id: "ust".to_string(),
            address: "0x890f4e345B1dAED0367A877a1612f86A1f86985f".to_string(),
            name: "UST Metapool".to_string(),
            tokens: vec!["UST".to_string(), "3CRV".to_string()],
            decimals: vec![18, 18],
            category: PoolCategory::Metapool,
            priority: 10,
        }
    }

    #[tokio::test]
    async fn one_failing_pool_does_not_abort_the_batch() {
        // Synthetic off so the failing pool actually comes back empty
        let config = CollectorConfig {
            sources: crate::config::SourceToggles {
                synthetic: false,
                ..Default::default()
            },
            ..fast_config()
        };
        let (adapter, _calls) = ScriptedAdapter::new(&["lusd"]);
        let (scheduler, _cache, _dir) = scheduler_with(adapter, config);

        let mut pools = PoolCatalog::builtin().pools().to_vec();
        pools.push(extra_pool());
        let result = scheduler.run(&pools, 7, None).await;

        assert_eq!(result.outcomes.len(), 5);
        assert_eq!(result.succeeded(), 4);
        assert_eq!(result.failed(), 1);
        let failed = result
            .outcomes
            .iter()
            .find(|o| !o.succeeded())
            .expect("failed outcome");
        assert_eq!(failed.pool_id, "lusd");
        assert_eq!(failed.failures.len(), 1);
    }

    #[tokio::test]
    async fn warm_cache_makes_no_outbound_calls() {
        let (adapter, calls) = ScriptedAdapter::new(&[]);
        let (scheduler, cache, _dir) = scheduler_with(adapter, fast_config());

        let catalog = PoolCatalog::builtin();
        for pool in catalog.pools() {
            let snapshots = vec![Snapshot {
                timestamp: Utc::now(),
                virtual_price: 1.0,
                tvl: 1_000_000.0,
                volume_24h: 50_000.0,
                apy: 0.02,
                balances: BTreeMap::new(),
                provenance: Provenance::CurveApi,
            }];
            cache
                .put(&TimeSeries::from_snapshots(&pool.id, snapshots), 7)
                .expect("prefill");
        }

        let result = scheduler.run(catalog.pools(), 7, None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.cache_hits(), 4);
        assert_eq!(result.succeeded(), 4);
    }

    #[tokio::test]
    async fn pools_are_processed_in_priority_order() {
        let (adapter, _calls) = ScriptedAdapter::new(&[]);
        let config = CollectorConfig {
            batch_size: 1,
            ..fast_config()
        };
        let (scheduler, _cache, _dir) = scheduler_with(adapter, config);

        // Shuffled input; builtin priorities are 3pool < frax < lusd < mim
        let catalog = PoolCatalog::builtin();
        let mut pools: Vec<PoolDescriptor> = catalog.pools().to_vec();
        pools.reverse();

        let result = scheduler.run(&pools, 7, None).await;
        let order: Vec<&str> = result.outcomes.iter().map(|o| o.pool_id.as_str()).collect();
        assert_eq!(order, vec!["3pool", "frax", "lusd", "mim"]);
    }

    #[tokio::test]
    async fn expired_deadline_skips_remaining_batches() {
        let (adapter, calls) = ScriptedAdapter::new(&[]);
        let (scheduler, _cache, _dir) = scheduler_with(adapter, fast_config());

        let catalog = PoolCatalog::builtin();
        let past = Instant::now() - std::time::Duration::from_secs(1);
        let result = scheduler.run(catalog.pools(), 7, Some(past)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(result.outcomes.is_empty());
        assert_eq!(result.skipped.len(), 4);
    }

    #[tokio::test]
    async fn custom_pool_joins_the_run() {
        let (adapter, _calls) = ScriptedAdapter::new(&[]);
        let (scheduler, _cache, _dir) = scheduler_with(adapter, fast_config());

        let result = scheduler.run(&[extra_pool()], 7, None).await;
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].pool_id, "ust");
        assert!(result.outcomes[0].succeeded());
    }
}
