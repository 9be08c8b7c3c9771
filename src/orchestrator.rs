/// "Comprehensive" fallback strategy
///
/// Tries every enabled source adapter in fixed priority order, accumulates
/// whatever each one returns, and fills with synthetic data when the merged
/// result is below the density floor. Adapter failures are absorbed here and
/// reported as [`SourceFailure`] records; callers always get a valid (possibly
/// empty) series back.
use crate::apis::SourceAdapter;
use crate::cache::CacheStore;
use crate::catalog::PoolDescriptor;
use crate::config::CollectorConfig;
use crate::errors::{AdapterError, SourceFailure};
use crate::logger::{self, LogTag};
use crate::series::{Snapshot, TimeSeries};
use crate::synthetic::SyntheticGenerator;
use std::sync::Arc;
use tokio::time::Instant;

/// Result of one fallback pass for a single pool
#[derive(Debug)]
pub struct FetchOutcome {
    pub series: TimeSeries,
    /// Per-source failure reasons, in the order sources were tried
    pub failures: Vec<SourceFailure>,
    pub synthetic_used: bool,
}

impl FetchOutcome {
    /// Operators use this to tell a real outage from a synthetic fill
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct FallbackOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    synthetic: SyntheticGenerator,
    cache: Arc<CacheStore>,
    config: CollectorConfig,
}

impl FallbackOrchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        synthetic: SyntheticGenerator,
        cache: Arc<CacheStore>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            adapters,
            synthetic,
            cache,
            config,
        }
    }

    pub async fn get_time_series(&self, pool: &PoolDescriptor, days: u32) -> FetchOutcome {
        self.get_time_series_until(pool, days, None).await
    }

    /// Fallback pass with an optional deadline. A deadline that expires
    /// mid-pass abandons the remaining sources (and the synthetic fill) but
    /// never discards snapshots already accumulated.
    pub async fn get_time_series_until(
        &self,
        pool: &PoolDescriptor,
        days: u32,
        deadline: Option<Instant>,
    ) -> FetchOutcome {
        let mut tagged: Vec<(usize, Snapshot)> = Vec::new();
        let mut failures: Vec<SourceFailure> = Vec::new();

        for (rank, adapter) in self.adapters.iter().enumerate() {
            if expired(deadline) {
                failures.push(SourceFailure::new(
                    adapter.name(),
                    AdapterError::DeadlineExceeded,
                ));
                continue;
            }
            if !adapter.is_enabled() {
                failures.push(SourceFailure::new(adapter.name(), AdapterError::Disabled));
                continue;
            }

            match adapter.fetch(pool, days).await {
                Ok(series) if !series.is_empty() => {
                    logger::info(
                        LogTag::Orchestrator,
                        &format!(
                            "{}: {} snapshots for {} ({}d)",
                            adapter.name(),
                            series.len(),
                            pool.id,
                            days
                        ),
                    );
                    tagged.extend(series.snapshots.into_iter().map(|s| (rank, s)));
                }
                Ok(_) => {
                    failures.push(SourceFailure::new(
                        adapter.name(),
                        AdapterError::NotFound(pool.id.clone()),
                    ));
                }
                Err(error) => {
                    logger::warning(
                        LogTag::Orchestrator,
                        &format!("{} failed for {}: {}", adapter.name(), pool.id, error),
                    );
                    failures.push(SourceFailure::new(adapter.name(), error));
                }
            }
        }

        let min_required = self.config.min_required(days);
        let mut synthetic_used = false;

        if tagged.len() < min_required && self.config.sources.synthetic && !expired(deadline) {
            logger::info(
                LogTag::Orchestrator,
                &format!(
                    "{} real snapshots for {} below floor {}, generating synthetic fill",
                    tagged.len(),
                    pool.id,
                    min_required
                ),
            );

            // Newest accumulated real snapshot serves as the perturbation
            // reference; with nothing accumulated we fabricate from the
            // category baseline.
            let reference = tagged
                .iter()
                .map(|(_, s)| s)
                .max_by_key(|s| s.timestamp)
                .cloned();
            let synthetic = self
                .synthetic
                .generate(pool, days, reference.as_ref());

            // Synthetic ranks after every adapter so real data wins ties
            let rank = self.adapters.len();
            tagged.extend(synthetic.snapshots.into_iter().map(|s| (rank, s)));
            synthetic_used = true;
        }

        let series = TimeSeries::merge(&pool.id, tagged);

        if series.is_empty() {
            logger::error(
                LogTag::Orchestrator,
                &format!(
                    "every strategy failed for {} ({}d): {}",
                    pool.id,
                    days,
                    failures
                        .iter()
                        .map(|f| f.to_string())
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
            );
        } else if let Err(err) = self.cache.put(&series, days) {
            // Keep the fetched data even when persistence fails
            logger::warning(
                LogTag::Orchestrator,
                &format!("failed to cache {} ({}d): {}", pool.id, days, err),
            );
        }

        FetchOutcome {
            series,
            failures,
            synthetic_used,
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}
