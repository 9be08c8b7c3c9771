/// Source adapters for remote pool-data providers
///
/// Each submodule wraps one external system behind the [`SourceAdapter`]
/// trait. Adapters absorb their own transport failures and report them as
/// typed [`AdapterError`]s; nothing escapes past the orchestrator. Adding a
/// source means implementing the trait and appending it to the stack built
/// by [`default_adapters`] — no branching logic anywhere else changes.
pub mod client;
pub mod curve;
pub mod defillama;
pub mod subgraph;

use crate::catalog::PoolDescriptor;
use crate::config::CollectorConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::series::TimeSeries;
use async_trait::async_trait;
use std::sync::Arc;

pub use self::curve::CurveApiClient;
pub use self::defillama::DefiLlamaClient;
pub use self::subgraph::SubgraphClient;

/// One remote source of pool snapshots
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable name used in provenance tags and failure reports
    fn name(&self) -> &'static str;

    /// Disabled adapters return [`AdapterError::Disabled`] without any I/O
    fn is_enabled(&self) -> bool;

    /// Fetch up to `days` worth of snapshots for the pool.
    ///
    /// Implementations apply their own timeout, pacing and bounded retries,
    /// must not mutate shared state, and return ascending timestamps.
    async fn fetch(&self, pool: &PoolDescriptor, days: u32) -> AdapterResult<TimeSeries>;
}

/// Build the adapter stack in fixed priority order: primary REST API first,
/// then the subgraph, then the yield aggregator.
pub fn default_adapters(
    config: &CollectorConfig,
) -> Result<Vec<Arc<dyn SourceAdapter>>, String> {
    Ok(vec![
        Arc::new(CurveApiClient::from_config(config)?),
        Arc::new(SubgraphClient::from_config(config)?),
        Arc::new(DefiLlamaClient::from_config(config)?),
    ])
}

/// Shared guard used by every adapter's fetch entry point
pub(crate) fn ensure_enabled(enabled: bool) -> AdapterResult<()> {
    if enabled {
        Ok(())
    } else {
        Err(AdapterError::Disabled)
    }
}

/// Pull an f64 out of a JSON field that providers serialize inconsistently
/// (sometimes a number, sometimes a decimal string)
pub(crate) fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}
