use anyhow::{anyhow, Context};
use clap::Parser;
use poolscope::apis::default_adapters;
use poolscope::cache::CacheStore;
use poolscope::catalog::{PoolCatalog, PoolDescriptor};
use poolscope::config::CollectorConfig;
use poolscope::logger::{self, LogTag};
use poolscope::orchestrator::FallbackOrchestrator;
use poolscope::scheduler::BatchScheduler;
use poolscope::synthetic::SyntheticGenerator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Liquidity-pool time-series collector with layered source fallback
#[derive(Debug, Parser)]
#[command(name = "poolscope", version, about)]
struct Args {
    /// History window to collect, in days
    #[arg(long, default_value_t = 30)]
    days: u32,

    /// Collector configuration file (TOML); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pool catalog file (TOML); built-in mainnet pools when omitted
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Restrict the run to these pool ids (repeatable)
    #[arg(long = "pool")]
    pools: Vec<String>,

    /// Override the cache directory from the configuration
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Remove cache entries older than the configured retention before the run
    #[arg(long)]
    evict: bool,

    /// Abort outstanding work after this many seconds, keeping partial results
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CollectorConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CollectorConfig::default(),
    };
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }

    let catalog = match &args.catalog {
        Some(path) => PoolCatalog::from_toml_file(path)
            .with_context(|| format!("loading catalog from {}", path.display()))?,
        None => PoolCatalog::builtin(),
    };

    let pools: Vec<PoolDescriptor> = if args.pools.is_empty() {
        catalog.pools().to_vec()
    } else {
        let mut selected = Vec::with_capacity(args.pools.len());
        for id in &args.pools {
            let pool = catalog
                .get(id)
                .ok_or_else(|| anyhow!("unknown pool id {:?}", id))?;
            selected.push(pool.clone());
        }
        selected
    };

    let cache = Arc::new(CacheStore::new(&config.cache_dir).context("opening cache directory")?);

    if args.evict {
        let removed = cache
            .evict(chrono::Duration::days(config.cache_retention_days))
            .context("evicting stale cache entries")?;
        logger::info(
            LogTag::Cache,
            &format!(
                "evicted {} entries older than {} days",
                removed, config.cache_retention_days
            ),
        );
    }

    let adapters = default_adapters(&config).map_err(|e| anyhow!(e))?;
    let synthetic = SyntheticGenerator::from_config(&config);
    let orchestrator = Arc::new(FallbackOrchestrator::new(
        adapters,
        synthetic,
        cache.clone(),
        config.clone(),
    ));
    let scheduler = BatchScheduler::new(orchestrator, cache.clone(), config);

    let deadline = args
        .deadline_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let result = scheduler.run(&pools, args.days, deadline).await;

    for outcome in &result.outcomes {
        let origin = if outcome.from_cache {
            "cache"
        } else if outcome.synthetic_used {
            "synthetic"
        } else {
            "live"
        };
        println!(
            "{:<12} {:>5} snapshots  [{}]",
            outcome.pool_id,
            outcome.series.len(),
            origin
        );
        for failure in &outcome.failures {
            println!("{:<12}   source failure: {}", "", failure);
        }
    }
    for skipped in &result.skipped {
        println!("{:<12} skipped (deadline)", skipped);
    }
    println!(
        "done: {} ok, {} failed, {} from cache, {} synthetic fills",
        result.succeeded(),
        result.failed(),
        result.cache_hits(),
        result.synthetic_fills()
    );

    let entries = cache.entries().context("listing cache entries")?;
    println!(
        "cache: {} files ({} latest) in {}",
        entries.len(),
        entries.iter().filter(|e| e.is_latest).count(),
        cache.dir().display()
    );

    if result.succeeded() == 0 && !result.outcomes.is_empty() {
        return Err(anyhow!("no pool produced any data"));
    }

    Ok(())
}
