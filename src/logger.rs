//! Tag-prefixed logging helpers over the `log` facade.
//!
//! Every module logs through these functions with its own [`LogTag`], so
//! output stays greppable per subsystem:
//!
//! ```rust
//! use poolscope::logger::{self, LogTag};
//!
//! logger::info(LogTag::Cache, "cache directory ready");
//! logger::warning(LogTag::Api, "subgraph endpoint returned HTTP 410");
//! ```

/// Subsystem tag shown in brackets at the start of every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Catalog,
    Api,
    Cache,
    Synthetic,
    Orchestrator,
    Scheduler,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Catalog => "catalog",
            LogTag::Api => "api",
            LogTag::Cache => "cache",
            LogTag::Synthetic => "synthetic",
            LogTag::Orchestrator => "orchestrator",
            LogTag::Scheduler => "scheduler",
        }
    }
}

/// Initialize the logger backend
///
/// Call once at startup, before any services run. Honors `RUST_LOG`;
/// defaults to info level when unset.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}

/// Log at ERROR level (critical failures, always shown)
pub fn error(tag: LogTag, message: &str) {
    log::error!("[{}] {}", tag.as_str(), message);
}

/// Log at WARNING level (degraded but recoverable situations)
pub fn warning(tag: LogTag, message: &str) {
    log::warn!("[{}] {}", tag.as_str(), message);
}

/// Log at INFO level (normal operational events)
pub fn info(tag: LogTag, message: &str) {
    log::info!("[{}] {}", tag.as_str(), message);
}

/// Log at DEBUG level (request details, cache hits, per-snapshot noise)
pub fn debug(tag: LogTag, message: &str) {
    log::debug!("[{}] {}", tag.as_str(), message);
}
