/// Core time-series types shared by adapters, cache and scheduler
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which data source produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "curve_api")]
    CurveApi,
    #[serde(rename = "subgraph")]
    Subgraph,
    #[serde(rename = "defillama")]
    DefiLlama,
    #[serde(rename = "synthetic")]
    Synthetic,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::CurveApi => "curve_api",
            Provenance::Subgraph => "subgraph",
            Provenance::DefiLlama => "defillama",
            Provenance::Synthetic => "synthetic",
        }
    }

    pub fn parse(s: &str) -> Option<Provenance> {
        match s {
            "curve_api" => Some(Provenance::CurveApi),
            "subgraph" => Some(Provenance::Subgraph),
            "defillama" => Some(Provenance::DefiLlama),
            "synthetic" => Some(Provenance::Synthetic),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point-in-time observation of a pool's state
///
/// Balance keys are lowercase token symbols, matching the
/// `{token}_balance` columns of the persisted format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    /// Pool-internal exchange-rate scalar, nominal 1.0 baseline. Always > 0.
    pub virtual_price: f64,
    pub tvl: f64,
    pub volume_24h: f64,
    /// Yield, nominally bounded [0, 1]
    pub apy: f64,
    pub balances: BTreeMap<String, f64>,
    pub provenance: Provenance,
}

/// Ordered sequence of snapshots for one pool
///
/// Always sorted ascending by timestamp with unique timestamps. Construct
/// through [`TimeSeries::merge`] or [`TimeSeries::from_snapshots`] to keep
/// that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub pool_id: String,
    pub snapshots: Vec<Snapshot>,
}

impl TimeSeries {
    pub fn empty(pool_id: &str) -> Self {
        Self {
            pool_id: pool_id.to_string(),
            snapshots: Vec::new(),
        }
    }

    /// Build a series from unordered snapshots; on duplicate timestamps the
    /// later element of the input wins.
    pub fn from_snapshots(pool_id: &str, snapshots: Vec<Snapshot>) -> Self {
        let tagged = snapshots
            .into_iter()
            .enumerate()
            .map(|(i, s)| (i, s))
            .collect();
        Self::merge(pool_id, tagged)
    }

    /// Merge rank-tagged snapshots into a sorted, timestamp-unique series.
    ///
    /// Equal timestamps are resolved in favor of the highest rank. Ranks are
    /// assigned explicitly by the orchestrator (adapter position in the
    /// fallback order, synthetic last) so precedence is deterministic rather
    /// than an accident of append order.
    pub fn merge(pool_id: &str, mut tagged: Vec<(usize, Snapshot)>) -> Self {
        tagged.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then(a.0.cmp(&b.0)));

        let mut snapshots: Vec<Snapshot> = Vec::with_capacity(tagged.len());
        for (_, snap) in tagged {
            match snapshots.last_mut() {
                Some(prev) if prev.timestamp == snap.timestamp => *prev = snap,
                _ => snapshots.push(snap),
            }
        }

        Self {
            pool_id: pool_id.to_string(),
            snapshots,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Newest snapshot, if any
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// True when every snapshot carries the given provenance tag
    pub fn all_from(&self, provenance: Provenance) -> bool {
        !self.is_empty() && self.snapshots.iter().all(|s| s.provenance == provenance)
    }

    /// Count of snapshots not produced by the synthetic generator
    pub fn real_count(&self) -> usize {
        self.snapshots
            .iter()
            .filter(|s| s.provenance != Provenance::Synthetic)
            .count()
    }

    /// Validates the ordering invariant; used by tests and cache loading
    pub fn is_sorted_unique(&self) -> bool {
        self.snapshots
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snap(ts_secs: i64, virtual_price: f64, provenance: Provenance) -> Snapshot {
        Snapshot {
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            virtual_price,
            tvl: 1_000_000.0,
            volume_24h: 50_000.0,
            apy: 0.04,
            balances: BTreeMap::new(),
            provenance,
        }
    }

    #[test]
    fn merge_sorts_and_dedups() {
        let tagged = vec![
            (0, snap(300, 1.0, Provenance::CurveApi)),
            (0, snap(100, 1.0, Provenance::CurveApi)),
            (0, snap(200, 1.0, Provenance::CurveApi)),
            (1, snap(200, 1.1, Provenance::Subgraph)),
        ];

        let series = TimeSeries::merge("3pool", tagged);
        assert_eq!(series.len(), 3);
        assert!(series.is_sorted_unique());
    }

    #[test]
    fn merge_tie_break_prefers_higher_rank() {
        let tagged = vec![
            (1, snap(100, 1.5, Provenance::Subgraph)),
            (0, snap(100, 1.0, Provenance::CurveApi)),
        ];

        let series = TimeSeries::merge("3pool", tagged);
        assert_eq!(series.len(), 1);
        // Rank 1 wins even though it was pushed first
        assert_eq!(series.snapshots[0].virtual_price, 1.5);
        assert_eq!(series.snapshots[0].provenance, Provenance::Subgraph);
    }

    #[test]
    fn from_snapshots_last_write_wins() {
        let series = TimeSeries::from_snapshots(
            "frax",
            vec![
                snap(100, 1.0, Provenance::CurveApi),
                snap(100, 2.0, Provenance::Synthetic),
            ],
        );
        assert_eq!(series.len(), 1);
        assert_eq!(series.snapshots[0].virtual_price, 2.0);
    }

    #[test]
    fn provenance_round_trips_through_strings() {
        for p in [
            Provenance::CurveApi,
            Provenance::Subgraph,
            Provenance::DefiLlama,
            Provenance::Synthetic,
        ] {
            assert_eq!(Provenance::parse(p.as_str()), Some(p));
        }
        assert_eq!(Provenance::parse("unknown"), None);
    }

    #[test]
    fn real_count_ignores_synthetic() {
        let series = TimeSeries::from_snapshots(
            "mim",
            vec![
                snap(100, 1.0, Provenance::CurveApi),
                snap(200, 1.0, Provenance::Synthetic),
                snap(300, 1.0, Provenance::Subgraph),
            ],
        );
        assert_eq!(series.real_count(), 2);
        assert!(!series.all_from(Provenance::Synthetic));
    }
}
