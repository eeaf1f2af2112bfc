//! Shared types used across dynoscale crates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Ratio table ────────────────────────────────────────────────────

/// Threshold table mapping a minimum backlog size to a worker count.
///
/// With `{1: 1, 10: 2, 30: 5}` one worker runs once the first message
/// arrives, a second one at 10 messages, and five in total from 30
/// messages on. Keys are kept sorted so lookups never depend on
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatioTable(BTreeMap<u64, u32>);

impl RatioTable {
    /// Create an empty table. An empty table always yields 0 workers.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the worker count for backlogs of at least `backlog` messages.
    pub fn insert(&mut self, backlog: u64, workers: u32) -> Option<u32> {
        self.0.insert(backlog, workers)
    }

    /// Worker count for the largest threshold `<= backlog`, or 0 when
    /// the backlog is below every threshold.
    pub fn desired(&self, backlog: u64) -> u32 {
        self.0
            .range(..=backlog)
            .next_back()
            .map(|(_, workers)| *workers)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Thresholds in ascending backlog order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(u64, u32)> for RatioTable {
    fn from_iter<I: IntoIterator<Item = (u64, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for RatioTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (backlog, workers)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{backlog}: {workers}")?;
        }
        f.write_str("}")
    }
}

// ── Policy ─────────────────────────────────────────────────────────

/// One independently scaled target: a queue, the process type that
/// consumes it, and the thresholds that size it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    /// Name of the broker queue to watch.
    pub queue_name: String,
    /// Process type on the fleet platform (the Procfile entry name).
    pub process_type: String,
    pub thresholds: RatioTable,
}

impl ScalingPolicy {
    pub fn new(
        queue_name: impl Into<String>,
        process_type: impl Into<String>,
        thresholds: RatioTable,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            process_type: process_type.into(),
            thresholds,
        }
    }
}

// ── Snapshots ──────────────────────────────────────────────────────

/// Message counts for one queue, observed once per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub name: String,
    /// Messages ready for delivery.
    pub ready: u64,
    /// Messages delivered but not yet acknowledged.
    pub unacked: u64,
}

impl QueueSnapshot {
    pub fn new(name: impl Into<String>, ready: u64, unacked: u64) -> Self {
        Self {
            name: name.into(),
            ready,
            unacked,
        }
    }

    /// Ready plus unacknowledged messages.
    pub fn backlog(&self) -> u64 {
        self.ready.saturating_add(self.unacked)
    }
}

/// Current replica count for one process type, observed once per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub process_type: String,
    pub quantity: u32,
}

impl FleetSnapshot {
    pub fn new(process_type: impl Into<String>, quantity: u32) -> Self {
        Self {
            process_type: process_type.into(),
            quantity,
        }
    }
}
