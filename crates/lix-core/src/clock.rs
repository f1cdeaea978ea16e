//! Hybrid logical clock used for `created_at` ordering.
//!
//! Wall-clock milliseconds alone cannot order two changes written inside the
//! same millisecond, and the winner rule breaks ties on `created_at`. The
//! clock combines wall time with a logical counter so every tick is strictly
//! greater than the previous one, and renders as a fixed-width string whose
//! lexicographic order matches clock order.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single hybrid logical timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridLogicalClock {
    /// Wall clock time in milliseconds since Unix epoch.
    pub wall_time: u64,

    /// Logical counter for events at the same wall time.
    pub logical: u32,

    /// Node identifier for tie-breaking.
    pub node_id: u16,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl HybridLogicalClock {
    /// Create a clock at the current wall time.
    pub fn new(node_id: u16) -> Self {
        Self {
            wall_time: now_millis(),
            logical: 0,
            node_id,
        }
    }

    /// Create an HLC from raw components.
    pub fn from_parts(wall_time: u64, logical: u32, node_id: u16) -> Self {
        Self {
            wall_time,
            logical,
            node_id,
        }
    }

    /// Advance for a local event. The result is always greater than `self`.
    pub fn tick(&self) -> Self {
        let now = now_millis();
        if now > self.wall_time {
            Self {
                wall_time: now,
                logical: 0,
                node_id: self.node_id,
            }
        } else {
            Self {
                wall_time: self.wall_time,
                logical: self.logical + 1,
                node_id: self.node_id,
            }
        }
    }

    /// Advance past a timestamp observed elsewhere (e.g. read back from disk).
    pub fn observe(&self, other: &Self) -> Self {
        if other > self {
            Self {
                wall_time: other.wall_time,
                logical: other.logical,
                node_id: self.node_id,
            }
            .tick()
        } else {
            self.tick()
        }
    }

    /// Fixed-width rendering: `{wall:013}-{logical:06}-{node:05}`.
    pub fn to_sortable_string(&self) -> String {
        format!(
            "{:013}-{:06}-{:05}",
            self.wall_time, self.logical, self.node_id
        )
    }

    /// Parse the output of [`to_sortable_string`](Self::to_sortable_string).
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let wall_time = parts.next()?.parse().ok()?;
        let logical = parts.next()?.parse().ok()?;
        let node_id = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::from_parts(wall_time, logical, node_id))
    }
}

impl PartialOrd for HybridLogicalClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HybridLogicalClock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wall_time
            .cmp(&other.wall_time)
            .then(self.logical.cmp(&other.logical))
            .then(self.node_id.cmp(&other.node_id))
    }
}

impl fmt::Display for HybridLogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sortable_string())
    }
}

/// Shared, thread-safe clock handing out strictly increasing timestamps.
#[derive(Debug)]
pub struct Clock {
    state: Mutex<HybridLogicalClock>,
}

impl Clock {
    /// Create a clock for the given node.
    pub fn new(node_id: u16) -> Self {
        Self {
            state: Mutex::new(HybridLogicalClock::new(node_id)),
        }
    }

    /// Next timestamp.
    pub fn now(&self) -> HybridLogicalClock {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = state.tick();
        *state
    }

    /// Next timestamp rendered for storage.
    pub fn now_string(&self) -> String {
        self.now().to_sortable_string()
    }

    /// Make sure future ticks sort after a persisted timestamp.
    pub fn observe(&self, persisted: &str) {
        if let Some(other) = HybridLogicalClock::parse(persisted) {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *state = state.observe(&other);
        }
    }
}
