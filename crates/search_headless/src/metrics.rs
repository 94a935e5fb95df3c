//! Run metrics and the JSON report.
//!
//! One [`RunReport`] is produced per scenario run. It records spot state
//! counts and assignments every tick, every signal sent, and whether the
//! search released all of its vision registrations at the end.

use std::path::Path;

use serde::{Deserialize, Serialize};

use search_core::group::StatusCounts;
use search_core::math::Vec3Fixed;

/// A signal as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Tick the signal was sent on.
    pub tick: u64,
    /// Receiving agent.
    pub agent: u64,
    /// Signal name.
    pub signal: String,
}

/// An agent's current claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Agent holding the spot.
    pub agent: u64,
    /// Spot position (x, y).
    pub spot: (f64, f64),
}

impl Assignment {
    /// Record `agent` holding the spot at `position`.
    #[must_use]
    pub fn new(agent: u64, position: Vec3Fixed) -> Self {
        Self {
            agent,
            spot: (position.x.to_num(), position.y.to_num()),
        }
    }
}

/// State of the search after one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Spots per state.
    pub counts: StatusCounts,
    /// Claims held at the end of the tick, by agent id.
    pub assignments: Vec<Assignment>,
}

/// Complete metrics for a single scenario run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// Spots the group generated, target spot included.
    pub spots: usize,
    /// Per-tick log.
    pub timeline: Vec<TickMetrics>,
    /// Every signal sent.
    pub signals: Vec<SignalEvent>,
    /// Spots the squad gave up on.
    pub unreachable_reported: u32,
    /// First tick by which every reachable spot had been seen at least once.
    pub cleared_at: Option<u64>,
    /// Spot states after the last tick.
    pub final_counts: StatusCounts,
    /// Hash of the final search state, for determinism checks.
    pub final_state_hash: u64,
    /// Observables still registered after the squad left.
    pub leaked_observables: usize,
    /// Observers still registered after the squad left.
    pub leaked_observers: usize,
}

impl RunReport {
    /// Create an empty report for `scenario`.
    #[must_use]
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            ..Default::default()
        }
    }

    /// Append one tick to the timeline.
    pub fn record_tick(&mut self, metrics: TickMetrics) {
        self.ticks = metrics.tick;
        self.final_counts = metrics.counts;
        self.timeline.push(metrics);
    }

    /// Fraction of spots confirmed (searched or timing out) at the end.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.spots == 0 {
            return 0.0;
        }
        let cleared = self.final_counts.searched + self.final_counts.timing_out;
        cleared as f64 / self.spots as f64
    }

    /// Whether every registration was released.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.leaked_observables == 0 && self.leaked_observers == 0
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON to `path`.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
