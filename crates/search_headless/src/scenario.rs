//! Scenario loading and configuration.
//!
//! A scenario describes one lost-contact situation: the squad that lost its
//! quarry, the last known position, the cover around it and how long to run
//! the search. Scenarios are RON files; integer coordinates keep them easy
//! to write by hand.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use search_core::config::SearchConfig;
use search_core::error::SearchError;
use search_core::math::{decimal_serde, Fixed, Vec3Fixed};
use search_core::scoring::SearchSpotQuery;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Scenario is structurally unusable.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The search subsystem rejected the run.
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Spot generation settings. `default_spot_timeout` is the timeout the
    /// squad searches with.
    #[serde(default)]
    pub search: SearchConfig,
    /// Number of ticks to simulate.
    pub ticks: u64,
    /// Seconds per tick.
    #[serde(with = "decimal_serde", default = "default_tick_seconds")]
    pub tick_seconds: Fixed,
    /// Squad movement speed, units per second.
    #[serde(default = "default_move_speed")]
    pub move_speed: i32,
    /// Tactical group id of the squad.
    #[serde(default = "default_group")]
    pub group: u32,
    /// Where the squad last saw its quarry.
    pub last_known: (i32, i32),
    /// Where the quarry actually is now, if it still exists.
    #[serde(default)]
    pub quarry: Option<(i32, i32)>,
    /// Squad members.
    pub squad: Vec<AgentSetup>,
    /// Cover surfaces around the last known position.
    #[serde(default)]
    pub cover: Vec<CoverSurface>,
    /// Spots nobody can walk to. Agents sent there report them unreachable.
    #[serde(default)]
    pub blocked: Vec<(i32, i32)>,
    /// What the squad cares about when picking spots.
    #[serde(default)]
    pub query: QueryWeights,
    /// Whether the squad leaves the search after the last tick.
    #[serde(default = "default_true")]
    pub leave_at_end: bool,
}

fn default_tick_seconds() -> Fixed {
    // Same conversion as a `0.1` read from a scenario file
    Fixed::from_num(0.1)
}

fn default_move_speed() -> i32 {
    6
}

fn default_group() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for Scenario {
    fn default() -> Self {
        Self::courtyard()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Reject scenarios the runner cannot drive.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.squad.is_empty() {
            return Err(ScenarioError::Invalid("squad is empty".to_string()));
        }
        if self.tick_seconds <= Fixed::ZERO {
            return Err(ScenarioError::Invalid(
                "tick_seconds must be positive".to_string(),
            ));
        }
        let mut ids: Vec<u64> = self.squad.iter().map(|member| member.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ScenarioError::Invalid("duplicate squad id".to_string()));
        }
        if ids.first() == Some(&0) || ids.contains(&QUARRY_ID) {
            return Err(ScenarioError::Invalid(format!(
                "squad ids must be non-zero and differ from {QUARRY_ID}"
            )));
        }
        Ok(())
    }

    /// Three soldiers sweeping a courtyard after losing sight of an
    /// intruder near its centre.
    #[must_use]
    pub fn courtyard() -> Self {
        Self {
            name: "Courtyard Sweep".to_string(),
            description: "Three-man squad clears cover around the last sighting".to_string(),
            search: SearchConfig {
                default_spot_timeout: Fixed::from_num(8),
                ..SearchConfig::default()
            },
            ticks: 600,
            tick_seconds: default_tick_seconds(),
            move_speed: default_move_speed(),
            group: default_group(),
            last_known: (0, 0),
            quarry: Some((26, 4)),
            squad: vec![
                AgentSetup::new(1, -20, 0),
                AgentSetup::new(2, -20, 4),
                AgentSetup::new(3, -20, -4),
            ],
            cover: vec![
                CoverSurface::new(&[(8, 3), (8, -3), (9, 6), (8, 0), (9, -6)]),
                CoverSurface::new(&[(-6, 12), (-3, 14)]),
                CoverSurface::new(&[(14, -10), (16, -12)]),
                CoverSurface::new(&[(4, -14)]),
            ],
            blocked: vec![(4, -14)],
            query: QueryWeights::default(),
            leave_at_end: true,
        }
    }

    /// Last known position as a world position.
    #[must_use]
    pub fn last_known_position(&self) -> Vec3Fixed {
        to_world(self.last_known)
    }

    /// Whether `position` is one of the blocked spots.
    #[must_use]
    pub fn is_blocked(&self, position: Vec3Fixed) -> bool {
        self.blocked.iter().any(|&p| to_world(p) == position)
    }
}

/// Agent id the quarry is registered under.
pub const QUARRY_ID: u64 = 1000;

/// Convert scenario coordinates to a ground-level world position.
#[must_use]
pub fn to_world((x, y): (i32, i32)) -> Vec3Fixed {
    Vec3Fixed::from_ints(x, y, 0)
}

/// One squad member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSetup {
    /// Agent id. Must be non-zero.
    pub id: u64,
    /// Starting position (x, y).
    pub position: (i32, i32),
    /// Initial facing (x, y).
    #[serde(default = "default_facing")]
    pub facing: (i32, i32),
    /// Full field of view in degrees.
    #[serde(default = "default_fov")]
    pub fov_degrees: i32,
    /// Sight range in world units.
    #[serde(default = "default_sight_range")]
    pub sight_range: i32,
}

fn default_facing() -> (i32, i32) {
    (1, 0)
}

fn default_fov() -> i32 {
    120
}

fn default_sight_range() -> i32 {
    12
}

impl AgentSetup {
    /// Create a squad member with default senses, facing +X.
    #[must_use]
    pub fn new(id: u64, x: i32, y: i32) -> Self {
        Self {
            id,
            position: (x, y),
            facing: default_facing(),
            fov_degrees: default_fov(),
            sight_range: default_sight_range(),
        }
    }
}

/// A piece of cover, sampled at fixed points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverSurface {
    /// Sample points (x, y).
    pub points: Vec<(i32, i32)>,
}

impl CoverSurface {
    /// Create a surface from sample points.
    #[must_use]
    pub fn new(points: &[(i32, i32)]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }
}

/// Integer weights for the squad's spot queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWeights {
    /// Weight of closeness to the asking agent.
    pub agent: i32,
    /// Weight of closeness to the last known position.
    pub target: i32,
    /// Weight of closeness to the quarry's live position.
    pub live_target: i32,
    /// Spots nearer than this to the agent are never granted.
    pub min_distance: i32,
}

impl Default for QueryWeights {
    fn default() -> Self {
        Self {
            agent: 1,
            target: 1,
            live_target: 0,
            min_distance: 1,
        }
    }
}

impl QueryWeights {
    /// Fresh query carrying these weights.
    #[must_use]
    pub fn to_query(self) -> SearchSpotQuery {
        SearchSpotQuery::new(
            (
                Fixed::from_num(self.agent),
                Fixed::from_num(self.target),
                Fixed::from_num(self.live_target),
            ),
            Fixed::from_num(self.min_distance),
        )
    }
}
