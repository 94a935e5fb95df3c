//! Boundary to the rest of the game.
//!
//! The search subsystem never owns agents, never casts rays and never
//! samples geometry itself. It talks to four collaborators through the
//! traits in this module:
//!
//! - [`AgentDirectory`] - agent poses, perception and group membership
//! - [`VisionMap`] - observer/observable registration and visibility queries
//! - [`CoverSampler`] - candidate vantage points around a position
//! - [`SignalSink`] - behaviour signals sent back to agents
//!
//! All calls are synchronous. A game that runs visibility asynchronously
//! answers [`VisionMap::is_visible`] from its latest completed result.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, GroupId, VisionId};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Faction value that every observer can see regardless of relations.
pub const ANY_FACTION: u8 = u8::MAX;

/// Category bits used to filter which observables an observer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VisionTypeMask(u32);

impl VisionTypeMask {
    /// Regular gameplay entities.
    pub const GENERAL: Self = Self(1 << 0);
    /// Candidate search locations registered by search groups.
    pub const SEARCH_SPOT: Self = Self(1 << 1);

    /// No categories.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if any category in `other` is set in `self`.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Combine two masks.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Get raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for VisionTypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Which observer properties changed in a [`VisionMap::observer_moved`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObserverChange(u8);

impl ObserverChange {
    /// Eye position changed.
    pub const POSITION: Self = Self(1 << 0);
    /// View direction changed.
    pub const DIRECTION: Self = Self(1 << 1);
    /// Field of view or sight range changed.
    pub const PERCEPTION: Self = Self(1 << 2);

    /// Check if all flags in `other` are set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ObserverChange {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Registration data for something that can be seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservableParams {
    /// World position of the observable.
    pub position: Vec3Fixed,
    /// Category of the observable.
    pub type_mask: VisionTypeMask,
    /// Faction of the observable ([`ANY_FACTION`] for search spots).
    pub faction: u8,
}

/// Registration data for a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverParams {
    /// Eye position.
    pub eye_position: Vec3Fixed,
    /// Normalized view direction.
    pub view_direction: Vec3Fixed,
    /// Full field of view in degrees.
    pub fov_degrees: Fixed,
    /// Maximum sight distance.
    pub sight_range: Fixed,
    /// Categories of observable this observer reacts to.
    pub type_mask: VisionTypeMask,
    /// Faction of the observing agent.
    pub faction: u8,
}

/// Sensor configuration read from an agent's own properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perception {
    /// Full field of view in degrees.
    #[serde(with = "fixed_serde")]
    pub fov_degrees: Fixed,
    /// Maximum sight distance.
    #[serde(with = "fixed_serde")]
    pub sight_range: Fixed,
    /// Faction the agent belongs to.
    pub faction: u8,
}

impl Default for Perception {
    fn default() -> Self {
        Self {
            fov_degrees: Fixed::from_num(120),
            sight_range: Fixed::from_num(50),
            faction: 0,
        }
    }
}

/// Read access to agents, by id.
pub trait AgentDirectory {
    /// Whether the agent exists and is alive/enabled.
    fn is_valid(&self, agent: AgentId) -> bool;

    /// World position of the agent (its feet).
    fn position(&self, agent: AgentId) -> Option<Vec3Fixed>;

    /// Eye position used for vision. Defaults to [`position`](Self::position).
    fn eye_position(&self, agent: AgentId) -> Option<Vec3Fixed> {
        self.position(agent)
    }

    /// Current view direction.
    fn view_direction(&self, agent: AgentId) -> Option<Vec3Fixed>;

    /// Tactical group the agent currently belongs to.
    fn group_of(&self, agent: AgentId) -> Option<GroupId>;

    /// Sight range and field of view configured on the agent.
    fn perception(&self, agent: AgentId) -> Option<Perception>;

    /// All members of a tactical group, valid or not, in a stable order.
    fn group_members(&self, group: GroupId) -> Vec<AgentId>;
}

/// The game's visibility system.
pub trait VisionMap {
    /// Allocate a new handle. `name` is a debug label.
    fn create_vision_id(&mut self, name: &str) -> VisionId;

    /// Register something that observers can see.
    fn register_observable(&mut self, id: VisionId, params: ObservableParams);

    /// Remove an observable registration.
    fn unregister_observable(&mut self, id: VisionId);

    /// Register a sensor.
    fn register_observer(&mut self, id: VisionId, params: ObserverParams);

    /// Remove a sensor registration.
    fn unregister_observer(&mut self, id: VisionId);

    /// Update a sensor's pose. `changed` says which fields are new.
    fn observer_moved(&mut self, id: VisionId, params: ObserverParams, changed: ObserverChange);

    /// Whether `observer` currently sees `observable`.
    fn is_visible(&self, observer: VisionId, observable: VisionId) -> bool;
}

/// Input to a cover-sampling query.
#[derive(Debug, Clone, Copy)]
pub struct CoverQuery<'a> {
    /// Centre of the sampled area.
    pub center: Vec3Fixed,
    /// Sampling radius around `center`.
    pub radius: Fixed,
    /// Eye positions the cover should hide from.
    pub eyes: &'a [Vec3Fixed],
    /// Minimum distance between two returned points.
    pub min_separation: Fixed,
    /// Maximum number of points to return.
    pub max_results: usize,
    /// Maximum number of points taken from one cover surface.
    pub max_per_surface: usize,
}

/// The game's cover-point sampler.
pub trait CoverSampler {
    /// Sample candidate positions. Implementations may return fewer points
    /// than `max_results`, or none at all.
    fn sample_cover(&self, query: &CoverQuery<'_>) -> Vec<Vec3Fixed>;
}

/// Behaviour signals sent to agents when their assigned spot gets cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchSignal {
    /// The agent itself saw the spot at the target's last known position.
    TargetSearchSpotSeen,
    /// The agent itself saw its assigned spot.
    AssignedSearchSpotSeen,
    /// Another group member saw the agent's assigned spot first.
    AssignedSearchSpotSeenBySomeoneElse,
}

impl SearchSignal {
    /// Signal name as understood by behaviour scripts.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TargetSearchSpotSeen => "OnTargetSearchSpotSeen",
            Self::AssignedSearchSpotSeen => "OnAssignedSearchSpotSeen",
            Self::AssignedSearchSpotSeenBySomeoneElse => "OnAssignedSearchSpotSeenBySomeoneElse",
        }
    }
}

/// Receives behaviour signals.
pub trait SignalSink {
    /// Deliver `signal` to `agent`.
    fn send(&mut self, agent: AgentId, signal: SearchSignal);
}

/// Everything the search subsystem needs from the outside world, borrowed
/// for the duration of one call.
pub struct SearchServices<'a> {
    /// Agent lookups.
    pub agents: &'a dyn AgentDirectory,
    /// Visibility system.
    pub vision: &'a mut dyn VisionMap,
    /// Cover sampler.
    pub cover: &'a dyn CoverSampler,
    /// Signal dispatch.
    pub signals: &'a mut dyn SignalSink,
}

impl<'a> SearchServices<'a> {
    /// Bundle the collaborators.
    pub fn new(
        agents: &'a dyn AgentDirectory,
        vision: &'a mut dyn VisionMap,
        cover: &'a dyn CoverSampler,
        signals: &'a mut dyn SignalSink,
    ) -> Self {
        Self {
            agents,
            vision,
            cover,
            signals,
        }
    }
}
