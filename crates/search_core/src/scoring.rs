//! Search-spot scoring.
//!
//! A spot's score is a weighted sum of three closeness terms:
//!
//! ```text
//! score = closeness(agent → spot)          · closeness_to_agent_weight
//!       + closeness(last known pos → spot) · closeness_to_target_weight
//!       + closeness(live target → spot)    · closeness_to_target_current_pos_weight
//! ```
//!
//! where `closeness(d) = 1 − clamp(d, 1, 50) / 50`. The live-target term is
//! dropped when the target's current position is unknown.

use crate::math::{Fixed, Vec3Fixed};

/// Score returned for spots the requesting agent must not be sent to.
pub const REJECT_SCORE: Fixed = Fixed::const_from_int(-100);

/// Distances below this count as fully close.
pub const CLOSENESS_MIN_DISTANCE: Fixed = Fixed::const_from_int(1);

/// Distances at or beyond this count as not close at all.
pub const CLOSENESS_MAX_DISTANCE: Fixed = Fixed::const_from_int(50);

/// Map a distance to `[0, 0.98]`, higher meaning closer.
#[must_use]
pub fn closeness(distance: Fixed) -> Fixed {
    let clamped = distance.clamp(CLOSENESS_MIN_DISTANCE, CLOSENESS_MAX_DISTANCE);
    Fixed::ONE - clamped / CLOSENESS_MAX_DISTANCE
}

/// An agent's request for a search spot.
///
/// The weights say what the agent cares about; `result` receives the
/// position of the granted spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchSpotQuery {
    /// Weight of the agent-to-spot closeness term.
    pub closeness_to_agent_weight: Fixed,
    /// Weight of the last-known-position-to-spot closeness term.
    pub closeness_to_target_weight: Fixed,
    /// Weight of the live-target-to-spot closeness term.
    pub closeness_to_target_current_pos_weight: Fixed,
    /// Spots nearer than this to the agent are never granted.
    pub min_distance_from_agent: Fixed,
    /// Output: position of the granted spot.
    pub result: Vec3Fixed,
}

impl SearchSpotQuery {
    /// Create a query with the given weights, in (agent, target, live target)
    /// order, and minimum distance.
    #[must_use]
    pub fn new(weights: (Fixed, Fixed, Fixed), min_distance_from_agent: Fixed) -> Self {
        Self {
            closeness_to_agent_weight: weights.0,
            closeness_to_target_weight: weights.1,
            closeness_to_target_current_pos_weight: weights.2,
            min_distance_from_agent,
            result: Vec3Fixed::ZERO,
        }
    }
}

/// Distances that feed one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SpotDistances {
    pub to_agent: Fixed,
    pub to_target: Fixed,
    pub to_current_target: Option<Fixed>,
}

/// Weighted closeness sum, or `None` when the distance veto applies.
pub(crate) fn weighted_score(distances: SpotDistances, query: &SearchSpotQuery) -> Option<Fixed> {
    if distances.to_agent < query.min_distance_from_agent {
        return None;
    }

    let mut score = closeness(distances.to_agent) * query.closeness_to_agent_weight
        + closeness(distances.to_target) * query.closeness_to_target_weight;

    if let Some(to_current) = distances.to_current_target {
        score += closeness(to_current) * query.closeness_to_target_current_pos_weight;
    }

    Some(score)
}
