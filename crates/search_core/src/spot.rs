//! A single candidate search location and its lifecycle.
//!
//! ```text
//! NotSearchedYet      --assign------------> BeingSearchedRightAboutNow
//! BeingSearched...    --release/reassign--> NotSearchedYet
//! BeingSearched...    --unreachable-------> Unreachable
//! (any but Unreachable) --seen, timeout > 0--> SearchedTimingOut
//! (any but Unreachable) --seen, timeout <= 0-> Searched
//! SearchedTimingOut   --timer <= 0--------> NotSearchedYet
//! ```
//!
//! Any state except `Unreachable` can be confirmed by an observer.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, VisionId};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::services::{ObservableParams, SearchSignal, SignalSink, VisionMap, VisionTypeMask};
use crate::services::ANY_FACTION;

/// Lifecycle state of a search spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchSpotStatus {
    /// Available for assignment.
    #[default]
    NotSearchedYet,
    /// Claimed by exactly one agent.
    BeingSearchedRightAboutNow,
    /// Confirmed, permanently.
    Searched,
    /// Confirmed, reverts to `NotSearchedYet` when the timer runs out.
    SearchedTimingOut,
    /// Nobody can reach it. Never assigned again.
    Unreachable,
}

/// A discrete location an agent can go to in order to visually clear it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpot {
    position: Vec3Fixed,
    status: SearchSpotStatus,
    assignee: Option<AgentId>,
    timeout_remaining: Fixed,
    is_target_spot: bool,
    last_observed: Fixed,
    observable: Option<VisionId>,
}

impl SearchSpot {
    /// Create an unregistered spot at `position`.
    #[must_use]
    pub fn new(position: Vec3Fixed, is_target_spot: bool) -> Self {
        Self {
            position,
            status: SearchSpotStatus::NotSearchedYet,
            assignee: None,
            timeout_remaining: Fixed::ZERO,
            is_target_spot,
            last_observed: Fixed::ZERO,
            observable: None,
        }
    }

    /// Place the spot and register it with the vision map.
    ///
    /// The observable uses the search-spot category and [`ANY_FACTION`] so
    /// every searching observer can see it. Calling `init` again only moves
    /// the spot; it does not register a second observable.
    pub fn init(&mut self, position: Vec3Fixed, is_target_spot: bool, vision: &mut dyn VisionMap) {
        self.position = position;
        self.is_target_spot = is_target_spot;

        if self.observable.is_some() {
            return;
        }

        let id = vision.create_vision_id("SearchSpot");
        vision.register_observable(
            id,
            ObservableParams {
                position,
                type_mask: VisionTypeMask::SEARCH_SPOT,
                faction: ANY_FACTION,
            },
        );
        self.observable = Some(id);
    }

    /// Unregister the observable. The spot must not be used for vision
    /// queries afterwards.
    pub fn release(&mut self, vision: &mut dyn VisionMap) {
        if let Some(id) = self.observable.take() {
            vision.unregister_observable(id);
        }
    }

    /// Record that `observer` has seen this spot at group time `now`.
    ///
    /// The current assignee, if any, is told about it and loses the claim.
    /// A positive `timeout` makes the spot searchable again once it expires.
    pub fn mark_as_searched_by(
        &mut self,
        observer: AgentId,
        timeout: Fixed,
        now: Fixed,
        signals: &mut dyn SignalSink,
    ) {
        if self.status == SearchSpotStatus::Unreachable {
            return;
        }

        if let Some(assignee) = self.assignee.take() {
            if assignee == observer {
                if self.is_target_spot {
                    signals.send(assignee, SearchSignal::TargetSearchSpotSeen);
                }
                signals.send(assignee, SearchSignal::AssignedSearchSpotSeen);
            } else {
                signals.send(assignee, SearchSignal::AssignedSearchSpotSeenBySomeoneElse);
            }
        }

        if timeout > Fixed::ZERO {
            self.status = SearchSpotStatus::SearchedTimingOut;
            self.timeout_remaining = timeout;
        } else {
            self.status = SearchSpotStatus::Searched;
        }
        self.last_observed = now;
    }

    /// Advance the searched timer. Returns true on the tick the spot
    /// becomes searchable again, which is once the updates add up to the
    /// full timeout.
    pub fn update_searched_timeout(&mut self, dt: Fixed) -> bool {
        if self.status != SearchSpotStatus::SearchedTimingOut {
            return false;
        }

        self.timeout_remaining = self.timeout_remaining.saturating_sub(dt);
        if self.timeout_remaining <= Fixed::ZERO {
            self.status = SearchSpotStatus::NotSearchedYet;
            return true;
        }
        false
    }

    /// Permanently exclude the spot from assignment.
    pub fn mark_as_unreachable(&mut self) {
        self.status = SearchSpotStatus::Unreachable;
        self.assignee = None;
    }

    /// Give the spot to `agent`.
    pub(crate) fn assign_to(&mut self, agent: AgentId) {
        self.status = SearchSpotStatus::BeingSearchedRightAboutNow;
        self.assignee = Some(agent);
    }

    /// Drop the current claim without confirming the spot.
    pub(crate) fn release_assignment(&mut self) {
        if self.status == SearchSpotStatus::BeingSearchedRightAboutNow {
            self.status = SearchSpotStatus::NotSearchedYet;
        }
        self.assignee = None;
    }

    /// Rebuild a spot from persisted fields. The observable is not restored.
    pub(crate) fn from_persisted(
        position: Vec3Fixed,
        status: SearchSpotStatus,
        assignee: Option<AgentId>,
        timeout_remaining: Fixed,
        is_target_spot: bool,
    ) -> Self {
        Self {
            position,
            status,
            assignee,
            timeout_remaining,
            is_target_spot,
            last_observed: Fixed::ZERO,
            observable: None,
        }
    }

    /// World position.
    #[must_use]
    pub const fn position(&self) -> Vec3Fixed {
        self.position
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> SearchSpotStatus {
        self.status
    }

    /// Agent currently responsible for this spot.
    #[must_use]
    pub const fn assignee(&self) -> Option<AgentId> {
        self.assignee
    }

    /// Seconds until a timing-out spot reverts.
    #[must_use]
    pub const fn timeout_remaining(&self) -> Fixed {
        self.timeout_remaining
    }

    /// Whether this is the spot at the target's last known position.
    #[must_use]
    pub const fn is_target_spot(&self) -> bool {
        self.is_target_spot
    }

    /// Group time of the most recent confirmation.
    #[must_use]
    pub const fn last_observed(&self) -> Fixed {
        self.last_observed
    }

    /// Vision-map handle, while registered.
    #[must_use]
    pub const fn observable(&self) -> Option<VisionId> {
        self.observable
    }

    /// True for `Searched` and `Unreachable`: nothing left to see here.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(
            self.status,
            SearchSpotStatus::Searched | SearchSpotStatus::Unreachable
        )
    }
}

/// Persisted scalar fields of a spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpotSnapshot {
    /// World position.
    pub position: Vec3Fixed,
    /// Agent holding the claim.
    pub assignee: Option<AgentId>,
    /// Seconds left on the searched timer.
    #[serde(with = "fixed_serde")]
    pub timeout_remaining: Fixed,
    /// Whether this is the target-position spot.
    pub is_target_spot: bool,
    /// Lifecycle state.
    pub status: SearchSpotStatus,
}

impl From<&SearchSpot> for SearchSpotSnapshot {
    fn from(spot: &SearchSpot) -> Self {
        Self {
            position: spot.position,
            assignee: spot.assignee,
            timeout_remaining: spot.timeout_remaining,
            is_target_spot: spot.is_target_spot,
            status: spot.status,
        }
    }
}

impl From<&SearchSpotSnapshot> for SearchSpot {
    fn from(snapshot: &SearchSpotSnapshot) -> Self {
        SearchSpot::from_persisted(
            snapshot.position,
            snapshot.status,
            snapshot.assignee,
            snapshot.timeout_remaining,
            snapshot.is_target_spot,
        )
    }
}
