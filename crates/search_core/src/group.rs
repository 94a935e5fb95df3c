//! One tactical group hunting one target.
//!
//! A [`SearchGroup`] owns the candidate [`SearchSpot`]s around the target's
//! last known position and the roster of [`SearchActor`]s whose sensors
//! clear them. Each tick it pushes sensor poses to the vision map, runs the
//! searched timers and confirms every spot some actor can currently see.
//! Between ticks, agents ask it for their next spot.
//!
//! # Assignment
//!
//! Only `NotSearchedYet` spots are scored. The best one wins, the first in
//! spot order on a tie. When every spot is claimed or confirmed the group
//! falls back to the spot confirmed longest ago so that agents never stall.
//! The distance veto applies to both passes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::ids::{AgentId, GroupId, VisionId};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::scoring::{weighted_score, SearchSpotQuery, SpotDistances, REJECT_SCORE};
use crate::services::{
    AgentDirectory, CoverQuery, ObserverChange, ObserverParams, SearchServices, VisionMap,
    VisionTypeMask,
};
use crate::spot::{SearchSpot, SearchSpotSnapshot, SearchSpotStatus};

/// A group member whose sensor takes part in the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchActor {
    /// The agent.
    pub agent: AgentId,
    /// Observer registered for the agent. Owned by the group.
    pub observer: VisionId,
}

/// Number of spots in each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    /// `NotSearchedYet` spots.
    pub not_searched: usize,
    /// `BeingSearchedRightAboutNow` spots.
    pub being_searched: usize,
    /// `Searched` spots.
    pub searched: usize,
    /// `SearchedTimingOut` spots.
    pub timing_out: usize,
    /// `Unreachable` spots.
    pub unreachable: usize,
}

/// Search state of one tactical group.
#[derive(Debug, Clone)]
pub struct SearchGroup {
    id: GroupId,
    target_position: Vec3Fixed,
    target_entity: AgentId,
    spot_timeout: Fixed,
    /// Seconds since the group was created.
    clock: Fixed,
    actors: Vec<SearchActor>,
    spots: Vec<SearchSpot>,
    entered: BTreeSet<AgentId>,
    /// agent → index into `spots`; mirrors every spot's `assignee`.
    assignments: BTreeMap<AgentId, usize>,
}

impl SearchGroup {
    /// Create an empty group. Call [`init`](Self::init) before use.
    #[must_use]
    pub fn new(
        id: GroupId,
        target_position: Vec3Fixed,
        target_entity: AgentId,
        spot_timeout: Fixed,
    ) -> Self {
        Self {
            id,
            target_position,
            target_entity,
            spot_timeout,
            clock: Fixed::ZERO,
            actors: Vec::new(),
            spots: Vec::new(),
            entered: BTreeSet::new(),
            assignments: BTreeMap::new(),
        }
    }

    /// Register the group's sensors and generate its search spots.
    pub fn init(&mut self, config: &SearchConfig, services: &mut SearchServices<'_>) {
        self.register_actors(services);
        self.generate_search_spots(config, services);

        info!(
            group = %self.id,
            actors = self.actors.len(),
            spots = self.spots.len(),
            "Search group initialised"
        );
    }

    /// Register an observer for every valid member of the external group.
    fn register_actors(&mut self, services: &mut SearchServices<'_>) {
        for agent in services.agents.group_members(self.id) {
            if !services.agents.is_valid(agent) || self.actors.iter().any(|a| a.agent == agent) {
                continue;
            }

            let Some(params) = observer_params(services.agents, agent) else {
                continue;
            };

            let observer = services
                .vision
                .create_vision_id(&format!("SearchActor {agent}"));
            services.vision.register_observer(observer, params);
            self.actors.push(SearchActor { agent, observer });
        }
    }

    /// Turn cover samples around the target into spots, then add the
    /// mandatory spot at the target position itself.
    fn generate_search_spots(&mut self, config: &SearchConfig, services: &mut SearchServices<'_>) {
        let eyes: Vec<Vec3Fixed> = self
            .actors
            .iter()
            .filter_map(|actor| services.agents.eye_position(actor.agent))
            .collect();

        let candidates = services.cover.sample_cover(&CoverQuery {
            center: self.target_position,
            radius: config.cover_radius,
            eyes: &eyes,
            min_separation: config.min_spot_separation,
            max_results: config.max_search_spots,
            max_per_surface: config.max_cover_per_surface,
        });

        let positions = select_spot_positions(
            &candidates,
            config.min_spot_separation,
            config.max_search_spots,
        );

        self.spots.reserve(positions.len() + 1);
        for position in positions {
            let mut spot = SearchSpot::new(position, false);
            spot.init(position, false, services.vision);
            self.spots.push(spot);
        }

        let mut target_spot = SearchSpot::new(self.target_position, true);
        target_spot.init(self.target_position, true, services.vision);
        self.spots.push(target_spot);
    }

    /// Advance the search by `dt` seconds.
    ///
    /// 1. Push every actor's eye pose to its observer.
    /// 2. Run the timers of timing-out spots.
    /// 3. Confirm every open spot that an actor can see, testing actors in
    ///    roster order.
    pub fn update(&mut self, dt: Fixed, services: &mut SearchServices<'_>) {
        self.clock = self.clock.saturating_add(dt);

        for actor in &self.actors {
            if let Some(params) = observer_params(services.agents, actor.agent) {
                services.vision.observer_moved(
                    actor.observer,
                    params,
                    ObserverChange::POSITION | ObserverChange::DIRECTION,
                );
            }
        }

        for spot in &mut self.spots {
            spot.update_searched_timeout(dt);
        }

        for index in 0..self.spots.len() {
            let spot = &self.spots[index];
            if spot.is_settled() {
                continue;
            }
            let Some(observable) = spot.observable() else {
                continue;
            };

            let seen_by = self
                .actors
                .iter()
                .find(|actor| services.vision.is_visible(actor.observer, observable))
                .map(|actor| actor.agent);

            if let Some(observer) = seen_by {
                if let Some(previous) = spot.assignee() {
                    self.assignments.remove(&previous);
                }
                self.spots[index].mark_as_searched_by(
                    observer,
                    self.spot_timeout,
                    self.clock,
                    services.signals,
                );
                debug!(group = %self.id, spot = index, by = %observer, "Search spot seen");
            }
        }

        #[cfg(feature = "debug-validation")]
        debug_assert!(self.invariants_hold(), "search group invariants violated");
    }

    /// Grant `agent` its next spot and write the position to `query.result`.
    ///
    /// Any spot the agent already holds goes back to `NotSearchedYet`.
    /// Returns false, leaving the current claim untouched, when no spot is
    /// eligible.
    pub fn get_next_search_point(
        &mut self,
        agent: AgentId,
        query: &mut SearchSpotQuery,
        agents: &dyn AgentDirectory,
    ) -> bool {
        let Some(index) = self.find_best_search_spot(agent, query, agents) else {
            debug!(group = %self.id, agent = %agent, "No eligible search spot");
            return false;
        };

        if let Some(previous) = self.assignments.remove(&agent) {
            self.spots[previous].release_assignment();
        }

        self.spots[index].assign_to(agent);
        self.assignments.insert(agent, index);
        query.result = self.spots[index].position();

        debug!(group = %self.id, agent = %agent, spot = index, "Assigned search spot");

        #[cfg(feature = "debug-validation")]
        debug_assert!(self.invariants_hold(), "search group invariants violated");

        true
    }

    /// Index of the spot `agent` should search next, if any.
    #[must_use]
    pub fn find_best_search_spot(
        &self,
        agent: AgentId,
        query: &SearchSpotQuery,
        agents: &dyn AgentDirectory,
    ) -> Option<usize> {
        let agent_position = valid_position(agents, agent)?;
        let current_target = self.current_target_position(agents);

        let mut best: Option<(usize, Fixed)> = None;
        for (index, spot) in self.spots.iter().enumerate() {
            if spot.status() != SearchSpotStatus::NotSearchedYet {
                continue;
            }
            let Some(score) = self.score(spot, agent_position, query, current_target) else {
                continue;
            };
            // Strict comparison: the first spot wins a tie
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        if let Some((index, _)) = best {
            return Some(index);
        }

        let mut oldest: Option<(usize, Fixed)> = None;
        for (index, spot) in self.spots.iter().enumerate() {
            if matches!(
                spot.status(),
                SearchSpotStatus::Unreachable | SearchSpotStatus::BeingSearchedRightAboutNow
            ) {
                continue;
            }
            if agent_position.distance(spot.position()) < query.min_distance_from_agent {
                continue;
            }
            if oldest.map_or(true, |(_, time)| spot.last_observed() < time) {
                oldest = Some((index, spot.last_observed()));
            }
        }

        oldest.map(|(index, _)| index)
    }

    /// Score of `spot` for `agent`, or [`REJECT_SCORE`] when the agent is
    /// invalid or closer to the spot than `query.min_distance_from_agent`.
    #[must_use]
    pub fn calculate_score(
        &self,
        spot: &SearchSpot,
        agent: AgentId,
        query: &SearchSpotQuery,
        current_target: Option<Vec3Fixed>,
        agents: &dyn AgentDirectory,
    ) -> Fixed {
        valid_position(agents, agent)
            .and_then(|agent_position| self.score(spot, agent_position, query, current_target))
            .unwrap_or(REJECT_SCORE)
    }

    fn score(
        &self,
        spot: &SearchSpot,
        agent_position: Vec3Fixed,
        query: &SearchSpotQuery,
        current_target: Option<Vec3Fixed>,
    ) -> Option<Fixed> {
        let position = spot.position();
        weighted_score(
            SpotDistances {
                to_agent: agent_position.distance(position),
                to_target: self.target_position.distance(position),
                to_current_target: current_target.map(|target| target.distance(position)),
            },
            query,
        )
    }

    /// Live position of the hunted entity, when the group knows who it is
    /// and the entity still exists.
    #[must_use]
    pub fn current_target_position(&self, agents: &dyn AgentDirectory) -> Option<Vec3Fixed> {
        if self.target_entity.is_none() {
            return None;
        }
        valid_position(agents, self.target_entity)
    }

    /// Mark the spot held by `agent` as unreachable. No-op if it holds none.
    pub fn mark_assigned_search_spot_as_unreachable(&mut self, agent: AgentId) {
        if let Some(index) = self.assignments.remove(&agent) {
            self.spots[index].mark_as_unreachable();
            debug!(group = %self.id, agent = %agent, spot = index, "Search spot unreachable");
        }
    }

    /// Record that `agent` entered the group.
    pub fn add_entered_entity(&mut self, agent: AgentId) {
        self.entered.insert(agent);
    }

    /// Record that `agent` left the group.
    pub fn remove_entered_entity(&mut self, agent: AgentId) {
        self.entered.remove(&agent);
    }

    /// True once every entered member has left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
    }

    /// Release every vision registration and drop all spots.
    pub fn destroy(&mut self, vision: &mut dyn VisionMap) {
        for actor in self.actors.drain(..) {
            vision.unregister_observer(actor.observer);
        }
        for spot in &mut self.spots {
            spot.release(vision);
        }
        self.spots.clear();
        self.assignments.clear();

        info!(group = %self.id, "Search group destroyed");
    }

    /// Persistable copy of the group.
    #[must_use]
    pub fn snapshot(&self) -> SearchGroupSnapshot {
        SearchGroupSnapshot {
            id: self.id,
            target_position: self.target_position,
            target_entity: self.target_entity,
            spot_timeout: self.spot_timeout,
            entered: self.entered.iter().copied().collect(),
            spots: self.spots.iter().map(SearchSpotSnapshot::from).collect(),
        }
    }

    /// Rebuild a group from a snapshot.
    ///
    /// Spots keep their persisted state; observers and observables are
    /// registered afresh. Spots are not regenerated.
    ///
    /// A claim survives only if the spot is `BeingSearchedRightAboutNow`,
    /// the assignee is a valid member of this group, and no earlier spot is
    /// claimed by the same agent. Any other claim data is dropped and a
    /// claimed spot without a surviving claim goes back to `NotSearchedYet`.
    #[must_use]
    pub fn restore(snapshot: &SearchGroupSnapshot, services: &mut SearchServices<'_>) -> Self {
        let mut group = Self::new(
            snapshot.id,
            snapshot.target_position,
            snapshot.target_entity,
            snapshot.spot_timeout,
        );
        group.register_actors(services);
        group.entered = snapshot.entered.iter().copied().collect();

        for (index, persisted) in snapshot.spots.iter().enumerate() {
            let mut spot = SearchSpot::from(persisted);
            spot.init(persisted.position, persisted.is_target_spot, services.vision);

            let claimed = spot.status() == SearchSpotStatus::BeingSearchedRightAboutNow;
            match spot.assignee() {
                Some(agent)
                    if claimed
                        && group.is_member(agent, services.agents)
                        && !group.assignments.contains_key(&agent) =>
                {
                    group.assignments.insert(agent, index);
                }
                None if !claimed => {}
                assignee => {
                    warn!(
                        group = %group.id,
                        spot = index,
                        status = ?spot.status(),
                        ?assignee,
                        "Dropping inconsistent claim from snapshot"
                    );
                    spot.release_assignment();
                }
            }
            group.spots.push(spot);
        }

        group
    }

    fn is_member(&self, agent: AgentId, agents: &dyn AgentDirectory) -> bool {
        agents.is_valid(agent) && agents.group_of(agent) == Some(self.id)
    }

    /// Check the assignment invariants: an assignee exists exactly on
    /// claimed spots, no agent holds two spots, and the side map agrees.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        let mut seen = BTreeSet::new();
        for (index, spot) in self.spots.iter().enumerate() {
            let claimed = spot.status() == SearchSpotStatus::BeingSearchedRightAboutNow;
            match spot.assignee() {
                Some(agent) => {
                    if !claimed
                        || !seen.insert(agent)
                        || self.assignments.get(&agent) != Some(&index)
                    {
                        return false;
                    }
                }
                None if claimed => return false,
                None => {}
            }
        }
        seen.len() == self.assignments.len()
    }

    /// Group identifier.
    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.id
    }

    /// Last known target position the search is centred on.
    #[must_use]
    pub const fn target_position(&self) -> Vec3Fixed {
        self.target_position
    }

    /// Entity being hunted (`AgentId::NONE` if unknown).
    #[must_use]
    pub const fn target_entity(&self) -> AgentId {
        self.target_entity
    }

    /// Seconds a confirmed spot stays searched.
    #[must_use]
    pub const fn spot_timeout(&self) -> Fixed {
        self.spot_timeout
    }

    /// Seconds since the group was created.
    #[must_use]
    pub const fn clock(&self) -> Fixed {
        self.clock
    }

    /// Sensors taking part in the search.
    #[must_use]
    pub fn actors(&self) -> &[SearchActor] {
        &self.actors
    }

    /// Candidate spots, in assignment scan order.
    #[must_use]
    pub fn spots(&self) -> &[SearchSpot] {
        &self.spots
    }

    /// Members that entered the group.
    pub fn entered(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.entered.iter().copied()
    }

    /// The spot `agent` currently holds.
    #[must_use]
    pub fn assigned_spot(&self, agent: AgentId) -> Option<&SearchSpot> {
        self.assignments.get(&agent).map(|&index| &self.spots[index])
    }

    /// Number of spots in each state.
    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for spot in &self.spots {
            match spot.status() {
                SearchSpotStatus::NotSearchedYet => counts.not_searched += 1,
                SearchSpotStatus::BeingSearchedRightAboutNow => counts.being_searched += 1,
                SearchSpotStatus::Searched => counts.searched += 1,
                SearchSpotStatus::SearchedTimingOut => counts.timing_out += 1,
                SearchSpotStatus::Unreachable => counts.unreachable += 1,
            }
        }
        counts
    }
}

/// Persistable form of a [`SearchGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchGroupSnapshot {
    /// Group identifier.
    pub id: GroupId,
    /// Last known target position.
    pub target_position: Vec3Fixed,
    /// Hunted entity.
    pub target_entity: AgentId,
    /// Seconds a confirmed spot stays searched.
    #[serde(with = "fixed_serde")]
    pub spot_timeout: Fixed,
    /// Entered members.
    pub entered: Vec<AgentId>,
    /// Spot scalars, in spot order.
    pub spots: Vec<SearchSpotSnapshot>,
}

/// Position of `agent` if the directory considers it valid.
fn valid_position(agents: &dyn AgentDirectory, agent: AgentId) -> Option<Vec3Fixed> {
    if !agents.is_valid(agent) {
        return None;
    }
    agents.position(agent)
}

/// Current sensor pose of `agent`.
fn observer_params(agents: &dyn AgentDirectory, agent: AgentId) -> Option<ObserverParams> {
    let eye_position = agents.eye_position(agent)?;
    let view_direction = agents
        .view_direction(agent)
        .unwrap_or(Vec3Fixed::FORWARD)
        .normalize();
    let perception = agents.perception(agent).unwrap_or_default();

    Some(ObserverParams {
        eye_position,
        view_direction,
        fov_degrees: perception.fov_degrees,
        sight_range: perception.sight_range,
        type_mask: VisionTypeMask::SEARCH_SPOT,
        faction: perception.faction,
    })
}

/// Keep candidates in order, dropping any closer than `min_separation` to
/// one already kept, up to `max_spots`.
#[must_use]
pub fn select_spot_positions(
    candidates: &[Vec3Fixed],
    min_separation: Fixed,
    max_spots: usize,
) -> Vec<Vec3Fixed> {
    let min_separation_sq = min_separation.saturating_mul(min_separation);
    let mut kept: Vec<Vec3Fixed> = Vec::with_capacity(candidates.len().min(max_spots));

    for &candidate in candidates {
        if kept.len() >= max_spots {
            break;
        }
        let too_close = kept
            .iter()
            .any(|&other| other.distance_squared(candidate) < min_separation_sq);
        if !too_close {
            kept.push(candidate);
        }
    }

    kept
}
