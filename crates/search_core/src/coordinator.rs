//! Entry point used by the rest of the game.
//!
//! The coordinator owns every active [`SearchGroup`], keyed by group id.
//! Groups are created when a group loses contact with its target
//! ([`group_enter`](SearchCoordinator::group_enter)) and destroyed either
//! explicitly or when the last entered member leaves.
//!
//! # Example
//!
//! ```ignore
//! let mut coordinator = SearchCoordinator::new(SearchConfig::default());
//! coordinator.group_enter(group, last_seen, target, Fixed::from_num(30), &mut services);
//! coordinator.entity_enter(agent, services.agents);
//!
//! let mut query = SearchSpotQuery::new((one, one, zero), one);
//! if coordinator.get_next_search_point(agent, &mut query, services.agents) {
//!     move_to(agent, query.result);
//! }
//! coordinator.update(dt, &mut services);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::group::{SearchGroup, SearchGroupSnapshot};
use crate::ids::{AgentId, GroupId};
use crate::math::{Fixed, Vec3Fixed};
use crate::scoring::SearchSpotQuery;
use crate::services::{AgentDirectory, SearchServices, VisionMap};

/// Snapshot format version for compatibility.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Owns all search groups of a level.
#[derive(Debug, Clone, Default)]
pub struct SearchCoordinator {
    config: SearchConfig,
    groups: BTreeMap<GroupId, SearchGroup>,
}

impl SearchCoordinator {
    /// Create a coordinator with no groups.
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            groups: BTreeMap::new(),
        }
    }

    /// Spot generation settings used for new groups.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Start a search for `id`. An existing search for the same group is
    /// torn down first.
    pub fn group_enter(
        &mut self,
        id: GroupId,
        target_position: Vec3Fixed,
        target_entity: AgentId,
        spot_timeout: Fixed,
        services: &mut SearchServices<'_>,
    ) {
        if self.groups.contains_key(&id) {
            self.group_leave(id, services.vision);
        }

        let mut group = SearchGroup::new(id, target_position, target_entity, spot_timeout);
        group.init(&self.config, services);
        self.groups.insert(id, group);
    }

    /// End the search for `id` and release its vision registrations.
    pub fn group_leave(&mut self, id: GroupId, vision: &mut dyn VisionMap) {
        match self.groups.remove(&id) {
            Some(mut group) => group.destroy(vision),
            None => warn!(group = %id, "Leave for unknown search group"),
        }
    }

    /// Record that `agent` joined its group's search.
    pub fn entity_enter(&mut self, agent: AgentId, agents: &dyn AgentDirectory) {
        if let Some(group) = agents
            .group_of(agent)
            .and_then(|id| self.groups.get_mut(&id))
        {
            group.add_entered_entity(agent);
        }
    }

    /// Record that `agent` left its group's search. The group is destroyed
    /// once nobody is left in it.
    ///
    /// If the directory no longer knows the agent's group, the group the
    /// agent entered is used instead.
    pub fn entity_leave(&mut self, agent: AgentId, services: &mut SearchServices<'_>) {
        let id = services
            .agents
            .group_of(agent)
            .filter(|id| self.groups.contains_key(id))
            .or_else(|| self.group_entered_by(agent));

        let Some(id) = id else {
            return;
        };

        let now_empty = match self.groups.get_mut(&id) {
            Some(group) => {
                group.remove_entered_entity(agent);
                group.is_empty()
            }
            None => false,
        };

        if now_empty {
            info!(group = %id, "Last member left search group");
            self.group_leave(id, services.vision);
        }
    }

    fn group_entered_by(&self, agent: AgentId) -> Option<GroupId> {
        self.groups
            .values()
            .find(|group| group.entered().any(|member| member == agent))
            .map(SearchGroup::id)
    }

    /// Advance every group by `dt` seconds.
    pub fn update(&mut self, dt: Fixed, services: &mut SearchServices<'_>) {
        for group in self.groups.values_mut() {
            group.update(dt, services);
        }
    }

    /// Ask the agent's group for the agent's next spot. See
    /// [`SearchGroup::get_next_search_point`].
    pub fn get_next_search_point(
        &mut self,
        agent: AgentId,
        query: &mut SearchSpotQuery,
        agents: &dyn AgentDirectory,
    ) -> bool {
        agents
            .group_of(agent)
            .and_then(|id| self.groups.get_mut(&id))
            .map_or(false, |group| group.get_next_search_point(agent, query, agents))
    }

    /// Mark the agent's assigned spot as unreachable, if it has one.
    pub fn mark_assigned_search_spot_as_unreachable(
        &mut self,
        agent: AgentId,
        agents: &dyn AgentDirectory,
    ) {
        if let Some(group) = agents
            .group_of(agent)
            .and_then(|id| self.groups.get_mut(&id))
        {
            group.mark_assigned_search_spot_as_unreachable(agent);
        }
    }

    /// Whether a search is running for `id`.
    #[must_use]
    pub fn group_exists(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    /// The search for `id`, if running.
    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&SearchGroup> {
        self.groups.get(&id)
    }

    /// All running searches, ordered by group id.
    pub fn groups(&self) -> impl Iterator<Item = &SearchGroup> {
        self.groups.values()
    }

    /// Number of running searches.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Tear down every group.
    pub fn reset(&mut self, vision: &mut dyn VisionMap) {
        for (_, mut group) in std::mem::take(&mut self.groups) {
            group.destroy(vision);
        }
    }

    /// Persistable copy of all groups.
    #[must_use]
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            version: SNAPSHOT_VERSION,
            groups: self.groups.values().map(SearchGroup::snapshot).collect(),
        }
    }

    /// Replace all groups with the ones in `snapshot`, registering fresh
    /// vision handles for them.
    pub fn restore(
        &mut self,
        snapshot: &CoordinatorSnapshot,
        services: &mut SearchServices<'_>,
    ) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SearchError::SnapshotVersion {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for group in &snapshot.groups {
            if !seen.insert(group.id) {
                return Err(SearchError::DuplicateGroup(group.id));
            }
        }

        self.reset(services.vision);
        for persisted in &snapshot.groups {
            let group = SearchGroup::restore(persisted, services);
            #[cfg(feature = "debug-validation")]
            debug_assert!(group.invariants_hold(), "restored group invariants violated");
            self.groups.insert(persisted.id, group);
        }

        info!(groups = self.groups.len(), "Search groups restored");
        Ok(())
    }
}

/// Persistable state of a [`SearchCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    /// Snapshot format version.
    pub version: u32,
    /// One entry per running search.
    pub groups: Vec<SearchGroupSnapshot>,
}

impl CoordinatorSnapshot {
    /// Encode as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from bytes written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
