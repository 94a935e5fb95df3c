//! Stand-in game world for headless runs.
//!
//! Implements every collaborator the search needs with plain geometry: a
//! roster of point agents, view cones for vision, cover surfaces given as
//! sample points, and a signal log.

use std::collections::BTreeMap;

use search_core::ids::{AgentId, GroupId, VisionId};
use search_core::math::{fixed_cos_degrees, Fixed, Vec3Fixed};
use search_core::services::{
    AgentDirectory, CoverQuery, CoverSampler, ObservableParams, ObserverChange, ObserverParams,
    Perception, SearchServices, SearchSignal, SignalSink, VisionMap,
};

use crate::metrics::SignalEvent;
use crate::scenario::{to_world, Scenario, QUARRY_ID};

/// A point agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxAgent {
    /// Feet position.
    pub position: Vec3Fixed,
    /// Normalized facing.
    pub facing: Vec3Fixed,
    /// Tactical group.
    pub group: Option<GroupId>,
    /// Senses.
    pub perception: Perception,
}

/// Every agent in the sandbox, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SandboxAgents {
    agents: BTreeMap<AgentId, SandboxAgent>,
}

impl SandboxAgents {
    /// Insert or replace an agent.
    pub fn insert(&mut self, id: AgentId, agent: SandboxAgent) {
        self.agents.insert(id, agent);
    }

    /// Look up an agent.
    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&SandboxAgent> {
        self.agents.get(&id)
    }

    /// Step `id` towards `destination` by at most `step` units and face the
    /// direction of travel. Returns true once the agent stands on the
    /// destination.
    pub fn walk_towards(&mut self, id: AgentId, destination: Vec3Fixed, step: Fixed) -> bool {
        let Some(agent) = self.agents.get_mut(&id) else {
            return false;
        };

        let remaining = agent.position.distance(destination);
        if remaining <= step {
            agent.position = destination;
            return true;
        }

        let direction = (destination - agent.position).normalize();
        if direction != Vec3Fixed::ZERO {
            agent.facing = direction;
        }
        agent.position = agent.position + direction.scale(step);
        false
    }
}

impl AgentDirectory for SandboxAgents {
    fn is_valid(&self, agent: AgentId) -> bool {
        self.agents.contains_key(&agent)
    }

    fn position(&self, agent: AgentId) -> Option<Vec3Fixed> {
        self.agents.get(&agent).map(|a| a.position)
    }

    fn view_direction(&self, agent: AgentId) -> Option<Vec3Fixed> {
        self.agents.get(&agent).map(|a| a.facing)
    }

    fn group_of(&self, agent: AgentId) -> Option<GroupId> {
        self.agents.get(&agent).and_then(|a| a.group)
    }

    fn perception(&self, agent: AgentId) -> Option<Perception> {
        self.agents.get(&agent).map(|a| a.perception)
    }

    fn group_members(&self, group: GroupId) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|(_, a)| a.group == Some(group))
            .map(|(&id, _)| id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Observer {
    params: ObserverParams,
    /// Cosine of half the field of view, cached per pose.
    cos_half_fov: Fixed,
}

impl Observer {
    fn new(params: ObserverParams) -> Self {
        Self {
            params,
            cos_half_fov: fixed_cos_degrees(params.fov_degrees / Fixed::from_num(2)),
        }
    }

    fn sees(&self, observable: &ObservableParams) -> bool {
        if !self.params.type_mask.intersects(observable.type_mask) {
            return false;
        }

        let offset = observable.position - self.params.eye_position;
        let range_sq = self.params.sight_range.saturating_mul(self.params.sight_range);
        if offset.length_squared() > range_sq {
            return false;
        }
        if offset == Vec3Fixed::ZERO {
            return true;
        }

        self.params.view_direction.dot(offset.normalize()) >= self.cos_half_fov
    }
}

/// Vision by view cone: range check plus field-of-view check, no
/// occlusion.
#[derive(Debug, Clone, Default)]
pub struct ConeVision {
    next_id: u32,
    observables: BTreeMap<VisionId, ObservableParams>,
    observers: BTreeMap<VisionId, Observer>,
}

impl ConeVision {
    /// Number of registered observables.
    #[must_use]
    pub fn observable_count(&self) -> usize {
        self.observables.len()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl VisionMap for ConeVision {
    fn create_vision_id(&mut self, name: &str) -> VisionId {
        self.next_id += 1;
        tracing::trace!(id = self.next_id, name, "Vision id created");
        VisionId(self.next_id)
    }

    fn register_observable(&mut self, id: VisionId, params: ObservableParams) {
        self.observables.insert(id, params);
    }

    fn unregister_observable(&mut self, id: VisionId) {
        if self.observables.remove(&id).is_none() {
            tracing::warn!(%id, "Unregistering unknown observable");
        }
    }

    fn register_observer(&mut self, id: VisionId, params: ObserverParams) {
        self.observers.insert(id, Observer::new(params));
    }

    fn unregister_observer(&mut self, id: VisionId) {
        if self.observers.remove(&id).is_none() {
            tracing::warn!(%id, "Unregistering unknown observer");
        }
    }

    fn observer_moved(&mut self, id: VisionId, params: ObserverParams, changed: ObserverChange) {
        if let Some(observer) = self.observers.get_mut(&id) {
            if changed.contains(ObserverChange::PERCEPTION) {
                *observer = Observer::new(params);
            } else {
                observer.params = params;
            }
        }
    }

    fn is_visible(&self, observer: VisionId, observable: VisionId) -> bool {
        match (self.observers.get(&observer), self.observables.get(&observable)) {
            (Some(observer), Some(observable)) => observer.sees(observable),
            _ => false,
        }
    }
}

/// Cover given as surfaces of sample points.
///
/// A query returns, per surface, at most `max_per_surface` points inside the
/// radius, nearest to the centre first, then keeps the `max_results` nearest
/// overall. Eye positions are ignored: every sample counts as hidden.
#[derive(Debug, Clone, Default)]
pub struct SurfaceCover {
    surfaces: Vec<Vec<Vec3Fixed>>,
}

impl SurfaceCover {
    /// Cover made of the given surfaces.
    #[must_use]
    pub fn new(surfaces: Vec<Vec<Vec3Fixed>>) -> Self {
        Self { surfaces }
    }
}

impl CoverSampler for SurfaceCover {
    fn sample_cover(&self, query: &CoverQuery<'_>) -> Vec<Vec3Fixed> {
        let radius_sq = query.radius.saturating_mul(query.radius);
        let mut samples = Vec::new();

        for surface in &self.surfaces {
            let mut inside: Vec<Vec3Fixed> = surface
                .iter()
                .copied()
                .filter(|p| p.distance_squared(query.center) <= radius_sq)
                .collect();
            inside.sort_by_key(|p| p.distance_squared(query.center));
            samples.extend(inside.into_iter().take(query.max_per_surface));
        }

        samples.sort_by_key(|p| p.distance_squared(query.center));
        samples.truncate(query.max_results);
        samples
    }
}

/// Records signals with the tick they were sent on.
#[derive(Debug, Clone, Default)]
pub struct SignalRecorder {
    /// Tick stamped on new events.
    pub tick: u64,
    /// Everything sent so far.
    pub events: Vec<SignalEvent>,
}

impl SignalSink for SignalRecorder {
    fn send(&mut self, agent: AgentId, signal: SearchSignal) {
        tracing::debug!(tick = self.tick, %agent, signal = signal.name(), "Signal");
        self.events.push(SignalEvent {
            tick: self.tick,
            agent: agent.0,
            signal: signal.name().to_string(),
        });
    }
}

/// The whole stand-in world.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    /// Agents.
    pub agents: SandboxAgents,
    /// Vision.
    pub vision: ConeVision,
    /// Cover.
    pub cover: SurfaceCover,
    /// Signals.
    pub signals: SignalRecorder,
}

impl Sandbox {
    /// Build the world a scenario describes.
    #[must_use]
    pub fn from_scenario(scenario: &Scenario) -> Self {
        let group = GroupId(scenario.group);
        let mut agents = SandboxAgents::default();

        for member in &scenario.squad {
            let facing = to_world(member.facing).normalize();
            agents.insert(
                AgentId(member.id),
                SandboxAgent {
                    position: to_world(member.position),
                    facing: if facing == Vec3Fixed::ZERO {
                        Vec3Fixed::FORWARD
                    } else {
                        facing
                    },
                    group: Some(group),
                    perception: Perception {
                        fov_degrees: Fixed::from_num(member.fov_degrees),
                        sight_range: Fixed::from_num(member.sight_range),
                        faction: 0,
                    },
                },
            );
        }

        if let Some(quarry) = scenario.quarry {
            agents.insert(
                AgentId(QUARRY_ID),
                SandboxAgent {
                    position: to_world(quarry),
                    facing: Vec3Fixed::FORWARD,
                    group: None,
                    perception: Perception {
                        faction: 1,
                        ..Perception::default()
                    },
                },
            );
        }

        let surfaces = scenario
            .cover
            .iter()
            .map(|surface| surface.points.iter().copied().map(to_world).collect())
            .collect();

        Self {
            agents,
            vision: ConeVision::default(),
            cover: SurfaceCover::new(surfaces),
            signals: SignalRecorder::default(),
        }
    }

    /// Borrow the collaborators for one call.
    pub fn services(&mut self) -> SearchServices<'_> {
        SearchServices::new(
            &self.agents,
            &mut self.vision,
            &self.cover,
            &mut self.signals,
        )
    }
}
