//! Scriptable in-memory collaborators.
//!
//! [`TestWorld`] bundles an agent roster, a vision map whose visibility is
//! set by hand, a cover sampler returning preset points and a signal log.
//! Tests move agents and flip visibility directly, then inspect what the
//! search subsystem registered and sent.

use std::collections::{BTreeMap, BTreeSet};

use search_core::ids::{AgentId, GroupId, VisionId};
use search_core::math::Vec3Fixed;
use search_core::services::{
    AgentDirectory, CoverQuery, CoverSampler, ObservableParams, ObserverChange, ObserverParams,
    Perception, SearchServices, SearchSignal, SignalSink, VisionMap,
};

/// One agent in the fake roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeAgent {
    /// World position.
    pub position: Vec3Fixed,
    /// View direction.
    pub view_direction: Vec3Fixed,
    /// Tactical group, if any.
    pub group: Option<GroupId>,
    /// Whether the agent counts as valid.
    pub valid: bool,
    /// Sensor settings.
    pub perception: Perception,
}

/// Agent roster keyed by id.
#[derive(Debug, Clone, Default)]
pub struct FakeAgents {
    agents: BTreeMap<AgentId, FakeAgent>,
}

impl FakeAgents {
    /// Add (or replace) a valid agent.
    pub fn add(&mut self, id: AgentId, position: Vec3Fixed, group: Option<GroupId>) {
        self.agents.insert(
            id,
            FakeAgent {
                position,
                view_direction: Vec3Fixed::FORWARD,
                group,
                valid: true,
                perception: Perception::default(),
            },
        );
    }

    /// Move an agent.
    pub fn set_position(&mut self, id: AgentId, position: Vec3Fixed) {
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.position = position;
        }
    }

    /// Mark an agent valid or invalid.
    pub fn set_valid(&mut self, id: AgentId, valid: bool) {
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.valid = valid;
        }
    }

    /// Change an agent's group.
    pub fn set_group(&mut self, id: AgentId, group: Option<GroupId>) {
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.group = group;
        }
    }

    /// Look up an agent.
    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&FakeAgent> {
        self.agents.get(&id)
    }
}

impl AgentDirectory for FakeAgents {
    fn is_valid(&self, agent: AgentId) -> bool {
        self.agents.get(&agent).is_some_and(|a| a.valid)
    }

    fn position(&self, agent: AgentId) -> Option<Vec3Fixed> {
        self.agents.get(&agent).map(|a| a.position)
    }

    fn view_direction(&self, agent: AgentId) -> Option<Vec3Fixed> {
        self.agents.get(&agent).map(|a| a.view_direction)
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

/// Vision map whose visibility answers are set explicitly.
#[derive(Debug, Clone, Default)]
pub struct FakeVisionMap {
    next_id: u32,
    observables: BTreeMap<VisionId, ObservableParams>,
    observers: BTreeMap<VisionId, ObserverParams>,
    visible: BTreeSet<(VisionId, VisionId)>,
    /// Number of `observer_moved` calls received.
    pub moves: usize,
}

impl FakeVisionMap {
    /// Make `observer` see `observable` until hidden again.
    pub fn reveal(&mut self, observer: VisionId, observable: VisionId) {
        self.visible.insert((observer, observable));
    }

    /// Undo [`reveal`](Self::reveal).
    pub fn hide(&mut self, observer: VisionId, observable: VisionId) {
        self.visible.remove(&(observer, observable));
    }

    /// Hide everything.
    pub fn hide_all(&mut self) {
        self.visible.clear();
    }

    /// Currently registered observables.
    #[must_use]
    pub fn observable_count(&self) -> usize {
        self.observables.len()
    }

    /// Currently registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Registration data of an observable.
    #[must_use]
    pub fn observable(&self, id: VisionId) -> Option<&ObservableParams> {
        self.observables.get(&id)
    }

    /// Latest pose of an observer.
    #[must_use]
    pub fn observer(&self, id: VisionId) -> Option<&ObserverParams> {
        self.observers.get(&id)
    }
}

impl VisionMap for FakeVisionMap {
    fn create_vision_id(&mut self, _name: &str) -> VisionId {
        self.next_id += 1;
        VisionId(self.next_id)
    }

    fn register_observable(&mut self, id: VisionId, params: ObservableParams) {
        let previous = self.observables.insert(id, params);
        assert!(previous.is_none(), "observable {id} registered twice");
    }

    fn unregister_observable(&mut self, id: VisionId) {
        let removed = self.observables.remove(&id);
        assert!(removed.is_some(), "observable {id} was not registered");
        self.visible.retain(|&(_, observable)| observable != id);
    }

    fn register_observer(&mut self, id: VisionId, params: ObserverParams) {
        let previous = self.observers.insert(id, params);
        assert!(previous.is_none(), "observer {id} registered twice");
    }

    fn unregister_observer(&mut self, id: VisionId) {
        let removed = self.observers.remove(&id);
        assert!(removed.is_some(), "observer {id} was not registered");
        self.visible.retain(|&(observer, _)| observer != id);
    }

    fn observer_moved(&mut self, id: VisionId, params: ObserverParams, _changed: ObserverChange) {
        if let Some(observer) = self.observers.get_mut(&id) {
            *observer = params;
        }
        self.moves += 1;
    }

    fn is_visible(&self, observer: VisionId, observable: VisionId) -> bool {
        self.observers.contains_key(&observer)
            && self.observables.contains_key(&observable)
            && self.visible.contains(&(observer, observable))
    }
}

/// Cover sampler returning a preset list of points.
#[derive(Debug, Clone, Default)]
pub struct PresetCover {
    /// Points returned by every query, truncated to `max_results`.
    pub points: Vec<Vec3Fixed>,
}

impl PresetCover {
    /// Sampler returning `points`.
    #[must_use]
    pub fn new(points: Vec<Vec3Fixed>) -> Self {
        Self { points }
    }
}

impl CoverSampler for PresetCover {
    fn sample_cover(&self, query: &CoverQuery<'_>) -> Vec<Vec3Fixed> {
        self.points.iter().copied().take(query.max_results).collect()
    }
}

/// Records every signal sent.
#[derive(Debug, Clone, Default)]
pub struct SignalLog {
    /// Signals in send order.
    pub sent: Vec<(AgentId, SearchSignal)>,
}

impl SignalLog {
    /// Signals received by one agent.
    #[must_use]
    pub fn for_agent(&self, agent: AgentId) -> Vec<SearchSignal> {
        self.sent
            .iter()
            .filter(|(to, _)| *to == agent)
            .map(|(_, signal)| *signal)
            .collect()
    }
}

impl SignalSink for SignalLog {
    fn send(&mut self, agent: AgentId, signal: SearchSignal) {
        self.sent.push((agent, signal));
    }
}

/// All four collaborators in one place.
#[derive(Debug, Clone, Default)]
pub struct TestWorld {
    /// Agent roster.
    pub agents: FakeAgents,
    /// Vision map.
    pub vision: FakeVisionMap,
    /// Cover sampler.
    pub cover: PresetCover,
    /// Signal log.
    pub signals: SignalLog,
}

impl TestWorld {
    /// World whose cover sampler returns `points`.
    #[must_use]
    pub fn with_cover(points: Vec<Vec3Fixed>) -> Self {
        Self {
            cover: PresetCover::new(points),
            ..Self::default()
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
