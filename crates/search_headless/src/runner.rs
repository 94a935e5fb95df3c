//! Tick loop for scenario runs.
//!
//! Each tick the runner plays the squad's behaviour: members without a
//! destination ask the search for their next spot, everyone walks towards
//! their spot, then the search updates. A signal about an agent's spot
//! clears its destination so it asks again on the next tick. Agents sent
//! to a blocked spot report it unreachable instead of walking.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use tracing::{debug, info, warn};

use search_core::context::LevelContext;
use search_core::ids::{AgentId, GroupId};
use search_core::math::{Fixed, Vec3Fixed};
use search_core::spot::SearchSpotStatus;

use crate::metrics::{Assignment, RunReport, TickMetrics};
use crate::sandbox::Sandbox;
use crate::scenario::{Scenario, ScenarioError, QUARRY_ID};

/// Drives one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    scenario: Scenario,
    sandbox: Sandbox,
    level: LevelContext,
    group: GroupId,
    squad: Vec<AgentId>,
    destinations: BTreeMap<AgentId, Vec3Fixed>,
    /// Indices of spots confirmed at least once.
    confirmed: BTreeSet<usize>,
    tick: u64,
    report: RunReport,
}

impl ScenarioRunner {
    /// Set up the world and start the squad's search.
    pub fn new(scenario: Scenario) -> Result<Self, ScenarioError> {
        scenario.validate()?;

        let mut sandbox = Sandbox::from_scenario(&scenario);
        let mut level = LevelContext::load(scenario.search);
        let group = GroupId(scenario.group);
        let target = if scenario.quarry.is_some() {
            AgentId(QUARRY_ID)
        } else {
            AgentId::NONE
        };

        level.search_mut().group_enter(
            group,
            scenario.last_known_position(),
            target,
            scenario.search.default_spot_timeout,
            &mut sandbox.services(),
        );

        let squad: Vec<AgentId> = scenario.squad.iter().map(|m| AgentId(m.id)).collect();
        for &agent in &squad {
            level.entity_enter(agent, &mut sandbox.services());
        }

        let mut report = RunReport::new(scenario.name.clone());
        report.spots = level
            .search()
            .group(group)
            .map_or(0, |g| g.spots().len());

        info!(
            scenario = %scenario.name,
            spots = report.spots,
            squad = squad.len(),
            "Scenario started"
        );

        Ok(Self {
            scenario,
            sandbox,
            level,
            group,
            squad,
            destinations: BTreeMap::new(),
            confirmed: BTreeSet::new(),
            tick: 0,
            report,
        })
    }

    /// Advance one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.sandbox.signals.tick = self.tick;
        let dt = self.scenario.tick_seconds;

        self.request_spots();
        self.walk(dt.saturating_mul(Fixed::from_num(self.scenario.move_speed)));

        let signals_before = self.sandbox.signals.events.len();
        self.level.update(dt, &mut self.sandbox.services());

        for event in &self.sandbox.signals.events[signals_before..] {
            self.destinations.remove(&AgentId(event.agent));
        }

        self.track_clearance();
        let metrics = self.tick_metrics();
        self.report.record_tick(metrics);
    }

    /// Note the first tick by which every reachable spot has been seen.
    fn track_clearance(&mut self) {
        if self.report.cleared_at.is_some() {
            return;
        }
        let Some(group) = self.level.search().group(self.group) else {
            return;
        };

        let mut open = 0;
        for (index, spot) in group.spots().iter().enumerate() {
            match spot.status() {
                SearchSpotStatus::Searched | SearchSpotStatus::SearchedTimingOut => {
                    self.confirmed.insert(index);
                }
                SearchSpotStatus::Unreachable => continue,
                _ => {}
            }
            if !self.confirmed.contains(&index) {
                open += 1;
            }
        }

        if open == 0 {
            info!(tick = self.tick, "Every reachable spot has been seen");
            self.report.cleared_at = Some(self.tick);
        }
    }

    fn request_spots(&mut self) {
        for &agent in &self.squad {
            if self.destinations.contains_key(&agent) {
                continue;
            }

            let mut query = self.scenario.query.to_query();
            if !self
                .level
                .search_mut()
                .get_next_search_point(agent, &mut query, &self.sandbox.agents)
            {
                continue;
            }

            if self.scenario.is_blocked(query.result) {
                debug!(tick = self.tick, %agent, "Spot is blocked");
                self.level
                    .search_mut()
                    .mark_assigned_search_spot_as_unreachable(agent, &self.sandbox.agents);
                self.report.unreachable_reported += 1;
                continue;
            }

            self.destinations.insert(agent, query.result);
        }
    }

    fn walk(&mut self, step: Fixed) {
        for (&agent, &destination) in &self.destinations {
            self.sandbox.agents.walk_towards(agent, destination, step);
        }
    }

    fn tick_metrics(&self) -> TickMetrics {
        let Some(group) = self.level.search().group(self.group) else {
            return TickMetrics {
                tick: self.tick,
                counts: Default::default(),
                assignments: Vec::new(),
            };
        };

        let assignments = self
            .squad
            .iter()
            .filter_map(|&agent| {
                group
                    .assigned_spot(agent)
                    .map(|spot| Assignment::new(agent.0, spot.position()))
            })
            .collect();

        TickMetrics {
            tick: self.tick,
            counts: group.status_counts(),
            assignments,
        }
    }

    /// Hash of the persisted search state plus the signal log.
    pub fn state_hash(&self) -> Result<u64, ScenarioError> {
        let bytes = self.level.save()?;
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        self.sandbox.signals.events.hash(&mut hasher);
        Ok(hasher.finish())
    }

    /// Run every tick, let the squad leave, and return the report.
    pub fn run(mut self) -> Result<RunReport, ScenarioError> {
        for _ in 0..self.scenario.ticks {
            self.step();
        }
        self.finish()
    }

    fn finish(mut self) -> Result<RunReport, ScenarioError> {
        self.report.final_state_hash = self.state_hash()?;

        if self.scenario.leave_at_end {
            for &agent in &self.squad {
                self.level.entity_leave(agent, &mut self.sandbox.services());
            }
            self.report.leaked_observables = self.sandbox.vision.observable_count();
            self.report.leaked_observers = self.sandbox.vision.observer_count();
            if !self.report.is_clean() {
                warn!(
                    observables = self.report.leaked_observables,
                    observers = self.report.leaked_observers,
                    "Search left registrations behind"
                );
            }
        }

        self.report.signals = std::mem::take(&mut self.sandbox.signals.events);
        info!(
            scenario = %self.report.scenario,
            ticks = self.report.ticks,
            signals = self.report.signals.len(),
            "Scenario finished"
        );
        Ok(self.report)
    }

    /// The search state, for inspection.
    #[must_use]
    pub fn level(&self) -> &LevelContext {
        &self.level
    }

    /// The world, for inspection.
    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }
}

/// Run `scenario` once.
pub fn run_scenario(scenario: Scenario) -> Result<RunReport, ScenarioError> {
    ScenarioRunner::new(scenario)?.run()
}

/// Run `scenario` `runs` times and check that every run ends in the same
/// state.
pub fn verify_determinism(scenario: &Scenario, runs: u32) -> Result<bool, ScenarioError> {
    let mut first: Option<u64> = None;

    for run in 0..runs {
        let hash = run_scenario(scenario.clone())?.final_state_hash;
        match first {
            None => first = Some(hash),
            Some(expected) if expected != hash => {
                warn!(run, expected, actual = hash, "Run diverged");
                return Ok(false);
            }
            Some(_) => {}
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AgentSetup, CoverSurface};
    use search_core::spot::SearchSpotStatus;

    fn short_sighted(id: u64, x: i32, y: i32) -> AgentSetup {
        AgentSetup {
            sight_range: 3,
            ..AgentSetup::new(id, x, y)
        }
    }

    fn corridor() -> Scenario {
        Scenario {
            name: "Corridor".to_string(),
            ticks: 200,
            quarry: None,
            squad: vec![short_sighted(1, -10, 0), short_sighted(2, -10, 2)],
            cover: vec![CoverSurface::new(&[(5, 0), (10, 0), (15, 0)])],
            blocked: vec![],
            ..Scenario::courtyard()
        }
    }

    #[test]
    fn test_new_starts_search() {
        let runner = ScenarioRunner::new(corridor()).unwrap();
        let group = runner.level().search().group(GroupId(1)).unwrap();
        assert_eq!(group.spots().len(), 4);
        assert_eq!(group.entered().count(), 2);
        assert_eq!(runner.sandbox().vision.observer_count(), 2);
    }

    #[test]
    fn test_first_step_assigns_everyone() {
        let mut runner = ScenarioRunner::new(corridor()).unwrap();
        runner.step();

        let tick = &runner.report.timeline[0];
        assert_eq!(tick.tick, 1);
        assert_eq!(tick.assignments.len(), 2);
        assert_ne!(tick.assignments[0].spot, tick.assignments[1].spot);
    }

    #[test]
    fn test_blocked_spot_is_reported_unreachable() {
        let mut scenario = corridor();
        scenario.blocked = vec![(0, 0)];
        scenario.query.target = 5;
        let mut runner = ScenarioRunner::new(scenario).unwrap();
        runner.step();

        let group = runner.level().search().group(GroupId(1)).unwrap();
        let target_spot = group.spots().iter().find(|s| s.is_target_spot()).unwrap();
        assert_eq!(target_spot.status(), SearchSpotStatus::Unreachable);
        assert_eq!(runner.report.unreachable_reported, 1);
    }

    #[test]
    fn test_run_clears_corridor_and_cleans_up() {
        let report = run_scenario(corridor()).unwrap();

        assert_eq!(report.ticks, 200);
        assert!(report.cleared_at.is_some());
        assert!(!report.signals.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_runs_are_deterministic() {
        assert!(verify_determinism(&corridor(), 3).unwrap());
    }

    #[test]
    fn test_invalid_scenario_is_rejected() {
        let scenario = Scenario {
            squad: vec![],
            ..corridor()
        };
        assert!(matches!(
            ScenarioRunner::new(scenario),
            Err(ScenarioError::Invalid(_))
        ));
    }
}
