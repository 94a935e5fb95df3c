//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a search produces identical
//! assignments and spot states given identical inputs.
//!
//! # Testing Strategy
//!
//! Search results feed lockstep gameplay, so two clients must agree on
//! which agent goes where. Sources of non-determinism include:
//!
//! - **Floating-point math**: scores and distances use
//!   [`search_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: groups, assignments and entered members
//!   live in `BTreeMap`/`BTreeSet`, and spots keep their generation order.
//!
//! - **Tie-breaking**: equal scores go to the first spot in scan order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use search_core::coordinator::SearchCoordinator;
use search_core::ids::{AgentId, GroupId};
use search_core::math::Fixed;

use crate::fixtures::query;
use crate::world::TestWorld;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Search is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a stateful process multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of ticks per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance state by one tick
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// A running search plus the world it runs in.
#[derive(Debug, Clone)]
pub struct SearchRun {
    /// Collaborators.
    pub world: TestWorld,
    /// The search under test.
    pub coordinator: SearchCoordinator,
    /// Seconds per tick.
    pub dt: Fixed,
}

impl SearchRun {
    /// Wrap an already set-up coordinator.
    #[must_use]
    pub fn new(world: TestWorld, coordinator: SearchCoordinator) -> Self {
        Self {
            world,
            coordinator,
            dt: Fixed::ONE / Fixed::from_num(10),
        }
    }

    /// One scripted tick.
    ///
    /// Every entered agent without a spot asks for one and teleports onto
    /// it; every actor then sees the spots it stands on; finally the
    /// coordinator updates.
    pub fn step(&mut self) {
        let members: Vec<(GroupId, AgentId)> = self
            .coordinator
            .groups()
            .flat_map(|group| group.entered().map(move |agent| (group.id(), agent)))
            .collect();

        for (group_id, agent) in members {
            let holds_spot = self
                .coordinator
                .group(group_id)
                .is_some_and(|group| group.assigned_spot(agent).is_some());
            if holds_spot {
                continue;
            }

            let mut request = query(1, 1, 0, 1);
            if self
                .coordinator
                .get_next_search_point(agent, &mut request, &self.world.agents)
            {
                self.world.agents.set_position(agent, request.result);
            }
        }

        self.world.vision.hide_all();
        for group in self.coordinator.groups() {
            for actor in group.actors() {
                let Some(standing_at) = self.world.agents.get(actor.agent).map(|a| a.position)
                else {
                    continue;
                };
                for spot in group.spots() {
                    if let (true, Some(observable)) =
                        (spot.position() == standing_at, spot.observable())
                    {
                        self.world.vision.reveal(actor.observer, observable);
                    }
                }
            }
        }

        self.coordinator.update(self.dt, &mut self.world.services());
    }

    /// Hash of the persisted search state plus every signal sent so far.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let snapshot = self.coordinator.snapshot();
        let bytes = snapshot.to_bytes().unwrap_or_default();
        compute_hash(&(bytes, &self.world.signals.sent))
    }
}

/// Run a scripted search twice and compare final hashes.
pub fn verify_search_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> SearchRun,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        SearchRun::step,
        SearchRun::state_hash,
    )
    .is_deterministic
}

/// Step two runs side by side and report the first tick where they differ.
///
/// `None` if the runs agree for `num_ticks` ticks.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> SearchRun,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.step();
        second.step();

        if first.state_hash() != second.state_hash() {
            tracing::warn!(tick, "Search runs diverged");
            return Some(tick);
        }
    }

    None
}

/// Proptest strategies for search testing.
pub mod strategies {
    use proptest::prelude::*;
    use search_core::ids::AgentId;
    use search_core::math::{Fixed, Vec3Fixed};
    use search_core::scoring::SearchSpotQuery;

    /// Fixed-point coordinate within a 200 unit square around the origin.
    pub fn arb_coordinate() -> impl Strategy<Value = Fixed> {
        (-100i32..100i32).prop_map(Fixed::from_num)
    }

    /// Ground-level position.
    pub fn arb_position() -> impl Strategy<Value = Vec3Fixed> {
        (arb_coordinate(), arb_coordinate()).prop_map(|(x, y)| Vec3Fixed::new(x, y, Fixed::ZERO))
    }

    /// Cover samples returned by a sampler.
    pub fn arb_cover_points(max_len: usize) -> impl Strategy<Value = Vec<Vec3Fixed>> {
        proptest::collection::vec(arb_position(), 0..max_len)
    }

    /// Query with weights in 0..=3 and a minimum distance in 0..10.
    pub fn arb_query() -> impl Strategy<Value = SearchSpotQuery> {
        (0i32..=3, 0i32..=3, 0i32..=3, 0i32..10).prop_map(|(a, t, c, min)| {
            SearchSpotQuery::new(
                (Fixed::from_num(a), Fixed::from_num(t), Fixed::from_num(c)),
                Fixed::from_num(min),
            )
        })
    }

    /// What an agent does in one step of a random request sequence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum AgentAction {
        /// Ask for the next spot.
        Request(AgentId),
        /// Give up on the current spot.
        Unreachable(AgentId),
        /// Tick the search; the payload says which spot index (modulo the
        /// spot count) becomes visible to the first actor.
        Tick(usize),
    }

    /// Random action sequence over agents `1..=agent_count`.
    pub fn arb_actions(
        agent_count: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<AgentAction>> {
        let agent = (1..=agent_count).prop_map(AgentId);
        let action = prop_oneof![
            4 => agent.clone().prop_map(AgentAction::Request),
            1 => agent.prop_map(AgentAction::Unreachable),
            2 => (0usize..64).prop_map(AgentAction::Tick),
        ];
        proptest::collection::vec(action, 0..max_len)
    }
}
