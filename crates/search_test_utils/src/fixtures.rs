//! Test fixtures and helpers.
//!
//! Pre-built worlds and query shortcuts for consistent testing.

use fixed::types::I32F32;

use search_core::config::SearchConfig;
use search_core::coordinator::SearchCoordinator;
use search_core::ids::{AgentId, GroupId};
use search_core::math::Vec3Fixed;
use search_core::scoring::SearchSpotQuery;

use crate::world::TestWorld;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real search code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Ground-level position from integer coordinates.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec3Fixed {
    Vec3Fixed::from_ints(x, y, 0)
}

/// Query with integer weights (agent, target, live target) and minimum
/// distance.
#[must_use]
pub fn query(
    agent_weight: i32,
    target_weight: i32,
    current_weight: i32,
    min_distance: i32,
) -> SearchSpotQuery {
    SearchSpotQuery::new(
        (fixed(agent_weight), fixed(target_weight), fixed(current_weight)),
        fixed(min_distance),
    )
}

/// Group used by the canned scenarios.
pub const SQUAD: GroupId = GroupId(7);

/// First squad member.
pub const ALPHA: AgentId = AgentId(1);

/// Second squad member.
pub const BRAVO: AgentId = AgentId(2);

/// Third squad member.
pub const CHARLIE: AgentId = AgentId(3);

/// Entity being hunted.
pub const QUARRY: AgentId = AgentId(100);

/// A world with a three-agent squad standing at the origin and cover
/// points along +X at distance 2, 10 and 40.
///
/// The target's last known position is the origin.
#[must_use]
pub fn squad_world() -> TestWorld {
    let mut world = TestWorld::with_cover(vec![pos(2, 0), pos(10, 0), pos(40, 0)]);
    world.agents.add(ALPHA, pos(0, 0), Some(SQUAD));
    world.agents.add(BRAVO, pos(0, 0), Some(SQUAD));
    world.agents.add(CHARLIE, pos(0, 0), Some(SQUAD));
    world
}

/// A coordinator running a search for [`SQUAD`] in `world`, with every
/// squad member entered.
#[must_use]
pub fn searching_coordinator(world: &mut TestWorld, timeout_seconds: i32) -> SearchCoordinator {
    let mut coordinator = SearchCoordinator::new(SearchConfig::default());
    coordinator.group_enter(
        SQUAD,
        pos(0, 0),
        AgentId::NONE,
        fixed(timeout_seconds),
        &mut world.services(),
    );
    for agent in [ALPHA, BRAVO, CHARLIE] {
        coordinator.entity_enter(agent, &world.agents);
    }
    coordinator
}
