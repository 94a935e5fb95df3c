//! End-to-end search tests.
//!
//! Every test drives a [`SearchCoordinator`] against the scriptable world
//! from `search_test_utils`: a three-agent squad at the origin, cover at
//! distance 2, 10 and 40 along +X, and the target spot at the origin.
//! Spot order is therefore `[(2,0), (10,0), (40,0), target]`.

use search_core::prelude::*;
use search_test_utils::fixtures::{
    fixed, fixed_f, pos, query, searching_coordinator, squad_world, ALPHA, BRAVO, CHARLIE,
    QUARRY, SQUAD,
};
use search_test_utils::world::TestWorld;

const DELTA: AgentId = AgentId(4);

fn request(
    coordinator: &mut SearchCoordinator,
    world: &TestWorld,
    agent: AgentId,
) -> Option<Vec3Fixed> {
    let mut q = query(1, 1, 0, 1);
    coordinator
        .get_next_search_point(agent, &mut q, &world.agents)
        .then_some(q.result)
}

fn squad(coordinator: &SearchCoordinator) -> &SearchGroup {
    coordinator.group(SQUAD).expect("squad search is running")
}

fn observer_of(coordinator: &SearchCoordinator, agent: AgentId) -> VisionId {
    squad(coordinator)
        .actors()
        .iter()
        .find(|actor| actor.agent == agent)
        .map(|actor| actor.observer)
        .expect("agent has an observer")
}

fn observable_at(coordinator: &SearchCoordinator, index: usize) -> VisionId {
    squad(coordinator).spots()[index]
        .observable()
        .expect("spot is registered")
}

fn reveal(world: &mut TestWorld, coordinator: &SearchCoordinator, agent: AgentId, spot: usize) {
    let observer = observer_of(coordinator, agent);
    let observable = observable_at(coordinator, spot);
    world.vision.reveal(observer, observable);
}

// =============================================================================
// Setup
// =============================================================================

mod setup {
    use super::*;

    #[test]
    fn test_group_enter_generates_cover_spots_plus_target_spot() {
        let mut world = squad_world();
        let coordinator = searching_coordinator(&mut world, 0);

        let group = squad(&coordinator);
        let positions: Vec<_> = group.spots().iter().map(SearchSpot::position).collect();
        assert_eq!(positions, vec![pos(2, 0), pos(10, 0), pos(40, 0), pos(0, 0)]);

        let targets: Vec<_> = group.spots().iter().map(SearchSpot::is_target_spot).collect();
        assert_eq!(targets, vec![false, false, false, true]);

        assert_eq!(group.actors().len(), 3);
        assert_eq!(world.vision.observable_count(), 4);
        assert_eq!(world.vision.observer_count(), 3);
        assert!(group
            .spots()
            .iter()
            .all(|spot| spot.status() == SearchSpotStatus::NotSearchedYet));
    }

    #[test]
    fn test_spot_cap_excludes_target_spot() {
        let mut world = squad_world();
        let config = SearchConfig {
            max_search_spots: 2,
            ..SearchConfig::default()
        };
        let mut coordinator = SearchCoordinator::new(config);
        coordinator.group_enter(SQUAD, pos(0, 0), AgentId::NONE, fixed(0), &mut world.services());

        let positions: Vec<_> = squad(&coordinator)
            .spots()
            .iter()
            .map(SearchSpot::position)
            .collect();
        assert_eq!(positions, vec![pos(2, 0), pos(10, 0), pos(0, 0)]);
    }

    #[test]
    fn test_close_cover_samples_are_merged() {
        let mut world = TestWorld::with_cover(vec![pos(5, 0), pos(5, 1), pos(5, 3)]);
        world.agents.add(ALPHA, pos(0, 0), Some(SQUAD));
        let config = SearchConfig {
            min_spot_separation: fixed(2),
            ..SearchConfig::default()
        };
        let mut coordinator = SearchCoordinator::new(config);
        coordinator.group_enter(SQUAD, pos(0, 0), AgentId::NONE, fixed(0), &mut world.services());

        assert_eq!(squad(&coordinator).spots().len(), 3);
    }

    #[test]
    fn test_no_cover_still_yields_target_spot() {
        let mut world = TestWorld::default();
        world.agents.add(ALPHA, pos(3, 3), Some(SQUAD));
        let mut coordinator = SearchCoordinator::default();
        coordinator.group_enter(SQUAD, pos(7, 7), AgentId::NONE, fixed(0), &mut world.services());

        let group = squad(&coordinator);
        assert_eq!(group.spots().len(), 1);
        assert!(group.spots()[0].is_target_spot());
        assert_eq!(group.spots()[0].position(), pos(7, 7));
    }

    #[test]
    fn test_invalid_members_get_no_sensor() {
        let mut world = squad_world();
        world.agents.set_valid(BRAVO, false);
        let coordinator = searching_coordinator(&mut world, 0);

        let agents: Vec<_> = squad(&coordinator).actors().iter().map(|a| a.agent).collect();
        assert_eq!(agents, vec![ALPHA, CHARLIE]);
        assert_eq!(world.vision.observer_count(), 2);
    }

    #[test]
    fn test_group_enter_twice_restarts_without_leaking() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        assert!(request(&mut coordinator, &world, ALPHA).is_some());

        coordinator.group_enter(SQUAD, pos(0, 0), AgentId::NONE, fixed(0), &mut world.services());

        assert_eq!(coordinator.group_count(), 1);
        assert_eq!(world.vision.observable_count(), 4);
        assert_eq!(world.vision.observer_count(), 3);
        assert!(squad(&coordinator).assigned_spot(ALPHA).is_none());
        assert_eq!(squad(&coordinator).status_counts().not_searched, 4);
    }
}

// =============================================================================
// Assignment
// =============================================================================

mod assignment {
    use super::*;

    #[test]
    fn test_nearest_spot_wins_and_target_spot_is_vetoed() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);

        assert_eq!(request(&mut coordinator, &world, ALPHA), Some(pos(2, 0)));

        let group = squad(&coordinator);
        assert_eq!(group.spots()[0].assignee(), Some(ALPHA));
        assert_eq!(
            group.spots()[0].status(),
            SearchSpotStatus::BeingSearchedRightAboutNow
        );
        assert_eq!(group.spots()[3].status(), SearchSpotStatus::NotSearchedYet);
    }

    #[test]
    fn test_agents_never_share_a_spot() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);

        assert_eq!(request(&mut coordinator, &world, ALPHA), Some(pos(2, 0)));
        assert_eq!(request(&mut coordinator, &world, BRAVO), Some(pos(10, 0)));
        assert_eq!(request(&mut coordinator, &world, CHARLIE), Some(pos(40, 0)));

        let group = squad(&coordinator);
        assert_eq!(group.status_counts().being_searched, 3);
        assert!(group.invariants_hold());
    }

    #[test]
    fn test_no_eligible_spot_returns_false_and_leaves_query() {
        let mut world = squad_world();
        world.agents.add(DELTA, pos(0, 0), Some(SQUAD));
        let mut coordinator = searching_coordinator(&mut world, 0);
        for agent in [ALPHA, BRAVO, CHARLIE] {
            assert!(request(&mut coordinator, &world, agent).is_some());
        }

        // Only the target spot is left, and DELTA is standing on it
        let mut q = query(1, 1, 0, 1);
        q.result = pos(-9, -9);
        assert!(!coordinator.get_next_search_point(DELTA, &mut q, &world.agents));
        assert_eq!(q.result, pos(-9, -9));
        assert!(squad(&coordinator).assigned_spot(DELTA).is_none());
    }

    #[test]
    fn test_min_distance_vetoes_near_spots() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);

        let mut q = query(1, 1, 0, 15);
        assert!(coordinator.get_next_search_point(ALPHA, &mut q, &world.agents));
        assert_eq!(q.result, pos(40, 0));
    }

    #[test]
    fn test_zero_min_distance_allows_standing_spot() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);

        // Only the last-known-position term: the target spot is closest
        let mut q = query(0, 1, 0, 0);
        assert!(coordinator.get_next_search_point(ALPHA, &mut q, &world.agents));
        assert_eq!(q.result, pos(0, 0));
        assert!(squad(&coordinator).assigned_spot(ALPHA).unwrap().is_target_spot());
    }

    #[test]
    fn test_live_target_term_pulls_towards_quarry() {
        let mut world = squad_world();
        world.agents.add(QUARRY, pos(40, 0), None);
        let mut coordinator = SearchCoordinator::default();
        coordinator.group_enter(SQUAD, pos(0, 0), QUARRY, fixed(0), &mut world.services());

        let mut q = query(0, 0, 1, 1);
        assert!(coordinator.get_next_search_point(ALPHA, &mut q, &world.agents));
        assert_eq!(q.result, pos(40, 0));
    }

    #[test]
    fn test_unknown_quarry_drops_live_target_term() {
        let mut world = squad_world();
        world.agents.add(QUARRY, pos(40, 0), None);
        world.agents.set_valid(QUARRY, false);
        let mut coordinator = SearchCoordinator::default();
        coordinator.group_enter(SQUAD, pos(0, 0), QUARRY, fixed(0), &mut world.services());

        let group = squad(&coordinator);
        assert_eq!(group.current_target_position(&world.agents), None);

        // All scores are zero; the first eligible spot wins the tie
        let mut q = query(0, 0, 1, 1);
        assert!(coordinator.get_next_search_point(ALPHA, &mut q, &world.agents));
        assert_eq!(q.result, pos(2, 0));
    }

    #[test]
    fn test_calculate_score_rejects_invalid_and_vetoed_agents() {
        let mut world = squad_world();
        world.agents.add(DELTA, pos(0, 0), Some(SQUAD));
        world.agents.set_valid(DELTA, false);
        let coordinator = searching_coordinator(&mut world, 0);
        let group = squad(&coordinator);
        let q = query(1, 1, 0, 1);

        let target_spot = &group.spots()[3];
        assert_eq!(
            group.calculate_score(target_spot, ALPHA, &q, None, &world.agents),
            REJECT_SCORE
        );
        assert_eq!(
            group.calculate_score(&group.spots()[0], DELTA, &q, None, &world.agents),
            REJECT_SCORE
        );

        let near = group.calculate_score(&group.spots()[0], ALPHA, &q, None, &world.agents);
        let far = group.calculate_score(&group.spots()[2], ALPHA, &q, None, &world.agents);
        assert_eq!(near, closeness(fixed(2)) * fixed(2));
        assert!(near > far);
    }

    #[test]
    fn test_invalid_agent_gets_nothing() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        world.agents.set_valid(ALPHA, false);

        assert_eq!(request(&mut coordinator, &world, ALPHA), None);
        assert_eq!(squad(&coordinator).status_counts().being_searched, 0);
    }

    #[test]
    fn test_agent_without_search_gets_nothing() {
        let mut world = squad_world();
        world.agents.add(DELTA, pos(0, 0), Some(GroupId(99)));
        let mut coordinator = searching_coordinator(&mut world, 0);

        assert_eq!(request(&mut coordinator, &world, DELTA), None);
        assert_eq!(request(&mut coordinator, &world, QUARRY), None);
    }

    #[test]
    fn test_new_request_releases_previous_claim() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);

        assert_eq!(request(&mut coordinator, &world, ALPHA), Some(pos(2, 0)));
        assert_eq!(request(&mut coordinator, &world, ALPHA), Some(pos(10, 0)));

        let group = squad(&coordinator);
        assert_eq!(group.spots()[0].status(), SearchSpotStatus::NotSearchedYet);
        assert_eq!(group.spots()[0].assignee(), None);
        assert_eq!(group.assigned_spot(ALPHA).map(SearchSpot::position), Some(pos(10, 0)));
        assert_eq!(group.status_counts().being_searched, 1);
        assert!(group.invariants_hold());
    }

    #[test]
    fn test_fallback_picks_longest_unobserved_spot() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        let dt = fixed_f(0.5);

        reveal(&mut world, &coordinator, BRAVO, 1);
        coordinator.update(dt, &mut world.services());
        reveal(&mut world, &coordinator, BRAVO, 0);
        reveal(&mut world, &coordinator, BRAVO, 2);
        coordinator.update(dt, &mut world.services());

        let group = squad(&coordinator);
        assert_eq!(group.status_counts().searched, 3);
        assert_eq!(group.spots()[1].last_observed(), dt);
        assert_eq!(group.spots()[0].last_observed(), dt * fixed(2));

        // The target spot is vetoed, so every remaining spot is a revisit
        assert_eq!(request(&mut coordinator, &world, ALPHA), Some(pos(10, 0)));
        assert_eq!(
            squad(&coordinator).spots()[1].status(),
            SearchSpotStatus::BeingSearchedRightAboutNow
        );
    }

    #[test]
    fn test_fallback_respects_min_distance() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        for index in 0..3 {
            reveal(&mut world, &coordinator, BRAVO, index);
        }
        coordinator.update(fixed(1), &mut world.services());

        let mut q = query(1, 1, 0, 50);
        assert!(!coordinator.get_next_search_point(ALPHA, &mut q, &world.agents));
    }
}

// =============================================================================
// Visibility & signals
// =============================================================================

mod visibility {
    use super::*;

    #[test]
    fn test_update_pushes_every_sensor_pose() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        world.agents.set_position(ALPHA, pos(3, 4));

        coordinator.update(fixed_f(0.1), &mut world.services());

        assert_eq!(world.vision.moves, 3);
        let observer = observer_of(&coordinator, ALPHA);
        assert_eq!(world.vision.observer(observer).unwrap().eye_position, pos(3, 4));
    }

    #[test]
    fn test_assignee_sees_own_spot() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        request(&mut coordinator, &world, ALPHA);

        reveal(&mut world, &coordinator, ALPHA, 0);
        coordinator.update(fixed_f(0.1), &mut world.services());

        let group = squad(&coordinator);
        assert_eq!(group.spots()[0].status(), SearchSpotStatus::Searched);
        assert_eq!(group.spots()[0].assignee(), None);
        assert!(group.assigned_spot(ALPHA).is_none());
        assert_eq!(
            world.signals.for_agent(ALPHA),
            vec![SearchSignal::AssignedSearchSpotSeen]
        );
    }

    #[test]
    fn test_someone_else_sees_assigned_spot() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        request(&mut coordinator, &world, ALPHA);

        reveal(&mut world, &coordinator, CHARLIE, 0);
        coordinator.update(fixed_f(0.1), &mut world.services());

        assert_eq!(
            world.signals.for_agent(ALPHA),
            vec![SearchSignal::AssignedSearchSpotSeenBySomeoneElse]
        );
        assert!(world.signals.for_agent(CHARLIE).is_empty());
        assert!(squad(&coordinator).assigned_spot(ALPHA).is_none());
    }

    #[test]
    fn test_first_actor_in_roster_gets_credit() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        request(&mut coordinator, &world, BRAVO);
        assert_eq!(squad(&coordinator).spots()[0].assignee(), Some(BRAVO));

        reveal(&mut world, &coordinator, ALPHA, 0);
        reveal(&mut world, &coordinator, BRAVO, 0);
        coordinator.update(fixed_f(0.1), &mut world.services());

        assert_eq!(
            world.signals.for_agent(BRAVO),
            vec![SearchSignal::AssignedSearchSpotSeenBySomeoneElse]
        );
    }

    #[test]
    fn test_target_spot_sends_extra_signal_first() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        let mut q = query(0, 1, 0, 0);
        assert!(coordinator.get_next_search_point(ALPHA, &mut q, &world.agents));

        reveal(&mut world, &coordinator, ALPHA, 3);
        coordinator.update(fixed_f(0.1), &mut world.services());

        assert_eq!(
            world.signals.for_agent(ALPHA),
            vec![
                SearchSignal::TargetSearchSpotSeen,
                SearchSignal::AssignedSearchSpotSeen
            ]
        );
    }

    #[test]
    fn test_unassigned_spot_is_confirmed_silently() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);

        reveal(&mut world, &coordinator, ALPHA, 2);
        coordinator.update(fixed_f(0.1), &mut world.services());

        assert_eq!(squad(&coordinator).spots()[2].status(), SearchSpotStatus::Searched);
        assert!(world.signals.sent.is_empty());
    }

    #[test]
    fn test_repeated_sightings_signal_once() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        request(&mut coordinator, &world, ALPHA);
        reveal(&mut world, &coordinator, ALPHA, 0);

        for _ in 0..5 {
            coordinator.update(fixed_f(0.1), &mut world.services());
        }

        assert_eq!(world.signals.sent.len(), 1);
        assert_eq!(squad(&coordinator).spots()[0].status(), SearchSpotStatus::Searched);
    }
}

// =============================================================================
// Timeouts
// =============================================================================

mod timeouts {
    use super::*;

    #[test]
    fn test_timed_out_spot_becomes_searchable_again() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 1);
        let dt = fixed_f(0.5);
        request(&mut coordinator, &world, ALPHA);

        reveal(&mut world, &coordinator, ALPHA, 0);
        coordinator.update(dt, &mut world.services());
        world.vision.hide_all();

        let spot = &squad(&coordinator).spots()[0];
        assert_eq!(spot.status(), SearchSpotStatus::SearchedTimingOut);
        assert_eq!(spot.timeout_remaining(), fixed(1));

        coordinator.update(dt, &mut world.services());
        let spot = &squad(&coordinator).spots()[0];
        assert_eq!(spot.status(), SearchSpotStatus::SearchedTimingOut);
        assert_eq!(spot.timeout_remaining(), fixed_f(0.5));

        // Updates since the sighting now add up to the full timeout
        coordinator.update(dt, &mut world.services());
        assert_eq!(
            squad(&coordinator).spots()[0].status(),
            SearchSpotStatus::NotSearchedYet
        );

        coordinator.update(dt, &mut world.services());
        assert_eq!(
            squad(&coordinator).spots()[0].status(),
            SearchSpotStatus::NotSearchedYet
        );

        assert_eq!(request(&mut coordinator, &world, ALPHA), Some(pos(2, 0)));
    }

    #[test]
    fn test_sighting_while_timing_out_restarts_timer() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 1);
        let dt = fixed_f(0.5);

        reveal(&mut world, &coordinator, ALPHA, 0);
        coordinator.update(dt, &mut world.services());
        coordinator.update(dt, &mut world.services());

        let spot = &squad(&coordinator).spots()[0];
        assert_eq!(spot.status(), SearchSpotStatus::SearchedTimingOut);
        assert_eq!(spot.timeout_remaining(), fixed(1));
        assert_eq!(spot.last_observed(), fixed(1));
    }

    #[test]
    fn test_zero_timeout_is_permanent() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);

        reveal(&mut world, &coordinator, ALPHA, 0);
        coordinator.update(fixed(1), &mut world.services());
        world.vision.hide_all();
        for _ in 0..100 {
            coordinator.update(fixed(1), &mut world.services());
        }

        assert_eq!(squad(&coordinator).spots()[0].status(), SearchSpotStatus::Searched);
    }
}

// =============================================================================
// Unreachable spots
// =============================================================================

mod unreachable {
    use super::*;

    #[test]
    fn test_unreachable_spot_is_never_assigned_or_confirmed() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        request(&mut coordinator, &world, ALPHA);

        coordinator.mark_assigned_search_spot_as_unreachable(ALPHA, &world.agents);

        let group = squad(&coordinator);
        assert_eq!(group.spots()[0].status(), SearchSpotStatus::Unreachable);
        assert!(group.assigned_spot(ALPHA).is_none());

        reveal(&mut world, &coordinator, BRAVO, 0);
        coordinator.update(fixed(1), &mut world.services());
        assert_eq!(squad(&coordinator).spots()[0].status(), SearchSpotStatus::Unreachable);

        for agent in [ALPHA, BRAVO] {
            assert_ne!(request(&mut coordinator, &world, agent), Some(pos(2, 0)));
        }
    }

    #[test]
    fn test_unreachable_without_claim_is_noop() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        request(&mut coordinator, &world, ALPHA);
        let before = squad(&coordinator).status_counts();

        coordinator.mark_assigned_search_spot_as_unreachable(CHARLIE, &world.agents);
        coordinator.mark_assigned_search_spot_as_unreachable(QUARRY, &world.agents);

        assert_eq!(squad(&coordinator).status_counts(), before);
        assert_eq!(squad(&coordinator).status_counts().unreachable, 0);
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_last_leave_destroys_group_and_registrations() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        request(&mut coordinator, &world, ALPHA);

        coordinator.entity_leave(ALPHA, &mut world.services());
        coordinator.entity_leave(BRAVO, &mut world.services());
        assert!(coordinator.group_exists(SQUAD));
        assert_eq!(world.vision.observable_count(), 4);

        coordinator.entity_leave(CHARLIE, &mut world.services());
        assert!(!coordinator.group_exists(SQUAD));
        assert_eq!(world.vision.observable_count(), 0);
        assert_eq!(world.vision.observer_count(), 0);
    }

    #[test]
    fn test_leave_uses_entered_set_when_group_is_forgotten() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        for agent in [ALPHA, BRAVO, CHARLIE] {
            world.agents.set_group(agent, None);
            coordinator.entity_leave(agent, &mut world.services());
        }

        assert_eq!(coordinator.group_count(), 0);
        assert_eq!(world.vision.observer_count(), 0);
    }

    #[test]
    fn test_leave_without_search_is_ignored() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        coordinator.entity_leave(QUARRY, &mut world.services());
        assert!(coordinator.group_exists(SQUAD));
    }

    #[test]
    fn test_group_leave_of_unknown_group_is_ignored() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        coordinator.group_leave(GroupId(42), &mut world.vision);
        assert_eq!(coordinator.group_count(), 1);
    }

    #[test]
    fn test_explicit_group_leave_releases_everything() {
        let mut world = squad_world();
        let mut coordinator = searching_coordinator(&mut world, 0);
        coordinator.group_leave(SQUAD, &mut world.vision);

        assert!(!coordinator.group_exists(SQUAD));
        assert_eq!(world.vision.observable_count(), 0);
        assert_eq!(world.vision.observer_count(), 0);
        assert_eq!(request(&mut coordinator, &world, ALPHA), None);
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence {
    use super::*;
    use search_core::coordinator::SNAPSHOT_VERSION;

    fn busy_search(world: &mut TestWorld) -> SearchCoordinator {
        let mut coordinator = searching_coordinator(world, 3);
        request(&mut coordinator, world, ALPHA);
        request(&mut coordinator, world, BRAVO);
        reveal(world, &coordinator, BRAVO, 1);
        coordinator.update(fixed(1), &mut world.services());
        world.vision.hide_all();
        coordinator
    }

    #[test]
    fn test_restore_into_fresh_world_registers_new_handles() {
        let mut world = squad_world();
        let coordinator = busy_search(&mut world);
        let bytes = coordinator.snapshot().to_bytes().unwrap();

        let mut fresh = squad_world();
        let mut restored = SearchCoordinator::default();
        let snapshot = CoordinatorSnapshot::from_bytes(&bytes).unwrap();
        restored.restore(&snapshot, &mut fresh.services()).unwrap();

        assert_eq!(fresh.vision.observable_count(), 4);
        assert_eq!(fresh.vision.observer_count(), 3);

        let before = squad(&coordinator);
        let after = squad(&restored);
        assert_eq!(after.status_counts(), before.status_counts());
        assert_eq!(after.entered().collect::<Vec<_>>(), vec![ALPHA, BRAVO, CHARLIE]);
        assert_eq!(
            after.assigned_spot(ALPHA).map(SearchSpot::position),
            Some(pos(2, 0))
        );
        assert_eq!(after.spots()[1].timeout_remaining(), fixed(3));
        assert!(after.invariants_hold());
    }

    #[test]
    fn test_restore_in_place_replaces_registrations() {
        let mut world = squad_world();
        let mut coordinator = busy_search(&mut world);
        let snapshot = coordinator.snapshot();

        coordinator.restore(&snapshot, &mut world.services()).unwrap();

        assert_eq!(world.vision.observable_count(), 4);
        assert_eq!(world.vision.observer_count(), 3);
        assert_eq!(coordinator.snapshot(), snapshot);
    }

    #[test]
    fn test_restored_search_keeps_running() {
        let mut world = squad_world();
        let coordinator = busy_search(&mut world);
        let snapshot = coordinator.snapshot();

        let mut fresh = squad_world();
        let mut restored = SearchCoordinator::default();
        restored.restore(&snapshot, &mut fresh.services()).unwrap();

        reveal(&mut fresh, &restored, ALPHA, 0);
        restored.update(fixed(1), &mut fresh.services());

        assert_eq!(
            fresh.signals.for_agent(ALPHA),
            vec![SearchSignal::AssignedSearchSpotSeen]
        );
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut world = squad_world();
        let coordinator = busy_search(&mut world);
        let mut snapshot = coordinator.snapshot();
        snapshot.version = SNAPSHOT_VERSION + 1;

        let mut restored = SearchCoordinator::default();
        let err = restored.restore(&snapshot, &mut world.services()).unwrap_err();
        assert!(matches!(err, SearchError::SnapshotVersion { .. }));
    }

    #[test]
    fn test_duplicate_group_is_rejected() {
        let mut world = squad_world();
        let coordinator = busy_search(&mut world);
        let mut snapshot = coordinator.snapshot();
        snapshot.groups.push(snapshot.groups[0].clone());

        let mut restored = SearchCoordinator::default();
        let err = restored.restore(&snapshot, &mut world.services()).unwrap_err();
        assert!(matches!(err, SearchError::DuplicateGroup(SQUAD)));
        assert_eq!(restored.group_count(), 0);
    }

    #[test]
    fn test_restore_drops_assignee_on_unclaimed_spot() {
        let mut world = squad_world();
        let coordinator = searching_coordinator(&mut world, 3);
        let mut snapshot = coordinator.snapshot();
        snapshot.groups[0].spots[0].assignee = Some(ALPHA);

        let mut fresh = squad_world();
        let mut restored = SearchCoordinator::default();
        restored.restore(&snapshot, &mut fresh.services()).unwrap();

        let spot = &squad(&restored).spots()[0];
        assert_eq!(spot.status(), SearchSpotStatus::NotSearchedYet);
        assert_eq!(spot.assignee(), None);
        assert!(squad(&restored).assigned_spot(ALPHA).is_none());
        assert!(squad(&restored).invariants_hold());

        assert_eq!(request(&mut restored, &fresh, BRAVO), Some(pos(2, 0)));
        let alpha_spot = request(&mut restored, &fresh, ALPHA);
        assert!(alpha_spot.is_some());
        assert_ne!(alpha_spot, Some(pos(2, 0)));

        let group = squad(&restored);
        assert_eq!(group.spots()[0].assignee(), Some(BRAVO));
        assert_eq!(
            group.assigned_spot(BRAVO).map(SearchSpot::position),
            Some(pos(2, 0))
        );
        assert!(group.invariants_hold());
    }

    #[test]
    fn test_restore_releases_claims_without_a_valid_member() {
        let mut world = squad_world();
        let coordinator = searching_coordinator(&mut world, 3);
        let mut snapshot = coordinator.snapshot();
        snapshot.groups[0].spots[0].status = SearchSpotStatus::BeingSearchedRightAboutNow;
        snapshot.groups[0].spots[0].assignee = None;
        snapshot.groups[0].spots[1].status = SearchSpotStatus::BeingSearchedRightAboutNow;
        snapshot.groups[0].spots[1].assignee = Some(DELTA);
        snapshot.groups[0].spots[2].status = SearchSpotStatus::BeingSearchedRightAboutNow;
        snapshot.groups[0].spots[2].assignee = Some(QUARRY);

        let mut fresh = squad_world();
        // In the directory, but searching with another group
        fresh.agents.add(DELTA, pos(0, 0), Some(GroupId(99)));
        let mut restored = SearchCoordinator::default();
        restored.restore(&snapshot, &mut fresh.services()).unwrap();

        let group = squad(&restored);
        for spot in &group.spots()[..3] {
            assert_eq!(spot.status(), SearchSpotStatus::NotSearchedYet);
            assert_eq!(spot.assignee(), None);
        }
        assert!(group.assigned_spot(DELTA).is_none());
        assert!(group.invariants_hold());

        assert_eq!(request(&mut restored, &fresh, ALPHA), Some(pos(2, 0)));
        assert!(squad(&restored).invariants_hold());
    }

    #[test]
    fn test_restore_keeps_one_claim_per_agent() {
        let mut world = squad_world();
        let coordinator = busy_search(&mut world);
        let mut snapshot = coordinator.snapshot();
        snapshot.groups[0].spots[2].status = SearchSpotStatus::BeingSearchedRightAboutNow;
        snapshot.groups[0].spots[2].assignee = Some(ALPHA);

        let mut fresh = squad_world();
        let mut restored = SearchCoordinator::default();
        restored.restore(&snapshot, &mut fresh.services()).unwrap();

        let group = squad(&restored);
        assert_eq!(
            group.assigned_spot(ALPHA).map(SearchSpot::position),
            Some(pos(2, 0))
        );
        assert_eq!(group.spots()[2].status(), SearchSpotStatus::NotSearchedYet);
        assert_eq!(group.spots()[2].assignee(), None);
        assert!(group.invariants_hold());
    }

    #[test]
    fn test_reset_releases_every_group() {
        let mut world = squad_world();
        let mut coordinator = busy_search(&mut world);
        coordinator.reset(&mut world.vision);

        assert_eq!(coordinator.group_count(), 0);
        assert_eq!(world.vision.observable_count(), 0);
        assert_eq!(world.vision.observer_count(), 0);
    }
}

// =============================================================================
// Level context & module driver
// =============================================================================

mod level {
    use super::*;

    fn start_level(world: &mut TestWorld) -> LevelContext {
        let mut level = LevelContext::load(SearchConfig::default());
        level.search_mut().group_enter(
            SQUAD,
            pos(0, 0),
            AgentId::NONE,
            fixed(0),
            &mut world.services(),
        );
        for agent in [ALPHA, BRAVO, CHARLIE] {
            level.entity_enter(agent, &mut world.services());
        }
        level
    }

    #[test]
    fn test_context_forwards_events_to_search() {
        let mut world = squad_world();
        let mut level = start_level(&mut world);

        assert_eq!(squad(level.search()).entered().count(), 3);
        level.update(fixed_f(0.25), &mut world.services());
        level.update(fixed_f(0.25), &mut world.services());
        assert_eq!(level.elapsed(), fixed_f(0.5));
        assert_eq!(squad(level.search()).clock(), fixed_f(0.5));

        for agent in [ALPHA, BRAVO, CHARLIE] {
            level.entity_leave(agent, &mut world.services());
        }
        assert_eq!(level.search().group_count(), 0);
    }

    #[test]
    fn test_save_and_load_level() {
        let mut world = squad_world();
        let mut level = start_level(&mut world);
        let mut q = query(1, 1, 0, 1);
        assert!(level
            .search_mut()
            .get_next_search_point(ALPHA, &mut q, &world.agents));
        let saved = level.save().unwrap();

        let mut fresh = squad_world();
        let loaded =
            LevelContext::load_saved(SearchConfig::default(), &saved, &mut fresh.services())
                .unwrap();

        assert_eq!(loaded.search().snapshot(), level.search().snapshot());
        assert_eq!(fresh.vision.observable_count(), 4);
    }

    #[test]
    fn test_load_saved_rejects_garbage() {
        let mut world = squad_world();
        let err =
            LevelContext::load_saved(SearchConfig::default(), &[1, 2, 3], &mut world.services())
                .unwrap_err();
        assert!(matches!(err, SearchError::Snapshot(_)));
    }

    #[test]
    fn test_reset_level_releases_vision() {
        let mut world = squad_world();
        let level = start_level(&mut world);
        assert_eq!(world.vision.observer_count(), 3);

        level.reset(&mut world.services());

        assert_eq!(world.vision.observable_count(), 0);
        assert_eq!(world.vision.observer_count(), 0);
    }

    #[test]
    fn test_driver_sections_match_save() {
        let mut world = squad_world();
        let mut level = start_level(&mut world);
        let saved = level.save().unwrap();

        let sections = level.modules().serialize().unwrap();
        assert_eq!(sections, vec![("SearchModule", saved)]);
    }
}
