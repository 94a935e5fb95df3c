//! Per-level AI state.
//!
//! A [`LevelContext`] is built when a level loads and consumed when it is
//! reset or unloaded. Call sites receive it by reference; nothing reaches
//! it through a global.

use crate::config::SearchConfig;
use crate::coordinator::{CoordinatorSnapshot, SearchCoordinator};
use crate::error::Result;
use crate::ids::AgentId;
use crate::math::Fixed;
use crate::module::ModuleDriver;
use crate::services::SearchServices;

/// AI state owned by the currently loaded level.
#[derive(Debug, Clone)]
pub struct LevelContext {
    search: SearchCoordinator,
    /// Seconds of game time since load.
    elapsed: Fixed,
}

impl LevelContext {
    /// Set up AI state for a freshly loaded level.
    #[must_use]
    pub fn load(config: SearchConfig) -> Self {
        tracing::info!("AI level context loaded");
        Self {
            search: SearchCoordinator::new(config),
            elapsed: Fixed::ZERO,
        }
    }

    /// Set up AI state from a save game.
    pub fn load_saved(
        config: SearchConfig,
        saved: &[u8],
        services: &mut SearchServices<'_>,
    ) -> Result<Self> {
        let snapshot = CoordinatorSnapshot::from_bytes(saved)?;
        let mut context = Self::load(config);
        context.search.restore(&snapshot, services)?;
        Ok(context)
    }

    /// The search coordinator.
    #[must_use]
    pub fn search(&self) -> &SearchCoordinator {
        &self.search
    }

    /// The search coordinator, mutably.
    pub fn search_mut(&mut self) -> &mut SearchCoordinator {
        &mut self.search
    }

    /// Seconds of game time since load.
    #[must_use]
    pub const fn elapsed(&self) -> Fixed {
        self.elapsed
    }

    /// Driver over every module the level owns.
    pub fn modules(&mut self) -> ModuleDriver<'_> {
        ModuleDriver::new().with(&mut self.search)
    }

    /// Tick all modules.
    pub fn update(&mut self, dt: Fixed, services: &mut SearchServices<'_>) {
        self.elapsed = self.elapsed.saturating_add(dt);
        self.modules().update(dt, services);
    }

    /// Forward an agent's enter event to all modules.
    pub fn entity_enter(&mut self, agent: AgentId, services: &mut SearchServices<'_>) {
        self.modules().entity_enter(agent, services);
    }

    /// Forward an agent's leave event to all modules.
    pub fn entity_leave(&mut self, agent: AgentId, services: &mut SearchServices<'_>) {
        self.modules().entity_leave(agent, services);
    }

    /// Encode the level's search state for a save game.
    pub fn save(&self) -> Result<Vec<u8>> {
        self.search.snapshot().to_bytes()
    }

    /// Tear the level's AI state down, releasing all vision registrations.
    pub fn reset(mut self, services: &mut SearchServices<'_>) {
        self.modules().reset(services);
        tracing::info!("AI level context reset");
    }
}
