//! AI module interface and the driver that ticks modules.
//!
//! Game-side AI subsystems share one lifecycle: agents enter and leave,
//! the world ticks, the level is saved or reset. [`AiModule`] captures that
//! lifecycle so a [`ModuleDriver`] can run any number of modules without
//! knowing what they are.

use crate::coordinator::SearchCoordinator;
use crate::error::Result;
use crate::ids::AgentId;
use crate::math::Fixed;
use crate::services::SearchServices;

/// A per-level AI subsystem.
pub trait AiModule {
    /// Stable name, used in logs and as the save-game section key.
    fn name(&self) -> &'static str;

    /// An agent started using this module.
    fn entity_enter(&mut self, agent: AgentId, services: &mut SearchServices<'_>);

    /// An agent stopped using this module.
    fn entity_leave(&mut self, agent: AgentId, services: &mut SearchServices<'_>);

    /// Advance by `dt` seconds.
    fn update(&mut self, dt: Fixed, services: &mut SearchServices<'_>);

    /// Encode the module's persistent state.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Drop all state and release external registrations.
    fn reset(&mut self, services: &mut SearchServices<'_>);
}

impl AiModule for SearchCoordinator {
    fn name(&self) -> &'static str {
        "SearchModule"
    }

    fn entity_enter(&mut self, agent: AgentId, services: &mut SearchServices<'_>) {
        SearchCoordinator::entity_enter(self, agent, services.agents);
    }

    fn entity_leave(&mut self, agent: AgentId, services: &mut SearchServices<'_>) {
        SearchCoordinator::entity_leave(self, agent, services);
    }

    fn update(&mut self, dt: Fixed, services: &mut SearchServices<'_>) {
        SearchCoordinator::update(self, dt, services);
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        self.snapshot().to_bytes()
    }

    fn reset(&mut self, services: &mut SearchServices<'_>) {
        SearchCoordinator::reset(self, services.vision);
    }
}

/// Runs a set of borrowed modules in registration order.
#[derive(Default)]
pub struct ModuleDriver<'m> {
    modules: Vec<&'m mut dyn AiModule>,
}

impl<'m> ModuleDriver<'m> {
    /// Create a driver with no modules.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Add a module; it runs after the ones already added.
    #[must_use]
    pub fn with(mut self, module: &'m mut dyn AiModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Number of driven modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True if no modules are driven.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Forward an enter event to every module.
    pub fn entity_enter(&mut self, agent: AgentId, services: &mut SearchServices<'_>) {
        for module in &mut self.modules {
            module.entity_enter(agent, services);
        }
    }

    /// Forward a leave event to every module.
    pub fn entity_leave(&mut self, agent: AgentId, services: &mut SearchServices<'_>) {
        for module in &mut self.modules {
            module.entity_leave(agent, services);
        }
    }

    /// Tick every module.
    pub fn update(&mut self, dt: Fixed, services: &mut SearchServices<'_>) {
        for module in &mut self.modules {
            module.update(dt, services);
        }
    }

    /// Serialize every module into `(name, bytes)` sections.
    pub fn serialize(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        self.modules
            .iter()
            .map(|module| module.serialize().map(|bytes| (module.name(), bytes)))
            .collect()
    }

    /// Reset every module.
    pub fn reset(&mut self, services: &mut SearchServices<'_>) {
        for module in &mut self.modules {
            tracing::debug!(module = module.name(), "Resetting AI module");
            module.reset(services);
        }
    }
}
