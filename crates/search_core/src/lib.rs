//! # Search Core
//!
//! Cooperative search coordination for NPC groups that lost contact with
//! their target.
//!
//! When a group loses its target, the last known position is turned into a
//! set of candidate search spots. Agents ask for spots one at a time and
//! never share one; a spot is cleared as soon as any member's sensors see
//! it, whether or not that member was sent there.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO (apart from loading a config file on request)
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Geometry, vision and agent data come from the game through the traits in
//! [`services`].
//!
//! ## Crate Structure
//!
//! - [`spot`] - A single search location and its state machine
//! - [`group`] - Spot generation, the per-tick update and assignment
//! - [`scoring`] - Spot scoring and the query type
//! - [`coordinator`] - Owns all groups; the public entry point
//! - [`module`] - AI module trait and driver
//! - [`context`] - Per-level state holder
//! - [`services`] - Collaborator traits
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod group;
pub mod ids;
pub mod math;
pub mod module;
pub mod scoring;
pub mod services;
pub mod spot;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SearchConfig;
    pub use crate::context::LevelContext;
    pub use crate::coordinator::{CoordinatorSnapshot, SearchCoordinator};
    pub use crate::error::{Result, SearchError};
    pub use crate::group::{SearchActor, SearchGroup, StatusCounts};
    pub use crate::ids::{AgentId, GroupId, VisionId};
    pub use crate::math::{Fixed, Vec3Fixed};
    pub use crate::module::{AiModule, ModuleDriver};
    pub use crate::scoring::{closeness, SearchSpotQuery, REJECT_SCORE};
    pub use crate::services::{
        AgentDirectory, CoverQuery, CoverSampler, Perception, SearchServices, SearchSignal,
        SignalSink, VisionMap,
    };
    pub use crate::spot::{SearchSpot, SearchSpotStatus};
}
