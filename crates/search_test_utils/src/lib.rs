//! # Search Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Scriptable collaborators (agents, vision, cover, signals)
//! - Fixture worlds and query helpers
//! - Determinism test harness
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod world;

/// Re-export proptest for convenience.
pub use proptest;

pub use determinism::strategies;
