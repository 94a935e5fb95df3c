//! Headless search scenario runner for CI verification.
//!
//! Runs a squad through a lost-contact scenario without a game attached:
//! a [`sandbox`] world stands in for agents, vision and cover, the
//! [`runner`] plays the squad's behaviour tick by tick, and the result is a
//! JSON [`metrics::RunReport`].
//!
//! - **stdout**: JSON report
//! - **stderr**: Logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Run the built-in scenario
//! cargo run -p search_headless -- run
//!
//! # Run a scenario file and save the report
//! cargo run -p search_headless -- run --scenario courtyard.ron --output report.json
//!
//! # Verify determinism
//! cargo run -p search_headless -- verify --scenario courtyard.ron --runs 5
//! ```

pub mod metrics;
pub mod runner;
pub mod sandbox;
pub mod scenario;

pub use metrics::{RunReport, SignalEvent, TickMetrics};
pub use runner::{run_scenario, verify_determinism, ScenarioRunner};
pub use sandbox::Sandbox;
pub use scenario::{Scenario, ScenarioError};
