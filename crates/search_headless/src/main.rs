//! Headless search scenario runner.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in courtyard scenario, report on stdout
//! cargo run -p search_headless -- run
//!
//! # Run a scenario file with a config override
//! cargo run -p search_headless -- run --scenario s.ron --config search.ron --output out.json
//!
//! # Check that repeated runs agree
//! cargo run -p search_headless -- verify --scenario s.ron --runs 5
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use search_core::config::SearchConfig;
use search_headless::{run_scenario, verify_determinism, Scenario};

#[derive(Parser)]
#[command(name = "search_headless")]
#[command(about = "Headless NPC search scenario runner for CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario once and print its report
    Run {
        /// Scenario file (RON). Defaults to the built-in courtyard
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Search config file (RON) overriding the scenario's settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the number of ticks
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify determinism by running the same scenario several times
    Verify {
        /// Scenario file (RON). Defaults to the built-in courtyard
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for the report)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            config,
            ticks,
            output,
        }) => {
            cmd_run(scenario, config, ticks, output);
        }
        Some(Commands::Verify { scenario, runs }) => {
            cmd_verify(scenario, runs);
        }
        None => {
            cmd_run(None, None, None, None);
        }
    }
}

fn load_scenario(path: Option<PathBuf>) -> Scenario {
    let Some(path) = path else {
        return Scenario::courtyard();
    };

    match Scenario::load(&path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("Failed to load scenario: {e}");
            std::process::exit(1);
        }
    }
}

/// Run a scenario once
fn cmd_run(
    scenario: Option<PathBuf>,
    config: Option<PathBuf>,
    ticks: Option<u64>,
    output: Option<PathBuf>,
) {
    let mut scenario = load_scenario(scenario);

    if let Some(path) = config {
        match SearchConfig::load(&path) {
            Ok(config) => scenario.search = config,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        }
    }
    if let Some(ticks) = ticks {
        scenario.ticks = ticks;
    }

    tracing::info!("Running scenario: {}", scenario.name);

    let report = match run_scenario(scenario) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("Scenario: {}", report.scenario);
    eprintln!("  Ticks: {}", report.ticks);
    eprintln!("  Spots: {}", report.spots);
    eprintln!("  Coverage: {:.0}%", report.coverage() * 100.0);
    match report.cleared_at {
        Some(tick) => eprintln!("  All spots seen by tick {tick}"),
        None => eprintln!("  Some spots were never seen"),
    }
    eprintln!("  Signals: {}", report.signals.len());
    eprintln!("  State hash: {:016x}", report.final_state_hash);

    let written = match output {
        Some(path) => report.write_json(&path).map(|()| {
            eprintln!("Report written to {}", path.display());
        }),
        None => report
            .to_json()
            .map(|json| println!("{json}"))
            .map_err(std::io::Error::other),
    };
    if let Err(e) = written {
        eprintln!("Failed to write report: {e}");
        std::process::exit(1);
    }

    if !report.is_clean() {
        eprintln!(
            "FAIL: {} observables and {} observers leaked",
            report.leaked_observables, report.leaked_observers
        );
        std::process::exit(1);
    }
}

/// Verify determinism
fn cmd_verify(scenario: Option<PathBuf>, runs: u32) {
    let scenario = load_scenario(scenario);
    tracing::info!(
        "Verifying determinism: {} ({} runs)",
        scenario.name,
        runs
    );

    match verify_determinism(&scenario, runs) {
        Ok(true) => eprintln!("PASS: All {runs} runs produced identical results"),
        Ok(false) => {
            eprintln!("FAIL: Non-determinism detected!");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}
