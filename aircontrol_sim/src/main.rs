//! AirControl Simulator CLI
//!
//! Run deterministic gesture scenarios, or replay recorded landmark frames
//! through the engine runtime.

use aircontrol_core::{EngineConfig, GestureEngine};
use aircontrol_sim::scenarios::ScenarioId;
use aircontrol_sim::{load_config, load_frames, load_profile, run_replay, ReplaySource};
use aircontrol_sim::{NoiseConfig, ScenarioResult, ScenarioRunner};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// AirControl deterministic gesture simulation CLI
#[derive(Parser, Debug)]
#[command(name = "aircontrol-sim")]
#[command(about = "Run deterministic gesture scenarios for AirControl", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (pinch_hold, swipe_right, reacquire, profile_switch,
    /// emergency_stop, safe_zone_violation, label_flicker, nan_storm, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Frame rate of the synthetic sensor
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Landmark jitter standard deviation (normalized image units)
    #[arg(long, default_value = "0.0")]
    noise: f64,

    /// Engine configuration JSON (missing fields use defaults)
    #[arg(long)]
    config: Option<String>,

    /// Replay a JSON array of landmark frames instead of running scenarios
    #[arg(long)]
    replay: Option<String>,

    /// Profile for --replay: built-in name or JSON file
    #[arg(long, default_value = "game")]
    profile: String,

    /// Pace --replay at the recorded timestamps
    #[arg(long)]
    paced: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the per-frame trace of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn replay(args: &Args, path: &str, config: EngineConfig) -> ExitCode {
    let setup = load_frames(path).and_then(|frames| {
        let profile = load_profile(&args.profile)?;
        let engine = GestureEngine::new(config, profile)?;
        Ok((frames, engine))
    });
    let (frames, engine) = match setup {
        Ok(v) => v,
        Err(e) => {
            error!("Replay setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Replaying {} frames from {} (profile '{}')", frames.len(), path, args.profile);
    let source = if args.paced {
        ReplaySource::new(frames).paced()
    } else {
        ReplaySource::new(frames)
    };
    let report = runtime.block_on(run_replay(engine, source));

    if args.json {
        let summary = serde_json::json!({
            "commands": report.commands,
            "metrics": report.metrics,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to encode report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        for command in &report.commands {
            info!("  #{} t={}ms {:?} x{:.2}", command.sequence, command.timestamp_ms, command.action, command.intensity);
        }
        info!(
            "{} commands from {} frames ({} dropped, {} violations)",
            report.commands.len(),
            report.metrics.frames_processed,
            report.metrics.frames_dropped,
            report.metrics.safety_violations
        );
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let config = match args.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            error!("Invalid engine config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &args.replay {
        return replay(&args, path, config);
    }

    if !args.json {
        info!("AirControl Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                return ExitCode::FAILURE;
            }
        }
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let noise = NoiseConfig::default().with_jitter(args.noise);

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            return ExitCode::FAILURE;
        }

        let runner = ScenarioRunner::new(base_seed)
            .with_fps(args.fps)
            .with_noise(noise)
            .with_config(config);
        let (result, export) = runner.run_recorded(scenarios[0]);

        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
            return ExitCode::FAILURE;
        }
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        if result.passed {
            info!("✓ {} (seed={}) PASSED", scenarios[0].name(), base_seed);
            return ExitCode::SUCCESS;
        }
        error!(
            "✗ {} FAILED: {}",
            scenarios[0].name(),
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        return ExitCode::FAILURE;
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_fps(args.fps)
            .with_noise(noise)
            .with_config(config);

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.total_frames,
                    "time_ms": r.final_time_ms,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
