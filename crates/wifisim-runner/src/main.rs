//! # wifisim-runner
//!
//! CLI runner for wifisim.
//!
//! This is the main entry point for running 802.11n PHY simulations.

use wifisim_runner::metrics_export;
use wifisim_runner::{EventLoop, ProgressInfo, RunnerError, SimTime, SimulationStats};

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wifisim_model::{build_simulation, load_models};

// ============================================================================
// Duration Parsing
// ============================================================================

/// Parse a duration string with units into seconds.
///
/// Supported formats:
/// - Plain number: `60` (interpreted as seconds)
/// - With unit suffix: `250us`, `20ms`, `60s`, `10m`, `2h`, `1d`
/// - Combined units: `1h30m`, `1s500ms`
fn parse_duration(s: &str) -> Result<f64, String> {
    let s = s.trim();

    if let Ok(secs) = s.parse::<f64>() {
        if secs < 0.0 {
            return Err(format!("Duration must not be negative: '{}'", s));
        }
        return Ok(secs);
    }

    let mut total_seconds = 0.0;
    let mut chars = s.chars().peekable();
    let mut parsed_any = false;

    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let mut unit = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(c);
                chars.next();
            } else {
                break;
            }
        }

        if number.is_empty() {
            return Err(format!("Invalid duration format: expected a number in '{}'", s));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("Invalid number '{}' in duration '{}'", number, s))?;
        let multiplier = match unit.as_str() {
            "" | "s" => 1.0,
            "us" => 1e-6,
            "ms" => 1e-3,
            "m" => 60.0,
            "h" => 3600.0,
            "d" => 86400.0,
            other => {
                return Err(format!(
                    "Unknown duration unit '{}' in '{}'. Use us, ms, s, m, h or d.",
                    other, s
                ))
            }
        };
        total_seconds += value * multiplier;
        parsed_any = true;
    }

    if !parsed_any {
        return Err(format!("Invalid duration format: '{}'", s));
    }
    Ok(total_seconds)
}

// ============================================================================
// CLI Configuration
// ============================================================================

/// Output format for metrics at end of simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MetricsOutputFormat {
    /// JSON format for programmatic consumption.
    Json,
    /// Prometheus text exposition format.
    Prometheus,
}

/// wifisim - 802.11n PHY simulator
#[derive(Parser, Debug)]
#[command(name = "wifisim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation from YAML scenario file(s)
    Run(RunnerConfig),
    /// List all available metrics with descriptions and labels
    Metrics,
    /// List all available properties with descriptions and defaults
    Properties,
}

/// Configuration for running a simulation
#[derive(Parser, Debug)]
pub struct RunnerConfig {
    /// Path(s) to YAML scenario file(s). Multiple files are merged in order (later overrides earlier).
    #[arg(required = true)]
    pub models: Vec<PathBuf>,

    /// Simulation duration, overriding simulation/duration_s.
    /// Accepts plain seconds or units: 0.5, 250ms, 10s, 1m30s
    #[arg(short, long, value_parser = parse_duration)]
    pub duration: Option<f64>,

    /// Random seed, overriding simulation/seed
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Output trace file path (JSON)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format for metrics at end of simulation.
    #[arg(long, value_enum)]
    pub metrics_output: Option<MetricsOutputFormat>,

    /// File path to write metrics (stdout if not specified).
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

// ============================================================================
// Terminal UI Functions
// ============================================================================

/// Print the final summary table with per-node statistics.
fn print_summary_table(event_loop: &EventLoop) {
    let agents = event_loop.agent_stats();

    eprintln!();
    eprintln!(
        "┌{}┬{}┬{}┬{}┬{}┬{}┬{}┐",
        "─".repeat(18),
        "─".repeat(6),
        "─".repeat(8),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(10)
    );
    eprintln!(
        "│ {:^16} │ {:^4} │ {:^6} │ {:^8} │ {:^8} │ {:^8} │ {:^8} │",
        "Node", "Role", "Ch", "TX", "RX ok", "RX err", "Dropped"
    );
    eprintln!(
        "├{}┼{}┼{}┼{}┼{}┼{}┼{}┤",
        "─".repeat(18),
        "─".repeat(6),
        "─".repeat(8),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(10)
    );

    for node_info in event_loop.node_infos() {
        let stats = event_loop
            .node_stats()
            .get(&node_info.phy_entity_id)
            .cloned()
            .unwrap_or_default();
        let switches = agents
            .iter()
            .find(|(name, _)| *name == node_info.name)
            .map_or(0, |(_, s)| s.channel_switches);
        let channel = if switches > 0 { format!("{}sw", switches) } else { "-".to_string() };

        eprintln!(
            "│ {:16} │ {:4} │ {:>6} │ {:>8} │ {:>8} │ {:>8} │ {:>8} │",
            &node_info.name,
            node_info.role.as_label(),
            channel,
            stats.tx,
            stats.rx_ok,
            stats.rx_error,
            stats.rx_drop
        );
    }

    eprintln!(
        "└{}┴{}┴{}┴{}┴{}┴{}┴{}┘",
        "─".repeat(18),
        "─".repeat(6),
        "─".repeat(8),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(10),
        "─".repeat(10)
    );
    let _ = std::io::stderr().flush();
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Run a simulation with the given configuration.
pub fn run_simulation(config: RunnerConfig) -> Result<SimulationStats, RunnerError> {
    let metrics_recorder = if config.metrics_output.is_some() {
        let recorder = metrics_export::InMemoryRecorder::new();
        match metrics::set_global_recorder(recorder.clone()) {
            Ok(()) => Some(recorder),
            Err(e) => {
                tracing::warn!("failed to set metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let paths: Vec<&Path> = config.models.iter().map(|p| p.as_path()).collect();
    let model = load_models(&paths)?;
    if config.verbose {
        eprintln!(
            "Loaded scenario with {} nodes from {} file(s)",
            model.nodes().len(),
            config.models.len()
        );
    }

    let seed = config.seed.unwrap_or(model.simulation().seed);
    let duration = match config.duration {
        Some(secs) => SimTime::from_secs(secs),
        None => model.simulation().duration(),
    };

    let simulation = build_simulation(&model, seed)?;
    if config.verbose {
        eprintln!("Built simulation with {} entities, seed {}", simulation.entities.len(), seed);
    }

    let trace_output: Option<Box<dyn Write>> = match &config.output {
        Some(path) => Some(Box::new(std::io::BufWriter::new(std::fs::File::create(path)?))),
        None => None,
    };

    let mut event_loop = EventLoop::new(simulation, seed, trace_output);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| RunnerError::ConfigError(format!("failed to set Ctrl+C handler: {}", e)))?;

    eprintln!("⏱  Running simulation for {:.3} seconds...", duration.as_secs_f64());
    let print_progress = |_event_loop: &EventLoop, progress: ProgressInfo, is_final: bool| {
        if is_final {
            return;
        }
        eprintln!(
            "  [{:5.1}%] sim: {:.3}s | events: {} | wall: {:.1}s",
            progress.progress_percent,
            progress.sim_time.as_secs_f64(),
            progress.events_processed,
            progress.wall_elapsed.as_secs_f64()
        );
    };
    let stats = event_loop.run_with_progress(duration, Some(stop_flag), print_progress)?;
    print_summary_table(&event_loop);

    if config.verbose {
        eprintln!("Simulation complete!");
        eprintln!("  Total events: {}", stats.total_events);
        eprintln!("  Frames TX: {}", stats.frames_transmitted);
        eprintln!("  Frames RX ok: {}", stats.frames_received);
        eprintln!("  Frames RX error: {}", stats.frames_errored);
        eprintln!("  Wall time: {}ms", stats.wall_time_ms);
    }

    if let (Some(format), Some(recorder)) = (config.metrics_output, metrics_recorder) {
        let mut writer: Box<dyn Write> = match &config.metrics_file {
            Some(path) => Box::new(std::fs::File::create(path)?),
            None => Box::new(std::io::stdout()),
        };
        let snapshot = recorder.snapshot();
        match format {
            MetricsOutputFormat::Json => metrics_export::export_json(&snapshot, &mut writer)?,
            MetricsOutputFormat::Prometheus => metrics_export::export_prometheus(&snapshot, &mut writer)?,
        }
    }

    Ok(stats)
}

fn main() -> Result<(), RunnerError> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run(config) => {
            let metrics_to_stdout = config.metrics_output.is_some() && config.metrics_file.is_none();
            let stats = run_simulation(config)?;
            if !metrics_to_stdout {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }
        Commands::Metrics => print_metrics_info(),
        Commands::Properties => print_properties_info(),
    }

    Ok(())
}

/// Print information about all available metrics
fn print_metrics_info() {
    use wifisim_phy::metric_defs;

    println!("wifisim Available Metrics");
    println!("=========================\n");

    println!("All metrics carry the following labels:");
    println!("  - node: Node name (or \"channel\" for the medium)");
    println!("  - node_role: ap, sta or channel");
    println!();

    let categories = [
        ("PHY", "wifisim.phy."),
        ("Channel Medium", "wifisim.channel."),
        ("Traffic Agent", "wifisim.agent."),
    ];

    for (category_name, prefix) in categories {
        println!("## {}\n", category_name);

        for metric in metric_defs::ALL.iter().filter(|m| m.name.starts_with(prefix)) {
            println!("  {}", metric.name);
            println!("    Type: {}", metric.kind);
            let unit_str = metric.unit_str();
            if !unit_str.is_empty() {
                println!("    Unit: {}", unit_str);
            }
            if !metric.description.is_empty() {
                println!("    Description: {}", metric.description);
            }
            if !metric.labels.is_empty() {
                println!("    Extra labels: {}", metric.labels.join(", "));
            }
            println!();
        }
    }

    println!("## Usage Examples\n");
    println!("  # Run a scenario and export metrics as JSON:");
    println!("  wifisim run scenario.yaml --duration 2s --metrics-output json\n");
    println!("  # Export Prometheus text to a file:");
    println!("  wifisim run scenario.yaml --metrics-output prometheus --metrics-file out.prom\n");
}

/// Print information about all available properties
fn print_properties_info() {
    use std::collections::BTreeMap;
    use wifisim_model::{properties_by_scope, PropertyScope};

    println!("wifisim Available Properties");
    println!("============================\n");

    println!("Properties configure nodes and the simulation and are set in YAML files.\n");

    println!("## Property Resolution Order\n");
    println!("  1. Built-in code defaults (shown below)");
    println!("  2. `defaults` sections of the YAML files (in order loaded)");
    println!("  3. Explicit values on nodes (in order loaded)\n");

    let scopes = [
        (PropertyScope::Node, "Node Properties", "Set under `defaults` or on a node"),
        (PropertyScope::Simulation, "Simulation Properties", "Set under `simulation`"),
    ];

    for (scope, scope_name, scope_desc) in scopes {
        println!("## {}\n", scope_name);
        println!("{}\n", scope_desc);

        let mut props_by_ns: BTreeMap<&str, Vec<_>> = BTreeMap::new();
        for prop in properties_by_scope(scope) {
            props_by_ns.entry(prop.namespace().unwrap_or("(root)")).or_default().push(prop);
        }

        for (namespace, props) in props_by_ns {
            println!("### {}/\n", namespace);
            for prop in props {
                println!("  {}", prop.name);
                println!("    {}", prop.description);
                print!("    Default: {}", prop.default);
                if let Some(unit) = prop.unit {
                    print!(" {}", unit);
                }
                println!();
                if !prop.aliases.is_empty() {
                    println!("    Aliases: {}", prop.aliases.join(", "));
                }
                println!();
            }
        }
    }

    println!("## YAML Example\n");
    println!("```yaml");
    println!("defaults:");
    println!("  phy:");
    println!("    frequency_mhz: 5000");
    println!("    channel_number: 3640");
    println!("    active_channels: 3640");
    println!("    primary_channel: 36");
    println!("nodes:");
    println!("  - name: sta1");
    println!("    position: {{ x: 10.0, y: 0.0 }}");
    println!("    traffic:");
    println!("      enabled: true");
    println!("      destination: ap");
    println!("      mode: HtMcs7BW40MHz");
    println!("```\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from([
            "wifisim",
            "run",
            "base.yaml",
            "overlay.yaml",
            "--duration",
            "250ms",
            "--seed",
            "9",
            "--metrics-output",
            "prometheus",
        ]);
        let Commands::Run(config) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.duration, Some(0.25));
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.metrics_output, Some(MetricsOutputFormat::Prometheus));
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_cli_requires_scenario() {
        assert!(Cli::try_parse_from(["wifisim", "run"]).is_err());
    }

    #[test]
    fn test_parse_duration_plain_seconds() {
        assert_eq!(parse_duration("60").unwrap(), 60.0);
        assert_eq!(parse_duration("0.5").unwrap(), 0.5);
    }

    #[test]
    fn test_parse_duration_with_units() {
        assert_eq!(parse_duration("60s").unwrap(), 60.0);
        assert_eq!(parse_duration("10m").unwrap(), 600.0);
        assert_eq!(parse_duration("2h").unwrap(), 7200.0);
        assert_eq!(parse_duration("1d").unwrap(), 86400.0);
        assert!((parse_duration("20ms").unwrap() - 0.02).abs() < 1e-12);
        assert!((parse_duration("250us").unwrap() - 250e-6).abs() < 1e-15);
    }

    #[test]
    fn test_parse_duration_combined() {
        assert_eq!(parse_duration("1h30m").unwrap(), 5400.0);
        assert!((parse_duration("1s500ms").unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("h10").is_err());
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("").is_err());
    }
}
