use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the taxi geofencing workspace",
    long_about = "A unified CLI for running the fleet simulation and CI checks\n\
                  in the taxi geofencing workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in five-taxi fleet
    Run {
        /// TOML configuration file
        #[arg(long)]
        config: Option<String>,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 60)]
        duration_secs: u64,
        /// Use the ArcGIS zone provider build
        #[arg(long)]
        arcgis: bool,
    },
    /// Run the fleet_core test suite
    Test,
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build and test with the ArcGIS provider enabled
    Arcgis,
    /// Run check + arcgis
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&["clippy", "--all-targets", "--", "-D", "warnings"]);

    step("Test fleet_core");
    run_cargo(&["test", "-p", "fleet_core"]);
}

fn ci_arcgis() {
    step("Clippy with ArcGIS provider");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--features",
        "fleet_core/arcgis",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test fleet_core with ArcGIS provider");
    run_cargo(&["test", "-p", "fleet_core", "--features", "arcgis"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration_secs,
            arcgis,
        } => {
            let duration = duration_secs.to_string();
            let mut args = vec!["run", "-p", "fleet_runner", "--release"];
            if arcgis {
                args.extend(["--features", "arcgis"]);
            }
            args.extend(["--", "--duration-secs", duration.as_str()]);
            if let Some(path) = config.as_deref() {
                args.extend(["--config", path]);
            }
            run_cargo(&args);
        }
        Commands::Test => {
            run_cargo(&["test", "-p", "fleet_core"]);
        }
        Commands::Ci { job } => match job {
            CiJob::Check => ci_check(),
            CiJob::Arcgis => ci_arcgis(),
            CiJob::All => {
                ci_check();
                ci_arcgis();
            }
        },
    }
}
