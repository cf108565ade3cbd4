use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fleet_core::config::EngineConfig;
use fleet_core::GeofenceEngine;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Run the taxi fleet simulation and log zone transitions.
#[derive(Parser, Debug)]
#[command(name = "fleet_runner", about)]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, env = "FLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many seconds. Runs until Ctrl-C when omitted.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// How often to log a fleet status summary.
    #[arg(long, default_value_t = 10)]
    report_every_secs: u64,

    /// Override the configured tick interval.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Print the final fleet snapshot and recent events as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn load_config(args: &Args) -> Result<EngineConfig, String> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
        config.validate().map_err(|e| e.to_string())?;
    }
    Ok(config)
}

fn log_status(engine: &GeofenceEngine) {
    let snapshot = engine.get_status();
    for agent in &snapshot.agents {
        info!(
            agent_id = %agent.id,
            leg = agent.leg_index,
            progress = agent.progress,
            status = ?agent.status,
            zone = agent.current_zone.as_deref().unwrap_or("-"),
            "agent status"
        );
    }
    let stats = engine.classifier_stats();
    info!(
        lookups = stats.lookups,
        cache_hits = stats.cache_hits,
        provider_calls = stats.provider_calls,
        degraded = stats.degraded,
        events = engine.recent_events(usize::MAX).len(),
        "classifier stats"
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(reason) => {
            error!(%reason, "invalid configuration");
            std::process::exit(2);
        }
    };
    let engine = match GeofenceEngine::build(config) {
        Ok(engine) => engine,
        Err(reason) => {
            error!(%reason, "failed to build engine");
            std::process::exit(1);
        }
    };

    if let Err(reason) = engine.start_simulation().await {
        error!(%reason, "failed to start simulation");
        std::process::exit(1);
    }

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut report = tokio::time::interval(Duration::from_secs(args.report_every_secs.max(1)));
    report.tick().await;

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("run duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    error!(%error, "failed to listen for Ctrl-C");
                }
                info!("interrupted");
                break;
            }
            _ = report.tick() => log_status(&engine),
        }
    }

    engine.stop_simulation().await;
    log_status(&engine);

    if args.json {
        let output = serde_json::json!({
            "fleet": engine.get_status(),
            "events": engine.recent_events(usize::MAX),
            "classifier": engine.classifier_stats(),
        });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(error) => error!(%error, "failed to serialize final snapshot"),
        }
    }
}
