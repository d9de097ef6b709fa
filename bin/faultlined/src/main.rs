//! ---
//! fl_section: "01-core-functionality"
//! fl_subsection: "binary"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Binary entrypoint for the Faultline daemon."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use faultline_common::config::AppConfig;
use faultline_common::logging::init_tracing;
use faultline_core::orchestrator::SimulationRuntime;
use faultline_metrics::{
    new_registry, spawn_http_server, ConfigSource, DaemonMetrics, SharedRegistry,
};
use faultline_net::{spawn_api_server, ApiServer, ApiState};
use tokio::signal;
use tracing::{info, warn};

const DEFAULT_CANDIDATES: [&str; 2] = ["configs/faultline.toml", "configs/example.dev.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Faultline service topology simulator",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, env = "PORT", help = "Override the API listen port")]
    port: Option<u16>,

    #[arg(long, help = "Seed the simulation RNG for reproducible runs")]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the simulator and serve the API")]
    Run,
    #[command(about = "Validate the configuration and print the topology")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let load_started = Instant::now();
    let (mut config, source) = load_config(cli.config.as_deref())?;
    let load_duration = load_started.elapsed();

    if let Some(port) = cli.port {
        config.api.listen.set_port(port);
    }
    if let Some(seed) = cli.seed {
        config.simulation.random_seed = Some(seed);
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let metrics_registry = new_registry();
            let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
            let config_source = if source.is_some() {
                ConfigSource::File
            } else {
                ConfigSource::Defaults
            };
            daemon_metrics.record_start(config_source, load_duration.as_secs_f64());
            daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), build_profile());

            init_tracing("faultlined", &config.logging)?;
            match &source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("no configuration file found; using built-in defaults"),
            }
            run_daemon(config, Some(metrics_registry)).await?
        }
        Commands::CheckConfig => {
            config.validate()?;
            render_topology(&config, source.as_deref());
        }
    }

    Ok(())
}

/// Resolve the configuration source.
///
/// An explicit `--config` path or `FAULTLINE_CONFIG` must load; the default
/// candidates are optional and fall back to the built-in topology.
fn load_config(explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let loaded = AppConfig::load_with_source(&[path])?;
        return Ok((loaded.config, Some(loaded.source)));
    }

    let env_override = std::env::var(AppConfig::ENV_CONFIG_PATH)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    let any_candidate = DEFAULT_CANDIDATES
        .iter()
        .any(|candidate| Path::new(candidate).exists());
    if !env_override && !any_candidate {
        return Ok((AppConfig::default(), None));
    }

    let loaded = AppConfig::load_with_source(&DEFAULT_CANDIDATES)?;
    Ok((loaded.config, Some(loaded.source)))
}

fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

async fn run_daemon(config: AppConfig, mut metrics_registry: Option<SharedRegistry>) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let api_settings = config.api.clone();

    let metrics_server = if metrics_settings.enabled {
        match metrics_registry.clone() {
            Some(registry) => {
                info!(address = %metrics_settings.listen, "metrics exporter enabled");
                Some(spawn_http_server(registry, metrics_settings.listen)?)
            }
            None => {
                warn!("metrics exporter requested but no registry available");
                None
            }
        }
    } else {
        metrics_registry = None;
        info!("metrics exporter disabled by configuration");
        None
    };

    let runtime = SimulationRuntime::new(config, metrics_registry);
    let handle = runtime.start().await?;

    let mut api_server: Option<ApiServer> = None;
    if api_settings.enabled {
        let static_dir = api_settings.static_dir.clone().and_then(|dir| {
            if dir.is_dir() {
                Some(dir)
            } else {
                warn!(static_dir = %dir.display(), "api static_dir not found; serving API without assets");
                None
            }
        });
        let state = Arc::new(ApiState::new(
            handle.registry(),
            handle.broadcaster(),
            handle.chaos(),
            handle.advisor(),
        ));
        match spawn_api_server(state, api_settings.listen, static_dir) {
            Ok(server) => {
                info!(address = %server.addr(), "api server listening");
                api_server = Some(server);
            }
            Err(err) => {
                warn!(error = %err, "failed to start api server");
            }
        }
    } else {
        info!("api server disabled by configuration");
    }

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    handle.shutdown().await?;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}

fn render_topology(config: &AppConfig, source: Option<&Path>) {
    let topology = &config.topology;
    match source {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: built-in defaults"),
    }
    println!(
        "Root dependency: {}",
        topology.root_dependency.as_deref().unwrap_or("none")
    );
    println!("Tick interval: {:?}", config.simulation.tick_interval);
    for (id, seed) in &topology.services {
        let dependencies = if seed.dependencies.is_empty() {
            "-".to_owned()
        } else {
            seed.dependencies.join(", ")
        };
        println!("  {id} ({}) -> {dependencies}", seed.name);
    }
}
