//! ---
//! fl_section: "01-core-functionality"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Shared primitives and utilities for the simulation runtime."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_subscriber_buffer() -> usize {
    32
}

fn default_predictor_enabled() -> bool {
    true
}

fn default_predictor_endpoint() -> String {
    "http://localhost:5001/predict".to_owned()
}

fn default_predictor_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_slo_latency_ms() -> u32 {
    500
}

fn default_slo_availability() -> f64 {
    99.9
}

fn default_slo_error_rate() -> f64 {
    1.0
}

fn default_slo_throughput() -> u32 {
    100
}

/// Primary configuration object for the Faultline runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub slo: SloConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "FAULTLINE_CONFIG";

    /// Load configuration from disk, respecting the `FAULTLINE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.topology.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            static_dir: Some(PathBuf::from("static")),
        }
    }
}

/// Drift loop and fan-out tuning.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub tick_interval: Duration,
    /// Fixed seed for reproducible drift and baseline draws. Entropy when unset.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Snapshots buffered per subscriber before it is dropped as too slow.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            random_seed: None,
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("simulation tick_interval must be greater than zero"));
        }
        if self.subscriber_buffer == 0 {
            return Err(anyhow!(
                "simulation subscriber_buffer must be greater than zero"
            ));
        }
        Ok(())
    }
}

/// Initial metrics and wiring for one simulated service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSeed {
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
    pub latency: u32,
    pub availability: f64,
    pub error_rate: f64,
    pub throughput: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Service topology; declaration order is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Service every other service transitively depends on. Faults here cascade.
    #[serde(default)]
    pub root_dependency: Option<String>,
    #[serde(default)]
    pub services: IndexMap<String, ServiceSeed>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let mut services = IndexMap::new();
        services.insert(
            "api-gateway".to_owned(),
            ServiceSeed {
                name: "API Gateway".to_owned(),
                cpu: 35.0,
                memory: 45.0,
                latency: 250,
                availability: 99.9,
                error_rate: 0.5,
                throughput: 120,
                dependencies: vec!["auth-service".to_owned(), "user-service".to_owned()],
            },
        );
        services.insert(
            "auth-service".to_owned(),
            ServiceSeed {
                name: "Auth Service".to_owned(),
                cpu: 30.0,
                memory: 40.0,
                latency: 150,
                availability: 99.8,
                error_rate: 0.8,
                throughput: 110,
                dependencies: vec!["database".to_owned()],
            },
        );
        services.insert(
            "user-service".to_owned(),
            ServiceSeed {
                name: "User Service".to_owned(),
                cpu: 25.0,
                memory: 35.0,
                latency: 120,
                availability: 99.9,
                error_rate: 0.3,
                throughput: 115,
                dependencies: vec!["database".to_owned()],
            },
        );
        services.insert(
            "database".to_owned(),
            ServiceSeed {
                name: "Database".to_owned(),
                cpu: 40.0,
                memory: 60.0,
                latency: 180,
                availability: 99.95,
                error_rate: 0.2,
                throughput: 100,
                dependencies: Vec::new(),
            },
        );
        Self {
            root_dependency: Some("database".to_owned()),
            services,
        }
    }
}

impl TopologyConfig {
    pub fn validate(&self) -> Result<()> {
        for (id, seed) in &self.services {
            for dependency in &seed.dependencies {
                if !self.services.contains_key(dependency) {
                    return Err(anyhow!(
                        "service '{}' depends on undeclared service '{}'",
                        id,
                        dependency
                    ));
                }
            }
        }

        let Some(root) = &self.root_dependency else {
            return Ok(());
        };
        if !self.services.contains_key(root) {
            return Err(anyhow!(
                "root_dependency '{}' is not a declared service",
                root
            ));
        }
        for id in self.services.keys() {
            if id != root && !self.reaches(id, root) {
                return Err(anyhow!(
                    "service '{}' does not depend on root '{}' through any dependency chain",
                    id,
                    root
                ));
            }
        }
        Ok(())
    }

    fn reaches(&self, from: &str, target: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(seed) = self.services.get(current) else {
                continue;
            };
            for dependency in &seed.dependencies {
                if dependency == target {
                    return true;
                }
                stack.push(dependency.as_str());
            }
        }
        false
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    #[serde(default = "default_predictor_enabled")]
    pub enabled: bool,
    #[serde(default = "default_predictor_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_predictor_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            enabled: default_predictor_enabled(),
            endpoint: default_predictor_endpoint(),
            timeout: default_predictor_timeout(),
        }
    }
}

/// Service-level thresholds; crossing any of them counts as one violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SloConfig {
    #[serde(default = "default_slo_latency_ms")]
    pub latency_ms: u32,
    #[serde(default = "default_slo_availability")]
    pub availability: f64,
    #[serde(default = "default_slo_error_rate")]
    pub error_rate: f64,
    #[serde(default = "default_slo_throughput")]
    pub throughput: u32,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_slo_latency_ms(),
            availability: default_slo_availability(),
            error_rate: default_slo_error_rate(),
            throughput: default_slo_throughput(),
        }
    }
}
