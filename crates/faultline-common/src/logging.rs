//! ---
//! fl_section: "01-core-functionality"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Tracing subscriber setup for the Faultline daemon."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "FAULTLINE_LOG";
const RUST_LOG_ENV: &str = "RUST_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Stdout format; the rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Pick the filter directive: `FAULTLINE_LOG`, then `RUST_LOG`, then `info`.
/// Blank values are ignored.
pub fn filter_directive(faultline_log: Option<&str>, rust_log: Option<&str>) -> String {
    [faultline_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directive| !directive.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVE)
        .to_owned()
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!("invalid log directive '{directive}' ({err}); defaulting to {DEFAULT_DIRECTIVE}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

/// Install the global subscriber: stdout in the configured format plus a
/// daily rolling `<prefix>.log` JSON file under `config.directory`.
///
/// A second call keeps the first subscriber; the writer guards live for the
/// whole process.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "failed to create log directory {}",
            config.directory.display()
        )
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let directive = filter_directive(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var(RUST_LOG_ENV).ok().as_deref(),
    );

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(build_filter(&directive))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        let _ = FILE_GUARD.set(file_guard);
        let _ = STDOUT_GUARD.set(stdout_guard);
        info!(
            service = %service_name,
            log_dir = %config.directory.display(),
            format = ?config.format,
            filter = %directive,
            "tracing initialised"
        );
    } else {
        debug!(service = %service_name, "global subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faultline_directive_wins_over_rust_log() {
        assert_eq!(
            filter_directive(Some("debug,faultline_sim=trace"), Some("warn")),
            "debug,faultline_sim=trace"
        );
        assert_eq!(filter_directive(None, Some("warn")), "warn");
        assert_eq!(filter_directive(Some("  "), Some("warn")), "warn");
        assert_eq!(filter_directive(None, None), "info");
        assert_eq!(filter_directive(Some(""), Some("")), "info");
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::StructuredJson,
            file_prefix: Some("test".into()),
        };
        init_tracing("faultlined", &config).unwrap();
        assert!(config.directory.is_dir());
        // Repeated initialisation is harmless.
        init_tracing("faultlined", &config).unwrap();
    }

    #[test]
    fn log_format_uses_kebab_case() {
        let config: LoggingConfig = toml::from_str("format = \"structured-json\"").unwrap();
        assert_eq!(config.format, LogFormat::StructuredJson);
    }
}
