//! ---
//! fl_section: "04-resilience"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Prometheus metrics for chaos injection."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use anyhow::Result;
use faultline_metrics::SharedRegistry;
use prometheus::{IntCounter, IntCounterVec, Opts};

/// Metrics published by the chaos engine.
#[derive(Clone)]
pub struct ChaosMetrics {
    registry: SharedRegistry,
    injections_total: IntCounterVec,
    expirations_total: IntCounter,
    resets_total: IntCounter,
}

impl ChaosMetrics {
    /// Register the chaos metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let injections_total = IntCounterVec::new(
            Opts::new(
                "faultline_chaos_injections_total",
                "Chaos injections accepted, by fault type",
            ),
            &["fault"],
        )?;
        registry.register(Box::new(injections_total.clone()))?;

        let expirations_total = IntCounter::with_opts(Opts::new(
            "faultline_chaos_expirations_total",
            "Chaos records cleared by their expiry timer",
        ))?;
        registry.register(Box::new(expirations_total.clone()))?;

        let resets_total = IntCounter::with_opts(Opts::new(
            "faultline_chaos_resets_total",
            "Full registry resets requested",
        ))?;
        registry.register(Box::new(resets_total.clone()))?;

        Ok(Self {
            registry,
            injections_total,
            expirations_total,
            resets_total,
        })
    }

    /// Expose the underlying shared registry.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Count one injection of `fault`.
    pub fn inc_injection(&self, fault: &str) {
        self.injections_total.with_label_values(&[fault]).inc();
    }

    /// Count one expiry that actually cleared a chaos record.
    pub fn inc_expiration(&self) {
        self.expirations_total.inc();
    }

    /// Count one full reset.
    pub fn inc_reset(&self) {
        self.resets_total.inc();
    }
}

impl std::fmt::Debug for ChaosMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosMetrics").finish_non_exhaustive()
    }
}
