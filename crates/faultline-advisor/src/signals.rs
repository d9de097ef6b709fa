//! ---
//! fl_section: "05-advisor"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Topology-level signals and the external predictor feature map."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use faultline_common::config::SloConfig;
use faultline_sim::{ServiceMap, Status};

/// Flat feature name → value map posted to the external predictor.
pub type FeatureMap = BTreeMap<String, f64>;

const EMPTY_TOPOLOGY_HEALTH: f64 = 99.9;
const CRITICAL_PATH_CAP_MS: f64 = 2000.0;
const PEAK_HOURS: std::ops::RangeInclusive<u32> = 9..=17;

/// Aggregate health indicators computed over the whole registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopologySignals {
    /// Mean availability, with `down` services counted as zero.
    pub dependency_health_score: f64,
    /// Likelihood that a root-dependency problem cascades, in [0, 1].
    pub cascade_risk: f64,
    pub slo_violation_count: u32,
    /// Highest service latency, capped.
    pub critical_path_latency: f64,
}

impl TopologySignals {
    pub fn compute(services: &ServiceMap, root: Option<&str>, slo: &SloConfig) -> Self {
        Self {
            dependency_health_score: dependency_health(services),
            cascade_risk: cascade_risk(services, root),
            slo_violation_count: slo_violations(services, slo),
            critical_path_latency: critical_path_latency(services),
        }
    }
}

pub fn dependency_health(services: &ServiceMap) -> f64 {
    if services.is_empty() {
        return EMPTY_TOPOLOGY_HEALTH;
    }
    let total: f64 = services
        .values()
        .map(|service| match service.status {
            Status::Down => 0.0,
            _ => service.availability,
        })
        .sum();
    total / services.len() as f64
}

pub fn cascade_risk(services: &ServiceMap, root: Option<&str>) -> f64 {
    let Some(root) = root.and_then(|id| services.get(id)) else {
        return 0.0;
    };
    if root.status == Status::Down || root.availability == 0.0 {
        return 1.0;
    }
    // Hundredths keep the sums exact.
    let mut score = 0u32;
    if root.cpu > 80.0 {
        score += 40;
    }
    if root.error_rate > 5.0 {
        score += 30;
    }
    if root.availability < 95.0 {
        score += 30;
    }
    f64::from(score.min(100)) / 100.0
}

/// Each crossed threshold on each service counts once.
pub fn slo_violations(services: &ServiceMap, slo: &SloConfig) -> u32 {
    services
        .values()
        .map(|service| {
            [
                service.latency > slo.latency_ms,
                service.availability < slo.availability,
                service.error_rate > slo.error_rate,
                service.throughput < slo.throughput,
            ]
            .into_iter()
            .filter(|crossed| *crossed)
            .count() as u32
        })
        .sum()
}

pub fn critical_path_latency(services: &ServiceMap) -> f64 {
    let max = services
        .values()
        .map(|service| service.latency)
        .max()
        .unwrap_or(0);
    f64::from(max).min(CRITICAL_PATH_CAP_MS)
}

/// Build the feature map for the external predictor at instant `now`.
pub fn feature_map<Tz: TimeZone>(
    services: &ServiceMap,
    root: Option<&str>,
    slo: &SloConfig,
    now: &DateTime<Tz>,
) -> FeatureMap {
    let mut features = FeatureMap::new();
    let hour = now.hour();
    let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    features.insert("hour_of_day".into(), f64::from(hour));
    features.insert("is_peak_hour".into(), flag(PEAK_HOURS.contains(&hour)));
    features.insert("is_weekend".into(), flag(weekend));

    for (id, service) in services {
        let prefix = id.replace('-', "_");
        features.insert(format!("{prefix}_cpu"), service.cpu);
        features.insert(format!("{prefix}_memory"), service.memory);
        features.insert(format!("{prefix}_latency"), f64::from(service.latency));
        features.insert(format!("{prefix}_availability"), service.availability);
        features.insert(format!("{prefix}_error_rate"), service.error_rate);
        features.insert(format!("{prefix}_throughput"), f64::from(service.throughput));
    }

    let signals = TopologySignals::compute(services, root, slo);
    features.insert(
        "dependency_health_score".into(),
        signals.dependency_health_score,
    );
    features.insert("cascade_risk".into(), signals.cascade_risk);
    features.insert(
        "slo_violation_count".into(),
        f64::from(signals.slo_violation_count),
    );
    features.insert(
        "critical_path_latency".into(),
        signals.critical_path_latency,
    );
    features
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faultline_common::config::TopologyConfig;
    use faultline_sim::ServiceRegistry;

    fn services() -> ServiceMap {
        ServiceRegistry::from_topology(&TopologyConfig::default(), Some(1)).snapshot()
    }

    #[test]
    fn empty_topology_is_neutral() {
        let empty = ServiceMap::new();
        let signals = TopologySignals::compute(&empty, Some("database"), &SloConfig::default());
        assert_eq!(signals.dependency_health_score, 99.9);
        assert_eq!(signals.cascade_risk, 0.0);
        assert_eq!(signals.slo_violation_count, 0);
        assert_eq!(signals.critical_path_latency, 0.0);
    }

    #[test]
    fn down_services_count_as_zero_health() {
        let mut services = services();
        for service in services.values_mut() {
            service.availability = 100.0;
        }
        services["auth-service"].force_down();
        assert_eq!(dependency_health(&services), 75.0);
    }

    #[test]
    fn cascade_risk_follows_root_metrics() {
        let mut services = services();
        assert_eq!(cascade_risk(&services, Some("database")), 0.0);
        assert_eq!(cascade_risk(&services, None), 0.0);

        let database = &mut services["database"];
        database.cpu = 85.0;
        database.error_rate = 6.0;
        assert_eq!(cascade_risk(&services, Some("database")), 0.7);

        services["database"].availability = 90.0;
        assert_eq!(cascade_risk(&services, Some("database")), 1.0);

        services["database"].force_down();
        assert_eq!(cascade_risk(&services, Some("database")), 1.0);
    }

    #[test]
    fn slo_violations_use_configured_thresholds() {
        let services = services();
        let strict = SloConfig::default();
        let counted = slo_violations(&services, &strict);
        // auth-service availability 99.8 is the only default violation.
        assert_eq!(counted, 1);

        let latency_only = SloConfig {
            latency_ms: 100,
            availability: 0.0,
            error_rate: 100.0,
            throughput: 0,
        };
        // Every seed latency exceeds 100 ms.
        assert_eq!(slo_violations(&services, &latency_only), 4);
    }

    #[test]
    fn critical_path_latency_is_capped() {
        let mut services = services();
        assert_eq!(critical_path_latency(&services), 250.0);
        services["database"].latency = 9999;
        assert_eq!(critical_path_latency(&services), 2000.0);
    }

    #[test]
    fn feature_map_carries_time_service_and_topology_features() {
        let services = services();
        // 2024-06-08 was a Saturday.
        let now = Utc.with_ymd_and_hms(2024, 6, 8, 10, 30, 0).unwrap();
        let features = feature_map(&services, Some("database"), &SloConfig::default(), &now);

        assert_eq!(features["hour_of_day"], 10.0);
        assert_eq!(features["is_peak_hour"], 1.0);
        assert_eq!(features["is_weekend"], 1.0);
        assert_eq!(features["api_gateway_latency"], 250.0);
        assert_eq!(features["user_service_throughput"], 115.0);
        assert_eq!(features["critical_path_latency"], 250.0);
        assert!(features.contains_key("dependency_health_score"));
        assert!(features.contains_key("cascade_risk"));
        assert!(features.contains_key("slo_violation_count"));
        assert_eq!(features.len(), 3 + 4 * 6 + 4);

        let evening = Utc.with_ymd_and_hms(2024, 6, 10, 18, 0, 0).unwrap();
        let features = feature_map(&services, None, &SloConfig::default(), &evening);
        assert_eq!(features["is_peak_hour"], 0.0);
        assert_eq!(features["is_weekend"], 0.0);
    }
}
