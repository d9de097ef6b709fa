//! ---
//! fl_section: "05-advisor"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Local rule-based incident prediction."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use faultline_sim::{Service, ServiceMap, Status};

use crate::prediction::{Prediction, RiskLevel, FALLBACK_MODEL_VERSION};

const SERVICE_CONFIDENCE: f64 = 0.75;
const SYSTEM_CONFIDENCE: f64 = 0.80;
const SYSTEM_NAME: &str = "system";

/// Probability contributions in hundredths, evaluated in order. The first
/// triggered rule names the incident type.
const SERVICE_RULES: [(fn(&Service) -> bool, u32, &str); 4] = [
    (|s: &Service| s.cpu > 85.0, 30, "cpu_overload"),
    (|s: &Service| s.memory > 90.0, 30, "memory_leak"),
    (|s: &Service| s.error_rate > 5.0, 20, "high_errors"),
    (|s: &Service| s.latency > 1000, 20, "high_latency"),
];
const BASE_SCORE: u32 = 10;

fn recommendation(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Critical => "Critical! Immediate action required!",
        RiskLevel::High => "High risk. Scale resources.",
        RiskLevel::Medium => "Monitor closely.",
        RiskLevel::Low => "System stable",
    }
}

/// Score a single service against the local rules.
pub fn predict_service(id: &str, service: &Service) -> Prediction {
    if service.status == Status::Down {
        return Prediction {
            service_name: id.to_owned(),
            incident_probability: 0.99,
            risk_level: RiskLevel::Critical,
            confidence: SERVICE_CONFIDENCE,
            predicted_incident_type: "service_failure".into(),
            recommendation: "Service is down! Immediate action required!".into(),
            model_version: FALLBACK_MODEL_VERSION.into(),
        };
    }

    let mut score = BASE_SCORE;
    let mut incident = None;
    for (triggered, weight, kind) in SERVICE_RULES {
        if triggered(service) {
            score += weight;
            incident.get_or_insert(kind);
        }
    }

    let probability = f64::from(score.min(100)) / 100.0;
    let risk = RiskLevel::from_probability(probability);
    Prediction {
        service_name: id.to_owned(),
        incident_probability: probability,
        risk_level: risk,
        confidence: SERVICE_CONFIDENCE,
        predicted_incident_type: incident.unwrap_or("none").into(),
        recommendation: recommendation(risk).into(),
        model_version: FALLBACK_MODEL_VERSION.into(),
    }
}

/// System-wide estimate from average CPU and error rate.
pub fn predict_system(services: &ServiceMap) -> Prediction {
    let count = services.len();
    let any_down = services.values().any(|s| s.status == Status::Down);
    let (avg_cpu, avg_error_rate) = if count == 0 {
        (0.0, 0.0)
    } else {
        let cpu: f64 = services.values().map(|s| s.cpu).sum();
        let errors: f64 = services.values().map(|s| s.error_rate).sum();
        (cpu / count as f64, errors / count as f64)
    };

    let (probability, risk) = if any_down {
        (0.95, RiskLevel::Critical)
    } else if avg_cpu > 70.0 || avg_error_rate > 3.0 {
        (0.5, RiskLevel::Medium)
    } else {
        (0.1, RiskLevel::Low)
    };

    Prediction {
        service_name: SYSTEM_NAME.into(),
        incident_probability: probability,
        risk_level: risk,
        confidence: SYSTEM_CONFIDENCE,
        predicted_incident_type: "system_health".into(),
        recommendation: "System monitoring".into(),
        model_version: FALLBACK_MODEL_VERSION.into(),
    }
}
