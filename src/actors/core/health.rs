use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Health Check Abstractions
// ============================================================================
//
// Anything the supervisor owns can describe its own health; the monitor
// aggregates those reports without knowing what produced them.
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded(_))
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Implemented by components that can report their own health
pub trait HealthCheckable {
    fn check_health(&self) -> ComponentHealth;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Degraded("stopped".to_string()).is_degraded());
        assert!(HealthStatus::Unhealthy("crashed".to_string()).is_unhealthy());
        assert!(!HealthStatus::Healthy.is_unhealthy());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(HealthStatus::Degraded("stopped".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "degraded", "reason": "stopped" }));

        let json = serde_json::to_value(HealthStatus::Healthy).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "healthy" }));
    }

    #[test]
    fn test_component_health_details() {
        let health = ComponentHealth::new("trainer", HealthStatus::Healthy).with_details("pid 42");
        assert_eq!(health.name, "trainer");
        assert_eq!(health.details.as_deref(), Some("pid 42"));
    }
}
