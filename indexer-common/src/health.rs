use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::Duration;
use tracing::{info, warn};

/// Health reporting for the long-running loops of a service.
///
/// Each loop registers a component and must report healthy more often than its deadline.
/// The process is healthy only if every registered component reported healthy recently;
/// a registry with no components is unhealthy.
#[derive(Default, Debug)]
pub struct HealthStatus {
    /// The overall status: true of all components are healthy
    pub healthy: bool,
    /// Current status of each registered component, for display
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    /// Computes the axum status code based on the overall health status,
    /// and prints each component status in the body for debugging.
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered
    Starting,
    /// Recently reported healthy, will need to report again before the date
    HealthyUntil(time::OffsetDateTime),
    /// Reported unhealthy
    Unhealthy,
    /// Automatically set when the HealthyUntil deadline is reached
    Stalled,
}

type Components = Arc<RwLock<HashMap<String, ComponentStatus>>>;

pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Components,
}

impl HealthHandle {
    /// Report healthy. Must be called more frequently than the configured deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            time::OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut map) => {
                _ = map.insert(self.component.clone(), status);
            }
            // Poisoned lock: liveness reports unhealthy and the process restarts
            Err(_) => warn!("poisoned HealthRegistry lock"),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Components,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Registers a new component in the registry. The returned handle should be passed
    /// to the component, to allow it to frequently report its health status.
    pub fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Returns the overall process status. Can be used as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let Ok(components) = self.components.read() else {
            warn!("{} health check failed: poisoned lock", self.name);
            return HealthStatus::default();
        };

        let now = time::OffsetDateTime::now_utc();
        let mut result = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };

        for (name, status) in components.iter() {
            let status = match status {
                ComponentStatus::HealthyUntil(until) if *until > now => status.clone(),
                ComponentStatus::HealthyUntil(_) => ComponentStatus::Stalled,
                other => other.clone(),
            };
            if !matches!(status, ComponentStatus::HealthyUntil(_)) {
                result.healthy = false;
            }
            _ = result.components.insert(name.clone(), status);
        }

        match result.healthy {
            true => info!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, result.components),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Sub;
    use time::OffsetDateTime;

    #[test]
    fn defaults_to_unhealthy() {
        let registry = HealthRegistry::new("liveness");
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn one_component() {
        let registry = HealthRegistry::new("liveness");

        // New components are registered in Starting
        let handle = registry.register("worker".to_string(), Duration::seconds(30));
        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("worker"),
            Some(&ComponentStatus::Starting)
        );

        // Status goes healthy once the component reports
        handle.report_healthy();
        assert!(registry.get_status().healthy);

        // Status goes unhealthy if the components says so
        handle.report_status(ComponentStatus::Unhealthy);
        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("worker"),
            Some(&ComponentStatus::Unhealthy)
        );
    }

    #[test]
    fn staleness_check() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("worker".to_string(), Duration::seconds(30));

        handle.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().sub(Duration::seconds(1)),
        ));
        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("worker"),
            Some(&ComponentStatus::Stalled)
        );
    }

    #[test]
    fn several_components() {
        let registry = HealthRegistry::new("liveness");
        let handle1 = registry.register("one".to_string(), Duration::seconds(30));
        let handle2 = registry.register("two".to_string(), Duration::seconds(30));

        // First component going healthy is not enough
        handle1.report_healthy();
        assert!(!registry.get_status().healthy);

        handle2.report_healthy();
        assert!(registry.get_status().healthy);

        handle1.report_status(ComponentStatus::Unhealthy);
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn into_response() {
        let nok = HealthStatus::default().into_response();
        assert_eq!(nok.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let ok = HealthStatus {
            healthy: true,
            components: Default::default(),
        }
        .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
    }
}
