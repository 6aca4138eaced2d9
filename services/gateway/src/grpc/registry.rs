//! Service registry with periodic health monitoring.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::channel::Connector;
use super::manager::{ClientManager, ServiceHealth};
use crate::config::ServiceConfig;
use crate::error::GatewayError;
use crate::shutdown::ShutdownCoordinator;

/// Last known state of a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Backend address
    pub address: String,
    /// Health at the last check
    pub status: ServiceHealth,
    /// When the status was last updated
    pub last_check: DateTime<Utc>,
}

/// Registry of backend services and their last observed health.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<BTreeMap<String, ServiceInfo>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every service with an unknown status.
    pub fn register_services(&self, services: &[ServiceConfig]) {
        let now = Utc::now();
        let mut registered = self.services.write();
        for service in services {
            registered.insert(
                service.name.clone(),
                ServiceInfo {
                    name: service.name.clone(),
                    address: service.address.to_string(),
                    status: ServiceHealth::Unknown,
                    last_check: now,
                },
            );
        }
    }

    /// Snapshot of one service.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownService`] if `name` is not registered.
    pub fn get_service(&self, name: &str) -> Result<ServiceInfo, GatewayError> {
        self.services
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownService {
                service: name.to_string(),
            })
    }

    /// Snapshot of every service.
    #[must_use]
    pub fn all_services(&self) -> BTreeMap<String, ServiceInfo> {
        self.services.read().clone()
    }

    /// Record a health observation; unknown names are ignored.
    pub fn update_service_status(&self, name: &str, status: ServiceHealth) {
        if let Some(service) = self.services.write().get_mut(name) {
            service.status = status;
            service.last_check = Utc::now();
        }
    }

    /// Whether the service was healthy at its last check.
    #[must_use]
    pub fn is_service_healthy(&self, name: &str) -> bool {
        self.services
            .read()
            .get(name)
            .is_some_and(|s| s.status.is_healthy())
    }

    /// Names of the services that were healthy at their last check.
    #[must_use]
    pub fn healthy_services(&self) -> Vec<String> {
        self.services
            .read()
            .values()
            .filter(|s| s.status.is_healthy())
            .map(|s| s.name.clone())
            .collect()
    }

    /// Copy the manager's current health snapshot into the registry.
    pub fn refresh<C: Connector>(&self, manager: &ClientManager<C>) {
        for (name, status) in manager.health_check() {
            self.update_service_status(&name, status);
        }
    }

    /// Refresh from `manager` every `interval`, forever.
    ///
    /// The first refresh happens one interval after the call.
    pub async fn monitor_health<C: Connector>(&self, manager: &ClientManager<C>, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.refresh(manager);
            debug!(healthy = ?self.healthy_services(), "Service health refreshed");
        }
    }

    /// Run [`ServiceRegistry::monitor_health`] as a task owned by `coordinator`,
    /// so it stops on shutdown.
    pub fn start_health_monitoring<C: Connector>(
        self: &Arc<Self>,
        manager: Arc<ClientManager<C>>,
        interval: Duration,
        coordinator: &mut ShutdownCoordinator,
    ) {
        let registry = Arc::clone(self);
        info!(interval_secs = interval.as_secs(), "Starting service health monitoring");
        coordinator.spawn("health-monitor", async move {
            registry.monitor_health(&manager, interval).await;
        });
    }
}
