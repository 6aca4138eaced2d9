//! Service Registry Unit Tests
//!
//! Tests for registration, health refresh from the client manager and the
//! background monitoring task.

use std::sync::Arc;
use std::time::Duration;

use gateway::{GatewayError, ServiceHealth, ServiceRegistry, ShutdownCoordinator};
use rust_common::CancellationToken;

use crate::support::{Behavior, MockConnector, test_config, test_manager};

#[test]
fn test_register_services_starts_unknown() {
    let registry = ServiceRegistry::new();
    registry.register_services(&test_config().services);

    let services = registry.all_services();
    assert_eq!(services.len(), 4);
    assert!(services.values().all(|s| s.status == ServiceHealth::Unknown));
    assert_eq!(services["chat"].address, "http://chat-service:9090/");
    assert!(registry.healthy_services().is_empty());
}

#[test]
fn test_get_unknown_service() {
    let registry = ServiceRegistry::new();
    registry.register_services(&test_config().services);

    assert!(matches!(
        registry.get_service("billing"),
        Err(GatewayError::UnknownService { service }) if service == "billing"
    ));
}

#[test]
fn test_update_service_status() {
    let registry = ServiceRegistry::new();
    registry.register_services(&test_config().services);
    let before = registry.get_service("auth").unwrap().last_check;

    registry.update_service_status("auth", ServiceHealth::Healthy);
    registry.update_service_status("billing", ServiceHealth::Healthy);

    let auth = registry.get_service("auth").unwrap();
    assert_eq!(auth.status, ServiceHealth::Healthy);
    assert!(auth.last_check >= before);
    assert!(registry.is_service_healthy("auth"));
    assert!(!registry.is_service_healthy("billing"));
    assert_eq!(registry.all_services().len(), 4);
}

#[tokio::test]
async fn test_refresh_copies_manager_health() {
    let (manager, _) = test_manager(MockConnector::new().with("chat", Behavior::Refuse));
    let _ = manager.start(&CancellationToken::new()).await;

    let registry = ServiceRegistry::new();
    registry.register_services(manager.services());
    registry.refresh(&manager);

    assert_eq!(registry.healthy_services(), ["auth", "employee", "structure"]);
    assert_eq!(
        registry.get_service("chat").unwrap().status,
        ServiceHealth::Disconnected
    );
}

#[tokio::test]
async fn test_service_info_serializes() {
    let registry = ServiceRegistry::new();
    registry.register_services(&test_config().services);
    registry.update_service_status("auth", ServiceHealth::Healthy);

    let json = serde_json::to_value(registry.get_service("auth").unwrap()).unwrap();
    assert_eq!(json["name"], "auth");
    assert_eq!(json["status"], "healthy");
    assert!(json["last_check"].is_string());
}

#[tokio::test]
async fn test_health_monitoring_runs_until_shutdown() {
    let (manager, _) = test_manager(MockConnector::new());
    let manager = Arc::new(manager);
    manager.start(&CancellationToken::new()).await.unwrap();

    let registry = Arc::new(ServiceRegistry::new());
    registry.register_services(manager.services());

    let mut coordinator = ShutdownCoordinator::new();
    registry.start_health_monitoring(Arc::clone(&manager), Duration::from_millis(20), &mut coordinator);
    assert_eq!(coordinator.task_count(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.healthy_services().len(), 4);

    manager.stop().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.healthy_services().is_empty());

    let completion = coordinator.completion();
    coordinator.shutdown(Duration::from_secs(1)).await;
    assert!(*completion.borrow());
}
