//! Client Manager Unit Tests
//!
//! Tests for parallel startup, partial failure, client lookup, exactly-once
//! close and the health snapshot.

use std::sync::atomic::Ordering;
use std::time::Duration;

use gateway::{ChannelHandle, ConnectivityState, GatewayError, ServiceHealth};
use rust_common::{CancellationToken, PlatformError};

use crate::support::{Behavior, MockConnector, test_manager};

#[tokio::test]
async fn test_start_connects_every_service() {
    let (manager, _) = test_manager(MockConnector::new());

    manager.start(&CancellationToken::new()).await.unwrap();

    let health = manager.health_check();
    assert_eq!(health.len(), 4);
    assert!(health.values().all(|h| *h == ServiceHealth::Healthy));
    for name in ["auth", "chat", "employee", "structure"] {
        assert_eq!(manager.get_client(name).unwrap().service(), name);
    }
}

#[tokio::test]
async fn test_partial_startup_keeps_reachable_services() {
    let (manager, _) = test_manager(MockConnector::new().with("chat", Behavior::Refuse));

    let err = manager.start(&CancellationToken::new()).await.unwrap_err();

    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        GatewayError::Connect { service, source: PlatformError::Transport(_), .. } if service == "chat"
    ));

    assert!(manager.get_client("auth").is_ok());
    assert!(matches!(
        manager.get_client("chat"),
        Err(GatewayError::ServiceUnavailable { service }) if service == "chat"
    ));
    assert_eq!(manager.health_check()["chat"], ServiceHealth::Disconnected);
    assert_eq!(manager.health_check()["auth"], ServiceHealth::Healthy);
}

#[tokio::test]
async fn test_startup_reports_every_failed_service() {
    let connector = MockConnector::new()
        .with("auth", Behavior::Refuse)
        .with("structure", Behavior::Refuse);
    let (manager, _) = test_manager(connector);

    let err = manager.start(&CancellationToken::new()).await.unwrap_err();

    let failed: Vec<_> = err.failures().iter().filter_map(GatewayError::service).collect();
    assert_eq!(failed, ["auth", "structure"]);
    let message = err.to_string();
    assert!(message.contains("auth"));
    assert!(message.contains("structure"));
}

#[tokio::test]
async fn test_start_twice_rejected() {
    let (manager, _) = test_manager(MockConnector::new());
    let cancel = CancellationToken::new();

    manager.start(&cancel).await.unwrap();
    assert!(matches!(
        manager.start(&cancel).await,
        Err(GatewayError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_cancelled_start_fails_pending_connects() {
    let (manager, _) = test_manager(MockConnector::new().with("employee", Behavior::Hang));
    let cancel = CancellationToken::new();

    let (result, ()) = tokio::join!(manager.start(&cancel), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let err = result.unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert!(matches!(
        &err.failures()[0],
        GatewayError::Connect { service, source: PlatformError::Cancelled, .. } if service == "employee"
    ));
    assert!(manager.get_client("auth").is_ok());
}

#[tokio::test]
async fn test_unknown_service() {
    let (manager, _) = test_manager(MockConnector::new());
    manager.start(&CancellationToken::new()).await.unwrap();

    assert!(matches!(
        manager.get_client("billing"),
        Err(GatewayError::UnknownService { service }) if service == "billing"
    ));
}

#[tokio::test]
async fn test_stop_closes_each_channel_once() {
    let connector = MockConnector::new();
    let closes = connector.close_counter();
    let (manager, _) = test_manager(connector);
    manager.start(&CancellationToken::new()).await.unwrap();

    manager.stop().unwrap();
    manager.stop().unwrap();

    assert_eq!(closes.load(Ordering::SeqCst), 4);
    assert!(manager.health_check().values().all(|h| *h == ServiceHealth::Disconnected));
    assert!(matches!(manager.get_client("auth"), Err(GatewayError::ManagerClosed)));
    assert!(matches!(
        manager.start(&CancellationToken::new()).await,
        Err(GatewayError::ManagerClosed)
    ));
}

#[tokio::test]
async fn test_stop_aggregates_close_errors() {
    let connector = MockConnector::new()
        .with("auth", Behavior::FailOnClose)
        .with("structure", Behavior::FailOnClose);
    let closes = connector.close_counter();
    let (manager, _) = test_manager(connector);
    manager.start(&CancellationToken::new()).await.unwrap();

    let err = manager.stop().unwrap_err();

    assert!(matches!(err, GatewayError::Shutdown { .. }));
    let failed: Vec<_> = err.failures().iter().filter_map(GatewayError::service).collect();
    assert_eq!(failed, ["auth", "structure"]);
    assert_eq!(closes.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_stop_skips_services_that_never_connected() {
    let connector = MockConnector::new().with("chat", Behavior::Refuse);
    let closes = connector.close_counter();
    let (manager, _) = test_manager(connector);
    let _ = manager.start(&CancellationToken::new()).await;

    manager.stop().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_stop_before_start() {
    let (manager, _) = test_manager(MockConnector::new());
    manager.stop().unwrap();
    assert!(matches!(manager.get_client("auth"), Err(GatewayError::ManagerClosed)));
}

#[tokio::test]
async fn test_health_reflects_channel_state() {
    let (manager, _) = test_manager(MockConnector::new());
    manager.start(&CancellationToken::new()).await.unwrap();

    let client = manager.get_client("employee").unwrap();
    client.channel().observe(Some(&PlatformError::transport("connection reset")));

    let health = manager.health_check();
    assert_eq!(
        health["employee"],
        ServiceHealth::Unhealthy(ConnectivityState::TransientFailure)
    );
    assert_eq!(health["employee"].to_string(), "unhealthy: TRANSIENT_FAILURE");
    assert!(health["auth"].is_healthy());
}

#[tokio::test]
async fn test_health_snapshot_serializes() {
    let (manager, _) = test_manager(MockConnector::new().with("chat", Behavior::Refuse));
    let _ = manager.start(&CancellationToken::new()).await;

    let json = serde_json::to_value(manager.health_check()).unwrap();
    assert_eq!(json["auth"], "healthy");
    assert_eq!(json["chat"], "disconnected");
}

#[tokio::test]
async fn test_breakers_built_once_per_service() {
    let (manager, _) = test_manager(MockConnector::new());

    let before = manager.breaker("chat").unwrap();
    manager.start(&CancellationToken::new()).await.unwrap();
    let after = manager.breaker("chat").unwrap();

    assert!(std::sync::Arc::ptr_eq(&before, &after));
    assert!(!std::sync::Arc::ptr_eq(&after, &manager.breaker("auth").unwrap()));
    assert_eq!(manager.service_names().collect::<Vec<_>>(), ["auth", "chat", "employee", "structure"]);
}
