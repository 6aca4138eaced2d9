//! Configuration Unit Tests
//!
//! Tests that environment settings flow through to the client manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gateway::{ClientManager, Config, ConfigError};
use rust_common::CancellationToken;
use test_utils::{RecordingSleeper, ScriptedOperation, Step};

use crate::support::MockConnector;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_services_in_fixed_order() {
    let config = Config::from_lookup(lookup(&[])).unwrap();
    let names: Vec<_> = config.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["auth", "chat", "employee", "structure"]);
    assert!(config.service("billing").is_none());
}

#[test]
fn test_address_without_scheme() {
    let config = Config::from_lookup(lookup(&[("AUTH_SERVICE_ADDRESS", "10.0.0.5:7000")])).unwrap();
    let auth = config.service("auth").unwrap();
    assert_eq!(auth.address.scheme(), "http");
    assert_eq!(auth.address.port(), Some(7000));
}

#[test]
fn test_blank_values_use_defaults() {
    let config = Config::from_lookup(lookup(&[
        ("CHAT_SERVICE_MAX_RETRIES", "  "),
        ("LOG_LEVEL", ""),
    ]))
    .unwrap();
    assert_eq!(config.service("chat").unwrap().retry.max_retries, 3);
    assert_eq!(config.log_level, "info");
}

#[test]
fn test_invalid_duration_names_variable() {
    let err = Config::from_lookup(lookup(&[("CHAT_SERVICE_CB_INTERVAL", "soon")])).unwrap_err();
    assert_eq!(
        err,
        ConfigError::InvalidDuration {
            name: "CHAT_SERVICE_CB_INTERVAL".to_string(),
            value: "soon".to_string(),
        }
    );
}

#[test]
fn test_zero_health_interval_rejected() {
    let err = Config::from_lookup(lookup(&[("HEALTH_CHECK_INTERVAL", "0")])).unwrap_err();
    assert!(matches!(err, ConfigError::ZeroDuration { .. }));
}

#[test]
fn test_config_error_converts_to_gateway_error() {
    let err = Config::from_lookup(lookup(&[("AUTH_SERVICE_BACKOFF_MULTIPLIER", "0.5")])).unwrap_err();
    let gateway_err: gateway::GatewayError = err.into();
    assert_eq!(gateway_err.code(), gateway::ErrorCode::Internal);
}

#[tokio::test]
async fn test_unrecognized_errors_not_retried_when_disabled() {
    let config = Config::from_lookup(lookup(&[
        ("RETRY_UNRECOGNIZED_ERRORS", "false"),
        ("AUTH_SERVICE_RETRY_DELAY", "1ms"),
        ("AUTH_SERVICE_MAX_RETRY_DELAY", "5ms"),
    ]))
    .unwrap();
    let sleeper = Arc::new(RecordingSleeper::new());
    let manager = ClientManager::new(&config, MockConnector::new()).with_sleeper(sleeper.clone());
    manager.start(&CancellationToken::new()).await.unwrap();

    let op = ScriptedOperation::always(Step::FailUnrecognized);
    let client = manager.get_client("auth").unwrap();
    assert!(client.call(&CancellationToken::new(), |_| op.invoke()).await.is_err());

    assert_eq!(op.calls(), 1);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_configured_retry_budget_applies() {
    let config = Config::from_lookup(lookup(&[
        ("EMPLOYEE_SERVICE_MAX_RETRIES", "1"),
        ("EMPLOYEE_SERVICE_RETRY_DELAY", "5ms"),
        ("EMPLOYEE_SERVICE_RETRY_JITTER", "false"),
    ]))
    .unwrap();
    let sleeper = Arc::new(RecordingSleeper::new());
    let manager = ClientManager::new(&config, MockConnector::new()).with_sleeper(sleeper.clone());
    manager.start(&CancellationToken::new()).await.unwrap();

    let op = ScriptedOperation::always(Step::FailUnrecognized);
    let client = manager.get_client("employee").unwrap();
    assert!(client.call(&CancellationToken::new(), |_| op.invoke()).await.is_err());

    assert_eq!(op.calls(), 2);
    assert_eq!(sleeper.delays(), [Duration::from_millis(5)]);
}
