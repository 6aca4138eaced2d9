//! Gateway Service - Main Entry Point
//!
//! Connects to every backend service, keeps the service registry fresh, and
//! closes all channels on SIGINT/SIGTERM.

use std::sync::Arc;

use gateway::{
    ClientManager, Config, GatewayError, GatewayMetrics, ServiceRegistry, ShutdownCoordinator,
    run_until_shutdown, wait_for_signal,
};
use rust_common::{TracingConfig, init_tracing};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    let tracing_config = TracingConfig::default()
        .with_service_name("gateway-service")
        .with_log_level(&config.log_level)
        .with_format(&config.log_format);
    init_tracing(&tracing_config)?;

    info!(services = config.services.len(), "Starting Gateway Service");

    let prometheus_registry = prometheus::Registry::new();
    let metrics = Arc::new(GatewayMetrics::new(&prometheus_registry)?);
    let manager = Arc::new(ClientManager::grpc(&config).with_metrics(metrics));

    let mut shutdown_coordinator = ShutdownCoordinator::new();
    let startup = shutdown_coordinator.token();
    let signal_watcher = {
        let startup = startup.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            startup.cancel();
        })
    };
    let started = manager.start(&startup).await;
    signal_watcher.abort();

    if startup.is_cancelled() {
        warn!("Shutdown requested during startup");
        if let Err(e) = manager.stop() {
            error!(error = %e, "Errors while closing backend connections");
        }
        return Ok(());
    }
    match started {
        Ok(()) => {}
        Err(GatewayError::Startup { failures }) => {
            warn!(
                failed = failures.len(),
                "Gateway starting with some backend services unavailable"
            );
        }
        Err(e) => return Err(e.into()),
    }

    let registry = Arc::new(ServiceRegistry::new());
    registry.register_services(manager.services());
    registry.refresh(&manager);
    info!(healthy = ?registry.healthy_services(), "Backend services registered");

    registry.start_health_monitoring(
        Arc::clone(&manager),
        config.health_check_interval,
        &mut shutdown_coordinator,
    );

    let report =
        run_until_shutdown(wait_for_signal(), shutdown_coordinator, config.shutdown_timeout).await;
    if !report.is_clean() {
        warn!(aborted = ?report.aborted, "Background tasks did not stop in time");
    }

    if let Err(e) = manager.stop() {
        error!(error = %e, "Errors while closing backend connections");
    }

    info!("Gateway Service stopped");

    Ok(())
}
