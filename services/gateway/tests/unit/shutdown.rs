//! Graceful Shutdown Unit Tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gateway::{ShutdownCoordinator, run_until_shutdown};

#[tokio::test]
async fn test_shutdown_cancels_running_tasks() {
    let mut coordinator = ShutdownCoordinator::new();
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);

    coordinator.spawn("forever", async move {
        std::future::pending::<()>().await;
        flag.store(true, Ordering::SeqCst);
    });
    assert_eq!(coordinator.task_count(), 1);

    let completion = coordinator.completion();
    let report = coordinator.shutdown(Duration::from_secs(1)).await;

    assert!(*completion.borrow());
    assert!(report.is_clean());
    assert_eq!(report.stopped, ["forever"]);
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_subscribers_and_tokens_observe_shutdown() {
    let mut coordinator = ShutdownCoordinator::new();
    let signal = coordinator.subscribe();
    let token = coordinator.token();
    assert!(!signal.is_shutdown());
    assert!(!token.is_cancelled());

    coordinator.spawn("noop", async {});
    coordinator.shutdown(Duration::from_secs(1)).await;

    assert!(signal.is_shutdown());
    assert!(token.is_cancelled());
    tokio::time::timeout(Duration::from_millis(100), signal.recv())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_report_lists_every_task() {
    let mut coordinator = ShutdownCoordinator::new();
    coordinator.spawn("health-monitor", std::future::pending());
    coordinator.spawn("metrics", async {});
    tokio::task::yield_now().await;

    let mut report = coordinator.shutdown(Duration::from_secs(1)).await;
    report.stopped.sort_unstable();

    assert_eq!(report.stopped, ["health-monitor", "metrics"]);
    assert!(report.aborted.is_empty());
}

#[tokio::test]
async fn test_shutdown_with_no_tasks() {
    let coordinator = ShutdownCoordinator::default();
    let completion = coordinator.completion();
    assert!(!*completion.borrow());

    let report = coordinator.shutdown(Duration::from_millis(10)).await;
    assert!(*completion.borrow());
    assert!(report.stopped.is_empty());
}

#[tokio::test]
async fn test_run_until_shutdown_waits_for_trigger() {
    let mut coordinator = ShutdownCoordinator::new();
    coordinator.spawn("forever", std::future::pending());
    let completion = coordinator.completion();

    let report = run_until_shutdown(
        tokio::time::sleep(Duration::from_millis(10)),
        coordinator,
        Duration::from_secs(1),
    )
    .await;

    assert!(*completion.borrow());
    assert!(report.is_clean());
}
