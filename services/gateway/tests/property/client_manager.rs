//! Client manager properties: partial startup and exactly-once close.

use std::sync::atomic::Ordering;

use gateway::{GatewayError, ServiceHealth};
use proptest::prelude::*;
use rust_common::CancellationToken;
use test_utils::fixtures::GATEWAY_SERVICES;

use super::generators::service_subset_strategy;
use crate::support::{Behavior, MockConnector, test_manager};

fn connector_refusing(refused: &[&str]) -> MockConnector {
    refused
        .iter()
        .fold(MockConnector::new(), |c, name| c.with(name, Behavior::Refuse))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Startup fails for exactly the refused services and keeps the rest.
    #[test]
    fn prop_startup_failures_match_refused(refused in service_subset_strategy()) {
        let (manager, _) = test_manager(connector_refusing(&refused));

        let result = tokio_test::block_on(manager.start(&CancellationToken::new()));

        let failed: Vec<&str> = match &result {
            Ok(()) => Vec::new(),
            Err(e) => e.failures().iter().filter_map(GatewayError::service).collect(),
        };
        prop_assert_eq!(&failed, &refused);
        prop_assert_eq!(result.is_ok(), refused.is_empty());

        let health = manager.health_check();
        for name in GATEWAY_SERVICES {
            let expected = if refused.contains(&name) {
                ServiceHealth::Disconnected
            } else {
                ServiceHealth::Healthy
            };
            prop_assert_eq!(health[name], expected);
            prop_assert_eq!(manager.get_client(name).is_ok(), !refused.contains(&name));
        }
    }

    // Stop closes every connected channel once, however often it runs.
    #[test]
    fn prop_stop_closes_each_channel_once(refused in service_subset_strategy(), stops in 1usize..4) {
        let connector = connector_refusing(&refused);
        let closes = connector.close_counter();
        let (manager, _) = test_manager(connector);

        let _ = tokio_test::block_on(manager.start(&CancellationToken::new()));
        for _ in 0..stops {
            prop_assert!(manager.stop().is_ok());
        }

        prop_assert_eq!(closes.load(Ordering::SeqCst), GATEWAY_SERVICES.len() - refused.len());
        prop_assert!(manager.health_check().values().all(|h| *h == ServiceHealth::Disconnected));
    }
}
