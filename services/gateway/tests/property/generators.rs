//! Gateway-specific proptest generators.

use proptest::prelude::*;
use test_utils::fixtures::GATEWAY_SERVICES;
use tonic::Code;

/// Generate a subset of the backend services, as a mask over
/// [`GATEWAY_SERVICES`].
pub fn service_subset_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    prop::array::uniform4(any::<bool>()).prop_map(|mask| {
        GATEWAY_SERVICES
            .iter()
            .zip(mask)
            .filter_map(|(name, picked)| picked.then_some(*name))
            .collect()
    })
}

/// Generate any non-OK gRPC status code.
pub fn error_code_strategy() -> impl Strategy<Value = Code> {
    (1i32..=16).prop_map(Code::from_i32)
}

/// Generate a duration as (hours, minutes, seconds, milliseconds).
pub fn duration_parts_strategy() -> impl Strategy<Value = (u64, u64, u64, u64)> {
    (0u64..48, 0u64..60, 0u64..60, 0u64..1000)
}
