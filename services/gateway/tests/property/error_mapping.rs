//! Error mapping properties: upstream statuses keep their code and get a
//! consistent HTTP status.

use gateway::error::http_status_for;
use gateway::{ErrorCode, ErrorResponse, GatewayError};
use proptest::prelude::*;
use rust_common::{CircuitState, PlatformError};
use tonic::{Code, Status};

use super::generators::error_code_strategy;

fn call_error(source: PlatformError) -> GatewayError {
    GatewayError::Call {
        service: "chat".to_string(),
        source,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Upstream statuses other than Unavailable pass through unchanged.
    #[test]
    fn prop_upstream_code_preserved(code in error_code_strategy(), message in "[a-z ]{0,30}") {
        prop_assume!(!matches!(code, Code::Unavailable | Code::Internal | Code::Unknown | Code::Cancelled));
        let err = call_error(Status::new(code, message.clone()).into());
        let response = ErrorResponse::from_error(&err);

        prop_assert_eq!(response.code(), ErrorCode::Upstream(code));
        prop_assert_eq!(response.status_code(), http_status_for(code));
        prop_assert_eq!(&response.message, &message);
        prop_assert_eq!(err.to_status().code(), code);
    }

    // Exhausted retries map by the last failure, not the wrapper.
    #[test]
    fn prop_exhausted_maps_like_last_cause(code in error_code_strategy(), max_retries in 0u32..10) {
        let direct = call_error(Status::new(code, "boom").into());
        let wrapped = call_error(PlatformError::RetriesExhausted {
            max_retries,
            last: Box::new(Status::new(code, "boom").into()),
        });

        prop_assert_eq!(direct.code(), wrapped.code());
        prop_assert_eq!(direct.to_status().code(), wrapped.to_status().code());
    }

    // Every error code answers with an HTTP error status.
    #[test]
    fn prop_http_status_is_error(code in error_code_strategy()) {
        let status = http_status_for(code);
        prop_assert!((400..600).contains(&status));
    }

    // A breaker refusal is always 503, whatever service it names.
    #[test]
    fn prop_circuit_open_is_503(service in "[a-z]{3,12}") {
        let err = GatewayError::Call {
            service: service.clone(),
            source: PlatformError::circuit_open(service.clone(), CircuitState::Open),
        };
        let response = ErrorResponse::from_error(&err);

        prop_assert_eq!(response.code(), ErrorCode::CircuitOpen);
        prop_assert_eq!(response.status_code(), 503);
        prop_assert_eq!(response.service.as_deref(), Some(service.as_str()));
    }
}
