//! Shared test utilities for gateway-platform Rust crates.
//!
//! This crate provides:
//! - Proptest generators for resilience configuration and gRPC codes
//! - Mock implementations (scripted operations, recording sleeper)
//! - Test fixtures with sample configuration and statuses

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{RecordingSleeper, ScriptedOperation, Step};
