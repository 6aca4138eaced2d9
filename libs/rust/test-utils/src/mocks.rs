//! Mock implementations for testing.
//!
//! Scripted operations stand in for remote calls, and the recording sleeper
//! replaces real backoff sleeps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_common::{PlatformError, Sleeper};
use tonic::{Code, Status};

/// Sleeper that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create a new recording sleeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Sum of all requested delays.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
    }
}

/// One scripted attempt outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Attempt succeeds
    Succeed,
    /// Attempt fails with a gRPC status of this code
    Fail(Code),
    /// Attempt fails with an error carrying no status
    FailUnrecognized,
}

/// Operation that plays back a fixed script of outcomes.
///
/// Once the script is exhausted the last step repeats.
#[derive(Debug)]
pub struct ScriptedOperation {
    steps: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptedOperation {
    /// Create an operation following `steps`.
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create an operation that always behaves the same way.
    #[must_use]
    pub fn always(step: Step) -> Self {
        Self::new(vec![step])
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Perform one attempt; on success returns the zero-based attempt index.
    ///
    /// # Errors
    ///
    /// Returns the scripted failure for this attempt.
    pub async fn invoke(&self) -> Result<usize, PlatformError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .get(index)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or(Step::Succeed);

        match step {
            Step::Succeed => Ok(index),
            Step::Fail(code) => Err(Status::new(code, format!("scripted failure #{index}")).into()),
            Step::FailUnrecognized => Err(PlatformError::Other(
                std::io::Error::other(format!("scripted failure #{index}")).into(),
            )),
        }
    }
}
