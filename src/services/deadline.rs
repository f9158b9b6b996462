use std::future::Future;
use std::time::Duration;

use tokio::time::{error::Elapsed, Instant};

/// Absolute deadline for an external call.
///
/// Passed into every signer/provider call so the callee can size its own
/// transport timeout, and used by the caller to bound the await.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_elapsed(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Await `fut`, giving up once the deadline passes.
    pub async fn run<F: Future>(self, fut: F) -> Result<F::Output, Elapsed> {
        tokio::time::timeout_at(self.at, fut).await
    }
}
