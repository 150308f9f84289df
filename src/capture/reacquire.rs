//! Bounded reacquire loop
//!
//! When the user revokes sharing while a recording is still running, the
//! coordinator asks the platform for a fresh stream a fixed number of times
//! with a fixed delay. An explicit stop always wins over a pending reacquire.

use super::stream::CaptureStream;
use super::traits::{CaptureConstraints, CaptureSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How hard to try getting a lost source back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReacquirePolicy {
    /// Maximum number of `acquire` calls
    pub attempts: u32,

    /// Fixed wait before each attempt
    pub delay: Duration,
}

impl Default for ReacquirePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl ReacquirePolicy {
    /// Upper bound on the time spent sleeping across all attempts
    pub fn max_backoff(&self) -> Duration {
        self.delay * self.attempts
    }
}

/// Result of a reacquire loop
#[derive(Debug)]
pub enum ReacquireOutcome {
    /// A new stream was granted on the given attempt (1-based)
    Reacquired { stream: CaptureStream, attempt: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
    /// A stop request arrived before a stream was granted
    Cancelled,
}

/// Cloneable handle for requesting that the current session stop
///
/// Cancels any reacquire loop in flight. With no loop running the request
/// is only recorded: it does not end the session by itself, but the next
/// reacquire cancels before its first attempt. The coordinator clears it when
/// a new session starts.
#[derive(Clone)]
pub struct StopHandle {
    requested: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (requested, _) = watch::channel(false);
        Self {
            requested: Arc::new(requested),
        }
    }

    /// Ask the session to stop
    ///
    /// Pre-empts a reacquire loop; outside one the host still has to call
    /// `SessionCoordinator::stop`.
    pub fn request_stop(&self) {
        if !self.requested.send_replace(true) {
            tracing::debug!("Stop requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        *self.requested.borrow()
    }

    /// Resolve once a stop has been requested
    pub async fn requested(&self) {
        let mut rx = self.requested.subscribe();
        let _ = rx.wait_for(|requested| *requested).await;
    }

    pub(crate) fn clear(&self) {
        self.requested.send_replace(false);
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Try to get a new stream from `source`, bounded by `policy`
pub async fn reacquire(
    source: &dyn CaptureSource,
    constraints: &CaptureConstraints,
    policy: &ReacquirePolicy,
    stop: &StopHandle,
) -> ReacquireOutcome {
    for attempt in 1..=policy.attempts {
        if stop.is_requested() {
            tracing::info!("Reacquire cancelled before attempt {}", attempt);
            return ReacquireOutcome::Cancelled;
        }

        tokio::select! {
            _ = stop.requested() => {
                tracing::info!("Reacquire cancelled while waiting for attempt {}", attempt);
                return ReacquireOutcome::Cancelled;
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }

        tracing::info!("Reacquire attempt {}/{}", attempt, policy.attempts);
        match source.acquire(constraints).await {
            Ok(stream) => {
                if stop.is_requested() {
                    // Stop arrived while the platform call was in flight.
                    source.release(&stream);
                    return ReacquireOutcome::Cancelled;
                }
                return ReacquireOutcome::Reacquired { stream, attempt };
            }
            Err(e) => {
                tracing::warn!("Reacquire attempt {} failed: {}", attempt, e);
            }
        }
    }

    tracing::warn!(
        "Gave up reacquiring the capture source after {} attempts",
        policy.attempts
    );
    ReacquireOutcome::Exhausted {
        attempts: policy.attempts,
    }
}
