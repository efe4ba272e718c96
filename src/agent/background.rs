//! Training on a worker thread, for interactive hosts.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::debug;

use crate::agent::{SafetyAgent, TrainingReport};
use crate::classifier::CancelToken;
use crate::error::BackgroundError;
use crate::profile::{MenuItem, Restaurant, UserProfile};

/// Handle returned by [`SafetyAgent::train_in_background`].
///
/// Dropping the handle detaches the run; it still publishes its state when
/// it finishes.
#[derive(Debug)]
pub struct TrainingHandle {
    rx: Receiver<TrainingReport>,
    cancel: CancelToken,
}

impl TrainingHandle {
    /// Requests cancellation. A cancelled run leaves the previous state in
    /// place and reports [`TrainingReport::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the run to finish.
    ///
    /// # Errors
    ///
    /// Returns `BackgroundError::WorkerLost` if the worker died without
    /// reporting.
    pub fn join(self) -> Result<TrainingReport, BackgroundError> {
        self.rx.recv().map_err(|_| BackgroundError::WorkerLost)
    }

    /// Waits for the run to finish, at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `BackgroundError::Timeout` if the run is still going, or
    /// `BackgroundError::WorkerLost` if the worker died without reporting.
    pub fn join_timeout(&self, timeout: Duration) -> Result<TrainingReport, BackgroundError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => BackgroundError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => BackgroundError::WorkerLost,
        })
    }
}

impl SafetyAgent {
    /// Trains on a named worker thread and returns immediately.
    ///
    /// Decisions keep using the current state until the run publishes.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    #[must_use]
    pub fn train_in_background(
        self: &Arc<Self>,
        users: Vec<UserProfile>,
        items: Vec<MenuItem>,
        restaurants: Vec<Restaurant>,
    ) -> TrainingHandle {
        let (tx, rx) = bounded::<TrainingReport>(1);
        let cancel = CancelToken::new();
        let agent = Arc::clone(self);
        let token = cancel.clone();
        thread::Builder::new()
            .name("palate-safety-trainer".to_string())
            .spawn(move || {
                let report = agent.train_with_cancel(&users, &items, &restaurants, &token);
                debug!(cancelled = report.is_cancelled(), "Background training finished");
                let _ = tx.send(report);
            })
            .expect("failed to spawn training worker");
        TrainingHandle { rx, cancel }
    }
}
