//! Background tasks — cancellable periodic jobs on the Tokio runtime.
//!
//! A [`PeriodicTask`] runs a synchronous job on a fixed interval until it is
//! shut down. The handle owns the task: [`PeriodicTask::shutdown`] signals the
//! loop and joins it, and dropping the handle signals the loop without waiting.
//!
//! A job that panics is logged and the loop keeps ticking.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error};

/// Handle to a job spawned with [`PeriodicTask::spawn`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use storefront::background::PeriodicTask;
///
/// # async fn example() {
/// let task = PeriodicTask::spawn("heartbeat", Duration::from_secs(30), || {
///     tracing::info!("still alive");
/// });
///
/// // ... later, during graceful shutdown:
/// task.shutdown().await;
/// # }
/// ```
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawns `job` to run every `period` on the current Tokio runtime.
    ///
    /// The first run happens one full `period` after spawning, not immediately.
    /// Ticks missed while a job overran are delayed rather than bunched up.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, or if `period` is zero.
    pub fn spawn<F>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if catch_unwind(AssertUnwindSafe(&mut job)).is_err() {
                            error!(task = name, "periodic job panicked; continuing");
                        }
                    }
                    changed = stopped.changed() => {
                        // A closed channel means the handle was dropped.
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!(task = name, "periodic task stopped");
        });

        debug!(task = name, ?period, "periodic task started");

        Self {
            name,
            stop,
            handle: Some(handle),
        }
    }

    /// Name given at spawn time.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` once the background loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals the loop to stop and waits for it to exit.
    ///
    /// A job that is running when this is called finishes its current run first.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(task = self.name, error = %e, "periodic task failed to join");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}
