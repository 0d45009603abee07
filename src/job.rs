//! Singleton scheduled jobs: an interval timer that skips a tick if the
//! previous run of its task is still in flight, rather than queuing runs up
//! (spec §4.6).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs `task` on a fixed period, skipping ticks while a previous run is
/// still executing. Returns immediately if `period` is zero: a disabled job
/// should never be scheduled at all.
pub fn spawn_singleton_job<F, Fut>(
    name: impl Into<String>,
    period: Duration,
    cancel: CancellationToken,
    task: F,
) -> Option<tokio::task::JoinHandle<()>>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if period.is_zero() {
        return None;
    }
    let name = name.into();
    let slot = Arc::new(Semaphore::new(1));
    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Ok(permit) = slot.clone().try_acquire_owned() else {
                        debug!(job = %name, "previous run still in flight, skipping tick");
                        continue;
                    };
                    let task_cancel = cancel.clone();
                    let fut = task();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = task_cancel.cancelled() => {}
                            _ = fut => {}
                        }
                        drop(permit);
                    });
                }
            }
        }
        warn!(job = %name, "scheduled job loop exiting");
    }))
}
