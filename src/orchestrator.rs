//! The provider orchestrator: one supervising task per [`Provider`], with
//! bounded exponential-backoff restarts (spec §4.4).
//!
//! A provider's `lookup_stream` ending -- whether it returns `None`, its
//! stream runs dry, or the call panics -- is never fatal to the process. The
//! supervisor just waits out a backoff and tries again, doubling the wait
//! each time up to [`MAX_BACKOFF`] and resetting it after any successful
//! yield.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::bus::GeolocationBus;
use crate::provider::Provider;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Supervises every provider in `providers`, publishing everything they
/// yield onto `bus` under `key`, until `cancel` fires.
pub struct ProviderOrchestrator {
    bus: GeolocationBus,
    key: String,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ProviderOrchestrator {
    /// Spawn one supervising task per provider. Returns immediately; use
    /// [`ProviderOrchestrator::join`] to wait for shutdown.
    pub fn spawn(
        bus: GeolocationBus,
        key: impl Into<String>,
        cancel: CancellationToken,
        providers: Vec<Arc<dyn Provider>>,
    ) -> ProviderOrchestrator {
        let key = key.into();
        let handles = providers
            .into_iter()
            .map(|provider| {
                tokio::spawn(supervise_provider(
                    provider,
                    bus.clone(),
                    key.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        ProviderOrchestrator {
            bus,
            key,
            cancel,
            handles,
        }
    }

    /// Wait for every supervising task to exit (only happens after `cancel`
    /// fires).
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(%err, "provider supervisor task panicked");
            }
        }
    }

    pub fn bus(&self) -> &GeolocationBus {
        &self.bus
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }
}

async fn supervise_provider(
    provider: Arc<dyn Provider>,
    bus: GeolocationBus,
    key: String,
    cancel: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;
    while !cancel.is_cancelled() {
        let name = provider.name().to_owned();
        let stream = {
            // A panicking `lookup_stream` is treated the same as `None`: log
            // it and retry after backoff rather than taking the whole process
            // down.
            let fut = AssertUnwindSafe(provider.lookup_stream(cancel.clone(), key.clone()));
            match fut.catch_unwind().await {
                Ok(stream) => stream,
                Err(_) => {
                    error!(provider = %name, "provider panicked while starting");
                    None
                }
            }
        };

        let Some(mut stream) = stream else {
            debug!(provider = %name, backoff = ?backoff, "provider unavailable, backing off");
            wait_or_cancel(&cancel, backoff).await;
            backoff = next_backoff(backoff);
            continue;
        };

        let mut yielded_any = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                item = stream.next() => match item {
                    Some(result) => {
                        yielded_any = true;
                        backoff = INITIAL_BACKOFF;
                        bus.publish(result).await;
                    }
                    None => break,
                }
            }
        }

        if !yielded_any {
            warn!(provider = %name, "provider stream ended without yielding a result");
        }
        debug!(provider = %name, backoff = ?backoff, "provider stream ended, backing off");
        wait_or_cancel(&cancel, backoff).await;
        backoff = next_backoff(backoff);
    }
}

async fn wait_or_cancel(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = sleep(duration) => {}
    }
}

fn next_backoff(current: Duration) -> Duration {
    std::cmp::min(current * 2, MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = INITIAL_BACKOFF;
        for _ in 0..10 {
            b = next_backoff(b);
        }
        assert_eq!(b, MAX_BACKOFF);
    }

    #[test]
    fn backoff_starts_at_one_second() {
        assert_eq!(INITIAL_BACKOFF, Duration::from_secs(1));
    }
}
