//! Suspend/resume monitor: listens for logind's `PrepareForSleep` signal over
//! DBus and runs a callback a short delay after resume, once networking has
//! had a chance to come back up (spec §4.6).

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zbus::Connection;

/// Debounce window: logind can fire `PrepareForSleep(false)` more than once
/// per actual resume.
const DEBOUNCE: Duration = Duration::from_secs(2);
/// Grace period after resume before we trust the network to be back.
const NETWORK_WAKEUP_DELAY: Duration = Duration::from_secs(10);
const BUS_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const SUBSCRIBE_RETRY_DELAY: Duration = Duration::from_secs(10);
/// Delay before re-subscribing after the signal channel itself closes (the
/// bus connection is assumed still good, unlike [`BUS_RECONNECT_DELAY`]).
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Runs `on_resume` each time the system wakes from suspend, until `cancel`
/// fires. Reconnects to the system bus on any error.
pub async fn run<F, Fut>(cancel: CancellationToken, on_resume: F)
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    while !cancel.is_cancelled() {
        match run_once(&cancel, &on_resume).await {
            Ok(()) => {}
            Err(err) => warn!(%err, "suspend/resume monitor error, reconnecting"),
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(BUS_RECONNECT_DELAY) => {}
        }
    }
}

async fn run_once<F, Fut>(cancel: &CancellationToken, on_resume: &F) -> zbus::Result<()>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    let connection = Connection::system().await?;
    let proxy = zbus::Proxy::new(
        &connection,
        "org.freedesktop.login1",
        "/org/freedesktop/login1",
        "org.freedesktop.login1.Manager",
    )
    .await?;

    let mut last_resume_handled = tokio::time::Instant::now() - DEBOUNCE;

    loop {
        let mut signal = loop {
            match proxy.receive_signal("PrepareForSleep").await {
                Ok(stream) => break stream,
                Err(err) => {
                    debug!(%err, "could not subscribe to PrepareForSleep, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = sleep(SUBSCRIBE_RETRY_DELAY) => continue,
                    }
                }
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = signal.next() => {
                    let Some(msg) = msg else {
                        debug!("PrepareForSleep signal channel closed, resubscribing");
                        break;
                    };
                    let body: bool = match msg.body().deserialize() {
                        Ok(body) => body,
                        Err(err) => {
                            debug!(%err, "could not parse PrepareForSleep body");
                            continue;
                        }
                    };
                    // `true` means "about to suspend"; we only act on resume (`false`).
                    if body {
                        continue;
                    }
                    let now = tokio::time::Instant::now();
                    if now.duration_since(last_resume_handled) < DEBOUNCE {
                        continue;
                    }
                    last_resume_handled = now;
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = sleep(NETWORK_WAKEUP_DELAY) => {}
                    }
                    on_resume().await;
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = sleep(RECONNECT_DELAY) => {}
        }
    }
}
