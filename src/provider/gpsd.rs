//! GPS-based geolocation via a `gpsd` daemon, speaking gpsd's JSON wire
//! protocol over TCP.
//!
//! Disabled via `geolocation.disable_gpsd` (spec §6).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use gpsd_proto::{Mode, ResponseData};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinate::truncate_coords;
use crate::result::LocationResult;

use super::Provider;

/// How long a GPS fix stays authoritative once received.
const TTL: Duration = Duration::from_secs(60);
/// Delay between reconnect attempts when gpsd is unreachable.
const RECONNECT_DELAY: Duration = Duration::from_secs(10);
/// Accuracy floor applied when gpsd doesn't report an error estimate.
const DEFAULT_ACCURACY_M: f64 = 10.0;

pub struct GpsdProvider {
    host: String,
    port: u16,
}

impl GpsdProvider {
    pub fn new(host: String, port: u16) -> GpsdProvider {
        GpsdProvider { host, port }
    }
}

impl Default for GpsdProvider {
    fn default() -> Self {
        GpsdProvider::new("127.0.0.1".to_owned(), 2947)
    }
}

#[async_trait]
impl Provider for GpsdProvider {
    fn name(&self) -> &str {
        "gpsd"
    }

    async fn lookup_stream(
        &self,
        cancel: CancellationToken,
        key: String,
    ) -> Option<BoxStream<'static, LocationResult>> {
        let host = self.host.clone();
        let port = self.port;
        let source = self.name().to_owned();
        Some(Box::pin(async_stream::stream! {
            'reconnect: loop {
                let stream = tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = TcpStream::connect((host.as_str(), port)) => res,
                };
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        debug!(%err, %host, port, "could not connect to gpsd");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = sleep(RECONNECT_DELAY) => continue 'reconnect,
                        }
                    }
                };
                if stream
                    .write_all(br#"?WATCH={"enable":true,"json":true};"#)
                    .await
                    .is_err()
                {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(RECONNECT_DELAY) => continue 'reconnect,
                    }
                }

                let mut lines = BufReader::new(stream).lines();
                let mut heartbeat = interval(Duration::from_secs(30));
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'reconnect,
                        _ = heartbeat.tick() => {}
                        line = lines.next_line() => {
                            match line {
                                Ok(Some(line)) => {
                                    match serde_json::from_str::<ResponseData>(&line) {
                                        Ok(ResponseData::Tpv(tpv))
                                            if matches!(tpv.mode, Mode::Fix2d | Mode::Fix3d) =>
                                        {
                                            if let (Some(lat), Some(lon)) = (tpv.lat, tpv.lon) {
                                                let (lat, lon) = truncate_coords(lat, lon);
                                                let accuracy = tpv
                                                    .epx
                                                    .zip(tpv.epy)
                                                    .map(|(epx, epy)| epx.max(epy))
                                                    .unwrap_or(DEFAULT_ACCURACY_M);
                                                yield LocationResult::new(
                                                    key.clone(),
                                                    lat,
                                                    lon,
                                                    accuracy,
                                                    source.clone(),
                                                    TTL,
                                                );
                                            }
                                        }
                                        Ok(_) => {}
                                        Err(err) => debug!(%err, "unrecognized gpsd message"),
                                    }
                                }
                                Ok(None) => {
                                    debug!("gpsd closed the connection");
                                    break;
                                }
                                Err(err) => {
                                    debug!(%err, "error reading from gpsd");
                                    break;
                                }
                            }
                        }
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(RECONNECT_DELAY) => continue 'reconnect,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_local_gpsd() {
        let provider = GpsdProvider::default();
        assert_eq!(provider.host, "127.0.0.1");
        assert_eq!(provider.port, 2947);
    }
}
