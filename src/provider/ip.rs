//! IP-based geolocation. No hardware dependency, coarse accuracy: the
//! fallback provider that is almost always available.
//!
//! Disabled via `geolocation.disable_geoip` (spec §6).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinate::{truncate_coords, AccuracyClass};
use crate::result::LocationResult;

use super::Provider;

const PERIOD: Duration = Duration::from_secs(900);
const TTL: Duration = Duration::from_secs(1800);
const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json/?fields=status,lat,lon";

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

pub struct IpProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl IpProvider {
    pub fn new() -> IpProvider {
        IpProvider {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        }
    }

    pub fn with_endpoint(endpoint: String) -> IpProvider {
        IpProvider {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn fetch(&self) -> anyhow::Result<(f64, f64)> {
        let resp: IpApiResponse = self
            .client
            .get(&self.endpoint)
            .timeout(Duration::from_secs(8))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if resp.status != "success" {
            anyhow::bail!("ip geolocation lookup failed: status={:?}", resp.status);
        }
        match (resp.lat, resp.lon) {
            (Some(lat), Some(lon)) => Ok((lat, lon)),
            _ => anyhow::bail!("ip geolocation response missing lat/lon"),
        }
    }
}

impl Default for IpProvider {
    fn default() -> Self {
        IpProvider::new()
    }
}

#[async_trait]
impl Provider for IpProvider {
    fn name(&self) -> &str {
        "ip"
    }

    async fn lookup_stream(
        &self,
        cancel: CancellationToken,
        key: String,
    ) -> Option<BoxStream<'static, LocationResult>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let source = self.name().to_owned();
        Some(Box::pin(async_stream::stream! {
            let provider = IpProvider { client, endpoint };
            let mut ticker = interval(PERIOD);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match provider.fetch().await {
                            Ok((lat, lon)) => {
                                let (lat, lon) = truncate_coords(lat, lon);
                                yield LocationResult::new(
                                    key.clone(),
                                    lat,
                                    lon,
                                    AccuracyClass::City.meters(),
                                    source.clone(),
                                    TTL,
                                );
                            }
                            Err(err) => debug!(%err, "ip geolocation lookup failed"),
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_requests_fields() {
        let provider = IpProvider::new();
        assert!(provider.endpoint.contains("fields="));
    }
}
