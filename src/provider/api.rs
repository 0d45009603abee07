//! Generic HTTP geolocation API provider: polls a configured URL expected to
//! return `{"lat": ..., "lon": ..., "accuracy": ...}`.
//!
//! Unlike [`super::ip::IpProvider`], the endpoint and polling period are
//! caller-supplied -- this is the escape hatch for any JSON geolocation API
//! that doesn't warrant its own provider. Disabled via
//! `geolocation.disable_geoapi` (spec §6).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinate::truncate_coords;
use crate::result::LocationResult;

use super::Provider;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    lat: f64,
    lon: f64,
    #[serde(default)]
    accuracy: Option<f64>,
}

pub struct ApiProvider {
    client: reqwest::Client,
    url: String,
    period: Duration,
    ttl: Duration,
    default_accuracy_m: f64,
}

impl ApiProvider {
    pub fn new(url: String, period: Duration, ttl: Duration, default_accuracy_m: f64) -> ApiProvider {
        ApiProvider {
            client: reqwest::Client::new(),
            url,
            period,
            ttl,
            default_accuracy_m,
        }
    }

    async fn fetch(&self) -> anyhow::Result<(f64, f64, f64)> {
        let resp: ApiResponse = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(8))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let accuracy = resp.accuracy.unwrap_or(self.default_accuracy_m);
        Ok((resp.lat, resp.lon, accuracy))
    }
}

#[async_trait]
impl Provider for ApiProvider {
    fn name(&self) -> &str {
        "geoapi"
    }

    async fn lookup_stream(
        &self,
        cancel: CancellationToken,
        key: String,
    ) -> Option<BoxStream<'static, LocationResult>> {
        let client = self.client.clone();
        let url = self.url.clone();
        let period = self.period;
        let ttl = self.ttl;
        let default_accuracy_m = self.default_accuracy_m;
        let source = self.name().to_owned();
        Some(Box::pin(async_stream::stream! {
            let provider = ApiProvider { client, url, period, ttl, default_accuracy_m };
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match provider.fetch().await {
                            Ok((lat, lon, accuracy)) => {
                                let (lat, lon) = truncate_coords(lat, lon);
                                yield LocationResult::new(key.clone(), lat, lon, accuracy, source.clone(), ttl);
                            }
                            Err(err) => debug!(%err, url = %provider.url, "geolocation api lookup failed"),
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
    fn falls_back_to_default_accuracy() {
        let resp = ApiResponse {
            lat: 1.0,
            lon: 2.0,
            accuracy: None,
        };
        assert_eq!(resp.accuracy.unwrap_or(500.0), 500.0);
    }
}
