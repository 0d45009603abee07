//! Wi-Fi based geolocation: scans nearby access points with a configurable
//! external command and resolves them against an Ichnaea-compatible
//! geolocation API (e.g. Mozilla Location Service).
//!
//! Disabled via `geolocation.disable_ichnaea` (spec §6).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinate::{truncate_coords, AccuracyClass};
use crate::result::LocationResult;

use super::Provider;

const PERIOD: Duration = Duration::from_secs(120);
const TTL: Duration = Duration::from_secs(300);
const DEFAULT_ENDPOINT: &str = "https://location.services.mozilla.com/v1/geolocate?key=test";

/// A single observed access point.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPoint {
    pub mac_address: String,
    pub signal_strength: i32,
}

/// Parses `nmcli -t -f BSSID,SIGNAL dev wifi list` output: one
/// `AA:BB:CC:DD:EE:FF:<signal>` record per line. The BSSID itself is
/// colon-separated hex, so the signal is split off after the last colon.
pub fn parse_nmcli_output(stdout: &str) -> Vec<AccessPoint> {
    stdout
        .lines()
        .filter_map(|line| {
            let (mac, signal) = line.trim().rsplit_once(':')?;
            let signal_strength: i32 = signal.parse().ok()?;
            Some(AccessPoint {
                mac_address: mac.replace('\\', ""),
                signal_strength,
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct WifiAccessPoint<'a> {
    #[serde(rename = "macAddress")]
    mac_address: &'a str,
    #[serde(rename = "signalStrength")]
    signal_strength: i32,
}

#[derive(Debug, Serialize)]
struct GeolocateRequest<'a> {
    #[serde(rename = "wifiAccessPoints")]
    wifi_access_points: Vec<WifiAccessPoint<'a>>,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct GeolocateResponse {
    location: Location,
    accuracy: Option<f64>,
}

pub struct WifiProvider {
    client: reqwest::Client,
    endpoint: String,
    scan_command: Vec<String>,
}

impl WifiProvider {
    pub fn new() -> WifiProvider {
        WifiProvider {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            scan_command: vec![
                "nmcli".to_owned(),
                "-t".to_owned(),
                "-f".to_owned(),
                "BSSID,SIGNAL".to_owned(),
                "dev".to_owned(),
                "wifi".to_owned(),
                "list".to_owned(),
            ],
        }
    }

    async fn scan(&self) -> anyhow::Result<Vec<AccessPoint>> {
        let output = Command::new(&self.scan_command[0])
            .args(&self.scan_command[1..])
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!("wifi scan command exited with {}", output.status);
        }
        Ok(parse_nmcli_output(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn resolve(&self, access_points: &[AccessPoint]) -> anyhow::Result<(f64, f64, f64)> {
        let request = GeolocateRequest {
            wifi_access_points: access_points
                .iter()
                .map(|ap| WifiAccessPoint {
                    mac_address: &ap.mac_address,
                    signal_strength: ap.signal_strength,
                })
                .collect(),
        };
        let resp: GeolocateResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .timeout(Duration::from_secs(8))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let accuracy = resp.accuracy.unwrap_or(AccuracyClass::Zip.meters());
        Ok((resp.location.lat, resp.location.lng, accuracy))
    }
}

impl Default for WifiProvider {
    fn default() -> Self {
        WifiProvider::new()
    }
}

#[async_trait]
impl Provider for WifiProvider {
    fn name(&self) -> &str {
        "wifi"
    }

    async fn lookup_stream(
        &self,
        cancel: CancellationToken,
        key: String,
    ) -> Option<BoxStream<'static, LocationResult>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let scan_command = self.scan_command.clone();
        let source = self.name().to_owned();
        Some(Box::pin(async_stream::stream! {
            let provider = WifiProvider { client, endpoint, scan_command };
            let mut ticker = interval(PERIOD);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let access_points = match provider.scan().await {
                            Ok(access_points) if !access_points.is_empty() => access_points,
                            Ok(_) => {
                                debug!("wifi scan returned no access points");
                                continue;
                            }
                            Err(err) => {
                                debug!(%err, "wifi scan failed");
                                continue;
                            }
                        };
                        match provider.resolve(&access_points).await {
                            Ok((lat, lon, accuracy)) => {
                                let (lat, lon) = truncate_coords(lat, lon);
                                yield LocationResult::new(key.clone(), lat, lon, accuracy, source.clone(), TTL);
                            }
                            Err(err) => debug!(%err, "wifi geolocation resolve failed"),
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
    fn parses_nmcli_bssid_signal_lines() {
        let stdout = "AA\\:BB\\:CC\\:DD\\:EE\\:FF:-55\n11\\:22\\:33\\:44\\:55\\:66:-80\n";
        let aps = parse_nmcli_output(stdout);
        assert_eq!(aps.len(), 2);
        assert_eq!(aps[0].signal_strength, -55);
        assert_eq!(aps[1].signal_strength, -80);
    }

    #[test]
    fn skips_unparseable_lines() {
        assert!(parse_nmcli_output("garbage\n").is_empty());
        assert!(parse_nmcli_output("").is_empty());
    }
}
