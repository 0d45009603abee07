//! Reads a user-maintained `lat,lon` file on a cadence.
//!
//! File format (spec §6): UTF-8 text, `#`-prefixed lines are comments, the
//! first non-comment non-blank line of the form `lat,lon` wins. Whitespace
//! around the values is trimmed.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::fs;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinate::truncate_coords;
use crate::coordinate::AccuracyClass;
use crate::result::LocationResult;

use super::Provider;

/// How often to re-read the geolocation file.
const PERIOD: Duration = Duration::from_secs(30);
/// How long a fix from this file stays authoritative.
const TTL: Duration = Duration::from_secs(120);

/// Parses the first `lat,lon` line out of a geolocation file.
pub fn parse_geolocation_file(contents: &str) -> Option<(f64, f64)> {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (lat_str, lon_str) = line.split_once(',')?;
        let lat: f64 = lat_str.trim().parse().ok()?;
        let lon: f64 = lon_str.trim().parse().ok()?;
        return Some((lat, lon));
    }
    None
}

pub struct GeolocationFileProvider {
    path: PathBuf,
}

impl GeolocationFileProvider {
    pub fn new(path: PathBuf) -> GeolocationFileProvider {
        GeolocationFileProvider { path }
    }
}

#[async_trait]
impl Provider for GeolocationFileProvider {
    fn name(&self) -> &str {
        "geolocation-file"
    }

    async fn lookup_stream(
        &self,
        cancel: CancellationToken,
        key: String,
    ) -> Option<BoxStream<'static, LocationResult>> {
        let path = self.path.clone();
        let source = self.name().to_owned();
        Some(Box::pin(async_stream::stream! {
            let mut ticker = interval(PERIOD);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match fs::read_to_string(&path).await {
                            Ok(contents) => {
                                if let Some((lat, lon)) = parse_geolocation_file(&contents) {
                                    let (lat, lon) = truncate_coords(lat, lon);
                                    yield LocationResult::new(
                                        key.clone(),
                                        lat,
                                        lon,
                                        AccuracyClass::City.meters(),
                                        source.clone(),
                                        TTL,
                                    );
                                } else {
                                    debug!(path = %path.display(), "geolocation file had no parseable lat,lon line");
                                }
                            }
                            Err(err) => {
                                debug!(path = %path.display(), %err, "could not read geolocation file");
                            }
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
    fn parses_simple_line() {
        assert_eq!(
            parse_geolocation_file("52.5129,13.3910\n"),
            Some((52.5129, 13.3910))
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "# my location\n\n  52.5,13.4  \n";
        assert_eq!(parse_geolocation_file(text), Some((52.5, 13.4)));
    }

    #[test]
    fn returns_none_for_garbage() {
        assert_eq!(parse_geolocation_file("not a coordinate"), None);
        assert_eq!(parse_geolocation_file(""), None);
        assert_eq!(parse_geolocation_file("# only comments"), None);
    }
}
