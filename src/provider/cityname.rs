//! Resolves a user-maintained city-name file to a position via forward
//! geocoding.
//!
//! File format mirrors [`super::file::GeolocationFileProvider`]: UTF-8 text,
//! `#`-prefixed lines are comments, the first non-comment non-blank line is
//! the query (e.g. `Berlin, Germany`). Disabled via
//! `geolocation.disable_cityname_file` (spec §6).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::fs;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinate::truncate_coords;
use crate::geocode::Geocoder;
use crate::result::LocationResult;

use super::Provider;

const PERIOD: Duration = Duration::from_secs(300);
const TTL: Duration = Duration::from_secs(3600);

/// Non-comment, non-blank query lines in file order.
fn query_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

pub struct CityNameFileProvider {
    path: PathBuf,
    geocoder: Arc<dyn Geocoder>,
}

impl CityNameFileProvider {
    pub fn new(path: PathBuf, geocoder: Arc<dyn Geocoder>) -> CityNameFileProvider {
        CityNameFileProvider { path, geocoder }
    }
}

#[async_trait]
impl Provider for CityNameFileProvider {
    fn name(&self) -> &str {
        "cityname-file"
    }

    async fn lookup_stream(
        &self,
        cancel: CancellationToken,
        key: String,
    ) -> Option<BoxStream<'static, LocationResult>> {
        let path = self.path.clone();
        let geocoder = self.geocoder.clone();
        let source = self.name().to_owned();
        Some(Box::pin(async_stream::stream! {
            let mut ticker = interval(PERIOD);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let contents = match fs::read_to_string(&path).await {
                            Ok(contents) => contents,
                            Err(err) => {
                                debug!(path = %path.display(), %err, "could not read city name file");
                                continue;
                            }
                        };
                        let mut lines = query_lines(&contents).peekable();
                        if lines.peek().is_none() {
                            debug!(path = %path.display(), "city name file had no query line");
                            continue;
                        }
                        let mut resolved = false;
                        for query in lines {
                            match geocoder.search(query).await {
                                Ok(address) if address.found => {
                                    let (lat, lon) = truncate_coords(address.coordinate.lat, address.coordinate.lon);
                                    yield LocationResult::new(
                                        key.clone(),
                                        lat,
                                        lon,
                                        crate::coordinate::AccuracyClass::City.meters(),
                                        source.clone(),
                                        TTL,
                                    );
                                    resolved = true;
                                    break;
                                }
                                Ok(_) => debug!(query, "city name not found, trying next line"),
                                Err(err) => debug!(query, %err, "forward geocode of city name failed, trying next line"),
                            }
                        }
                        if !resolved {
                            debug!(path = %path.display(), "no line in city name file resolved");
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
    fn yields_non_comment_lines_in_order() {
        let text = "# where I usually am\n\nBerlin, Germany\nMunich, Germany\n";
        assert_eq!(
            query_lines(text).collect::<Vec<_>>(),
            vec!["Berlin, Germany", "Munich, Germany"]
        );
    }

    #[test]
    fn none_when_all_comments() {
        assert_eq!(query_lines("# a\n# b\n").next(), None);
    }
}
