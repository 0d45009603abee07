//! Coordinate-quantised, TTL-bounded cache layered in front of a
//! [`Geocoder`] backend (spec §4.5).
//!
//! Two close reverse lookups land in the same cache cell regardless of
//! sub-quantum drift: `quantize(v) = round(v / 0.01)`, so 0.01 degrees
//! (~1.1km at the equator) of movement is needed to miss the cache.
//! Forward lookups are keyed on the raw query string.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::coordinate::Coordinate;
use crate::Result;

use super::{Address, Geocoder};

/// Default TTL for a cache hit.
pub const DEFAULT_TTL_HIT: Duration = Duration::from_secs(3600);
/// Default TTL for a cached miss.
pub const DEFAULT_TTL_MISS: Duration = Duration::from_secs(600);

fn quantize(v: f64) -> i64 {
    (v / 0.01).round() as i64
}

struct Entry {
    address: Address,
    expiry: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }
}

/// Wraps a [`Geocoder`] with an in-memory, quantised, TTL-bounded cache.
pub struct CachedGeocoder {
    inner: Box<dyn Geocoder>,
    ttl_hit: Duration,
    ttl_miss: Duration,
    reverse_cache: RwLock<HashMap<(String, i64, i64), Entry>>,
    forward_cache: RwLock<HashMap<String, Entry>>,
}

impl CachedGeocoder {
    pub fn new(inner: Box<dyn Geocoder>) -> CachedGeocoder {
        CachedGeocoder::with_ttls(inner, DEFAULT_TTL_HIT, DEFAULT_TTL_MISS)
    }

    pub fn with_ttls(
        inner: Box<dyn Geocoder>,
        ttl_hit: Duration,
        ttl_miss: Duration,
    ) -> CachedGeocoder {
        CachedGeocoder {
            inner,
            ttl_hit,
            ttl_miss,
            reverse_cache: RwLock::new(HashMap::new()),
            forward_cache: RwLock::new(HashMap::new()),
        }
    }

    fn reverse_key(&self, coordinate: Coordinate) -> (String, i64, i64) {
        (
            self.inner.name().to_owned(),
            quantize(coordinate.lat),
            quantize(coordinate.lon),
        )
    }

    fn ttl_for(&self, found: bool) -> Duration {
        if found {
            self.ttl_hit
        } else {
            self.ttl_miss
        }
    }
}

#[async_trait]
impl Geocoder for CachedGeocoder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<Address> {
        let key = self.reverse_key(coordinate);
        {
            let cache = self.reverse_cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if !entry.is_expired(Instant::now()) {
                    let mut address = entry.address.clone();
                    address.cache_hit = true;
                    return Ok(address);
                }
            }
        }

        let address = self.inner.reverse(coordinate).await?;
        let expiry = Instant::now() + self.ttl_for(address.found);
        let mut to_store = address.clone();
        to_store.cache_hit = false;
        self.reverse_cache.write().await.insert(
            key,
            Entry {
                address: to_store,
                expiry,
            },
        );
        Ok(address)
    }

    async fn search(&self, query: &str) -> Result<Address> {
        {
            let cache = self.forward_cache.read().await;
            if let Some(entry) = cache.get(query) {
                if !entry.is_expired(Instant::now()) {
                    let mut address = entry.address.clone();
                    address.cache_hit = true;
                    return Ok(address);
                }
            }
        }

        let address = self.inner.search(query).await?;
        let expiry = Instant::now() + self.ttl_for(address.found);
        let mut to_store = address.clone();
        to_store.cache_hit = false;
        self.forward_cache
            .write()
            .await
            .insert(query.to_owned(), Entry { address: to_store, expiry });
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingGeocoder {
        calls: Arc<AtomicUsize>,
        found: bool,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        fn name(&self) -> &str {
            "counting"
        }

        async fn reverse(&self, coordinate: Coordinate) -> Result<Address> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.found {
                Ok(Address {
                    found: true,
                    display_name: "X".to_owned(),
                    coordinate,
                    ..Address::default()
                })
            } else {
                Ok(Address::not_found(coordinate))
            }
        }
    }

    #[tokio::test]
    async fn scenario_cache_hit_across_quantum() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = CountingGeocoder {
            calls: calls.clone(),
            found: true,
        };
        let cache = CachedGeocoder::new(Box::new(inner));

        let a = cache.reverse(Coordinate::new(52.5129, 13.3910, 10.0)).await.unwrap();
        assert!(!a.cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Within the same 0.01-degree cell.
        let b = cache.reverse(Coordinate::new(52.5149, 13.3890, 10.0)).await.unwrap();
        assert!(b.cache_hit);
        assert_eq!(b.display_name, "X");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "should not have called through again");
    }

    #[tokio::test]
    async fn scenario_miss_is_cached_with_shorter_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = CountingGeocoder {
            calls: calls.clone(),
            found: false,
        };
        let cache = CachedGeocoder::with_ttls(
            Box::new(inner),
            Duration::from_secs(3600),
            Duration::from_millis(30),
        );

        let a = cache.reverse(Coordinate::new(2.0, -2.0, 10.0)).await.unwrap();
        assert!(!a.found);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Still within ttl_miss: re-use the cached miss.
        cache.reverse(Coordinate::new(2.0, -2.0, 10.0)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.reverse(Coordinate::new(2.0, -2.0, 10.0)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "miss ttl should have expired");
    }

    #[tokio::test]
    async fn ttl_hit_expiry_reaches_underlying_geocoder_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = CountingGeocoder {
            calls: calls.clone(),
            found: true,
        };
        let cache = CachedGeocoder::with_ttls(
            Box::new(inner),
            Duration::from_millis(30),
            Duration::from_secs(600),
        );

        cache.reverse(Coordinate::new(1.0, 1.0, 10.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let after = cache.reverse(Coordinate::new(1.0, 1.0, 10.0)).await.unwrap();
        assert!(!after.cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
