//! The publication unit on the [`crate::bus::GeolocationBus`]: a single
//! location fix, tagged with a subscription key, a source, a timestamp and a
//! TTL.

use std::time::{Duration, SystemTime};

use crate::coordinate::{Coordinate, ACCURACY_EPSILON};

/// A location fix published by a provider.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationResult {
    /// Subscription key this result applies to.
    pub key: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    /// Accuracy radius, in meters. Must be greater than zero to be published.
    pub accuracy_m: f64,
    /// Name of the provider that produced this fix.
    pub source: String,
    /// When this fix was produced.
    pub at: SystemTime,
    /// How long this fix stays authoritative after `at`.
    pub ttl: Duration,
}

impl LocationResult {
    /// Build a result, defaulting `at` to "unset" (the zero `SystemTime`,
    /// i.e. `UNIX_EPOCH`) so that [`crate::bus::GeolocationBus::publish`]
    /// can stamp it with `now()`.
    pub fn new(key: impl Into<String>, lat: f64, lon: f64, accuracy_m: f64, source: impl Into<String>, ttl: Duration) -> LocationResult {
        LocationResult {
            key: key.into(),
            lat,
            lon,
            alt: None,
            accuracy_m,
            source: source.into(),
            at: SystemTime::UNIX_EPOCH,
            ttl,
        }
    }

    /// Has `at` never been set?
    pub fn at_is_zero(&self) -> bool {
        self.at == SystemTime::UNIX_EPOCH
    }

    /// Is this result too old to still be authoritative?
    pub fn is_expired(&self) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        match SystemTime::now().duration_since(self.at) {
            Ok(age) => age > self.ttl,
            // `at` is in the future (clock skew, or not-yet-stamped): not expired.
            Err(_) => false,
        }
    }

    /// This result's position as a [`Coordinate`].
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
            alt: self.alt,
            acc: self.accuracy_m,
            found: true,
            cache_hit: false,
        }
    }

    /// Deterministic comparison used to choose between two live results for
    /// the same key.
    ///
    /// 1. An unset incumbent (`prev.key` empty) always loses.
    /// 2. An out-of-order result (`self.at < prev.at`) always loses.
    /// 3. A strictly more accurate result (by more than
    ///    [`ACCURACY_EPSILON`]) wins.
    /// 4. A strictly less accurate result loses.
    /// 5. Otherwise, ties preserve the incumbent.
    pub fn better_than(&self, prev: &LocationResult) -> bool {
        if prev.key.is_empty() {
            return true;
        }
        if self.at < prev.at {
            return false;
        }
        if self.accuracy_m < prev.accuracy_m - ACCURACY_EPSILON {
            return true;
        }
        if prev.accuracy_m < self.accuracy_m - ACCURACY_EPSILON {
            return false;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_at(source: &str, acc: f64, secs: u64) -> LocationResult {
        LocationResult {
            key: "k".to_owned(),
            lat: 52.5,
            lon: 13.4,
            alt: None,
            accuracy_m: acc,
            source: source.to_owned(),
            at: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn unset_incumbent_always_loses() {
        let prev = LocationResult {
            key: String::new(),
            ..result_at("a", 100.0, 0)
        };
        let r = result_at("b", 1_000_000.0, 0);
        assert!(r.better_than(&prev));
    }

    #[test]
    fn out_of_order_result_loses() {
        let prev = result_at("a", 1_000.0, 10);
        let r = result_at("b", 1.0, 5);
        assert!(!r.better_than(&prev));
    }

    #[test]
    fn strictly_more_accurate_wins() {
        let prev = result_at("a", 15_000.0, 0);
        let r = result_at("b", 3_000.0, 1);
        assert!(r.better_than(&prev));
        assert!(!prev.better_than(&r));
    }

    #[test]
    fn tie_is_not_better() {
        let prev = result_at("a", 3_000.0, 0);
        let r = result_at("b", 3_010.0, 1);
        assert!(!r.better_than(&prev));
        assert!(!prev.better_than(&r));
    }

    #[test]
    fn better_than_is_antisymmetric_up_to_epsilon() {
        let a = result_at("a", 3_000.0, 0);
        let b = result_at("b", 3_010.0, 1);
        assert!(!(a.better_than(&b) && b.better_than(&a)));
    }

    #[test]
    fn expiry_respects_ttl() {
        let mut r = result_at("a", 100.0, 0);
        r.at = SystemTime::now();
        r.ttl = Duration::from_millis(0);
        assert!(!r.is_expired(), "zero ttl means never expires");
        r.ttl = Duration::from_secs(3600);
        assert!(!r.is_expired());
    }
}
