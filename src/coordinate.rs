//! Geographic value types shared across providers, the bus, and the
//! geocode cache.
//!
//! See the fusion rules in [`crate::bus`] for how [`Coordinate::pos_has_significant_change`]
//! and accuracy are used to decide whether a new fix should replace the
//! current best one.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Minimum accuracy improvement, in meters, required for one fix to be
/// considered strictly better than another.
pub const ACCURACY_EPSILON: f64 = 50.0;

/// Great-circle distance, in meters, beyond which a position delta is
/// considered significant regardless of accuracy.
pub const DISTANCE_THRESHOLD: f64 = 2_500.0;

/// Semantic accuracy buckets for providers that only expose qualitative
/// precision (country/region/city/zip level).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccuracyClass {
    Country,
    Region,
    City,
    Zip,
    Unknown,
}

impl AccuracyClass {
    /// The accuracy, in meters, this class maps to.
    pub fn meters(self) -> f64 {
        match self {
            AccuracyClass::Country => 300_000.0,
            AccuracyClass::Region => 100_000.0,
            AccuracyClass::City => 15_000.0,
            AccuracyClass::Zip => 3_000.0,
            AccuracyClass::Unknown => 1_000_000.0,
        }
    }
}

/// A geographic position with an accuracy radius.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
    /// Altitude in meters, if known.
    pub alt: Option<f64>,
    /// Accuracy radius in meters. Zero means "unknown".
    pub acc: f64,
    /// Whether this coordinate was actually resolved (as opposed to being a
    /// default/placeholder value).
    pub found: bool,
    /// Whether this value was served from a cache.
    pub cache_hit: bool,
}

impl Coordinate {
    /// Create a coordinate at the given latitude/longitude with the given
    /// accuracy, in meters.
    pub fn new(lat: f64, lon: f64, acc: f64) -> Coordinate {
        Coordinate {
            lat,
            lon,
            alt: None,
            acc,
            found: true,
            cache_hit: false,
        }
    }

    /// Is this a well-formed geographic position?
    pub fn valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to `other`, in meters, using the Haversine
    /// formula (Earth radius 6,371,000 m).
    pub fn distance_meters(&self, other: &Coordinate) -> f64 {
        let a = Point::new(self.lon, self.lat);
        let b = Point::new(other.lon, other.lat);
        Haversine.distance(a, b)
    }

    /// Does moving from `other` to `self` represent a significant change in
    /// position?
    ///
    /// True iff (a) `self` is much more accurate than `other` (by more than
    /// [`ACCURACY_EPSILON`]), or (b) the great-circle distance between them
    /// exceeds [`DISTANCE_THRESHOLD`].
    pub fn pos_has_significant_change(&self, other: &Coordinate) -> bool {
        if other.acc - self.acc > ACCURACY_EPSILON {
            return true;
        }
        self.distance_meters(other) > DISTANCE_THRESHOLD
    }
}

/// Floor `x` toward zero at `10^-precision`.
///
/// All provider-emitted coordinates are truncated to 4 decimals (~11 m
/// resolution) before publication, to suppress GPS/Wi-Fi jitter.
pub fn truncate(x: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (x * factor).trunc() / factor
}

/// Truncate both components of a lat/lon pair to 4 decimal places.
pub fn truncate_coords(lat: f64, lon: f64) -> (f64, f64) {
    (truncate(lat, 4), truncate(lon, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64, acc: f64) -> Coordinate {
        Coordinate::new(lat, lon, acc)
    }

    #[test]
    fn truncate_floors_toward_zero() {
        assert_eq!(truncate(1.23456, 4), 1.2345);
        assert_eq!(truncate(-1.23456, 4), -1.2345);
        assert_eq!(truncate(0.00001, 4), 0.0);
    }

    #[test]
    fn no_change_against_self() {
        let c = coord(52.5129, 13.3910, 50.0);
        assert!(!c.pos_has_significant_change(&c));
    }

    #[test]
    fn close_equal_accuracy_is_not_significant() {
        let a = coord(52.5129, 13.3910, 50.0);
        // About 600m away: within the 2.5km threshold.
        let b = coord(52.5180, 13.3910, 50.0);
        assert!(a.distance_meters(&b) < DISTANCE_THRESHOLD);
        assert!(!a.pos_has_significant_change(&b));
    }

    #[test]
    fn far_apart_is_significant() {
        let a = coord(52.5129, 13.3910, 50.0);
        // Roughly 6km east.
        let b = coord(52.5129, 13.4700, 50.0);
        assert!(a.pos_has_significant_change(&b));
    }

    #[test]
    fn much_more_accurate_is_significant_even_at_same_point() {
        let a = coord(52.5129, 13.3910, 15.0);
        let b = coord(52.5129, 13.3910, 15_000.0);
        assert!(a.pos_has_significant_change(&b));
    }

    #[test]
    fn slightly_more_accurate_is_not_significant() {
        let a = coord(52.5129, 13.3910, 3_000.0);
        let b = coord(52.5129, 13.3910, 3_010.0);
        assert!(!a.pos_has_significant_change(&b));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(!coord(91.0, 0.0, 1.0).valid());
        assert!(!coord(0.0, 181.0, 1.0).valid());
        assert!(coord(90.0, 180.0, 1.0).valid());
    }
}
