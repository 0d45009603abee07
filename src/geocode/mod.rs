//! Reverse/forward geocoding: the abstract contract, plus concrete backends.

pub mod cache;
pub mod nominatim;
pub mod opencage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::Result;

/// A geocoded address: the result of a reverse (coordinate -> address) or
/// forward (address string -> coordinate) lookup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Address {
    pub found: bool,
    pub cache_hit: bool,
    pub coordinate: Coordinate,
    pub display_name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub municipality: Option<String>,
    pub city_district: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub suburb: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
}

impl Address {
    /// A "not found" address at the given coordinate.
    pub fn not_found(coordinate: Coordinate) -> Address {
        Address {
            found: false,
            coordinate,
            ..Address::default()
        }
    }

    /// City name with the `city ∥ town ∥ village` fallback order (spec §3).
    pub fn city_name(&self) -> Option<&str> {
        self.city
            .as_deref()
            .or(self.town.as_deref())
            .or(self.village.as_deref())
    }
}

/// Abstract geocoding interface.
///
/// Resolves the Open Question in spec §9 about split-vs-unified geocoder
/// capability: every geocoder exposes both directions, but `search` (forward
/// lookup) defaults to an "unsupported" error so backends that can't do
/// forward lookups don't have to fake one.
#[async_trait]
pub trait Geocoder: Send + Sync + 'static {
    /// A short, stable name for this geocoder (used in cache keys and logs).
    fn name(&self) -> &str;

    /// Reverse-geocode a coordinate into an address.
    async fn reverse(&self, coordinate: Coordinate) -> Result<Address>;

    /// Forward-geocode an address string into a coordinate. Backends that
    /// don't support this return [`Error::Unsupported`](anyhow) via the
    /// default implementation.
    async fn search(&self, _query: &str) -> Result<Address> {
        Err(anyhow::anyhow!(
            "geocoder {:?} does not support forward search",
            self.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_name_fallback_order() {
        let mut a = Address::default();
        assert_eq!(a.city_name(), None);
        a.village = Some("Smallville".to_owned());
        assert_eq!(a.city_name(), Some("Smallville"));
        a.town = Some("Midtown".to_owned());
        assert_eq!(a.city_name(), Some("Midtown"));
        a.city = Some("Metropolis".to_owned());
        assert_eq!(a.city_name(), Some("Metropolis"));
    }
}
