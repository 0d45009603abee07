//! Reverse/forward geocoding via OpenStreetMap's Nominatim service.
//!
//! Nominatim requires no API key, but its usage policy requires a
//! descriptive `User-Agent`; see
//! <https://operations.osmfoundation.org/policies/nominatim/>.

use async_trait::async_trait;
use serde::Deserialize;

use crate::coordinate::Coordinate;
use crate::Result;

use super::{Address, Geocoder};

const USER_AGENT: &str = concat!("waybar-weather/", env!("CARGO_PKG_VERSION"));

pub struct Nominatim {
    client: reqwest::Client,
}

impl Nominatim {
    pub fn new() -> Result<Nominatim> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Nominatim { client })
    }
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    country: Option<String>,
    state: Option<String>,
    municipality: Option<String>,
    city_district: Option<String>,
    postcode: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    suburb: Option<String>,
    road: Option<String>,
    house_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: NominatimAddress,
    lat: Option<String>,
    lon: Option<String>,
}

impl Default for NominatimAddress {
    fn default() -> Self {
        NominatimAddress {
            country: None,
            state: None,
            municipality: None,
            city_district: None,
            postcode: None,
            city: None,
            town: None,
            village: None,
            suburb: None,
            road: None,
            house_number: None,
        }
    }
}

fn address_from_response(resp: NominatimResponse, fallback: Coordinate) -> Address {
    let coordinate = match (
        resp.lat.as_ref().and_then(|s| s.parse().ok()),
        resp.lon.as_ref().and_then(|s| s.parse().ok()),
    ) {
        (Some(lat), Some(lon)) => Coordinate::new(lat, lon, fallback.acc),
        _ => fallback,
    };
    Address {
        found: true,
        cache_hit: false,
        coordinate,
        display_name: resp.display_name,
        country: resp.address.country,
        state: resp.address.state,
        municipality: resp.address.municipality,
        city_district: resp.address.city_district,
        postcode: resp.address.postcode,
        city: resp.address.city,
        town: resp.address.town,
        village: resp.address.village,
        suburb: resp.address.suburb,
        street: resp.address.road,
        house_number: resp.address.house_number,
    }
}

#[async_trait]
impl Geocoder for Nominatim {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<Address> {
        let resp = self
            .client
            .get("https://nominatim.openstreetmap.org/reverse")
            .query(&[
                ("format", "jsonv2"),
                ("lat", &coordinate.lat.to_string()),
                ("lon", &coordinate.lon.to_string()),
                ("zoom", "14"),
            ])
            .timeout(std::time::Duration::from_secs(8))
            .send()
            .await?
            .error_for_status()?
            .json::<NominatimResponse>()
            .await?;
        Ok(address_from_response(resp, coordinate))
    }

    async fn search(&self, query: &str) -> Result<Address> {
        let results = self
            .client
            .get("https://nominatim.openstreetmap.org/search")
            .query(&[("format", "jsonv2"), ("q", query), ("limit", "1")])
            .timeout(std::time::Duration::from_secs(8))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<NominatimResponse>>()
            .await?;
        match results.into_iter().next() {
            Some(resp) => Ok(address_from_response(resp, Coordinate::default())),
            None => Ok(Address::not_found(Coordinate::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_response_fields() {
        let resp = NominatimResponse {
            display_name: "Reichstag, Berlin, Germany".to_owned(),
            address: NominatimAddress {
                city: Some("Berlin".to_owned()),
                country: Some("Germany".to_owned()),
                ..Default::default()
            },
            lat: Some("52.5186".to_owned()),
            lon: Some("13.3762".to_owned()),
        };
        let addr = address_from_response(resp, Coordinate::new(52.5, 13.4, 50.0));
        assert!(addr.found);
        assert_eq!(addr.city_name(), Some("Berlin"));
        assert_eq!(addr.coordinate.lat, 52.5186);
    }
}
