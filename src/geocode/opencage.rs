//! Reverse/forward geocoding via the OpenCage Geocoder API. Requires an API
//! key (spec §6: `geocoder.apikey`).

use async_trait::async_trait;
use serde::Deserialize;

use crate::coordinate::Coordinate;
use crate::Result;

use super::{Address, Geocoder};

pub struct OpenCage {
    client: reqwest::Client,
    apikey: String,
}

impl OpenCage {
    pub fn new(apikey: String) -> Result<OpenCage> {
        if apikey.trim().is_empty() {
            anyhow::bail!("geocoder \"opencage\" requires geocoder.apikey");
        }
        Ok(OpenCage {
            client: reqwest::Client::new(),
            apikey,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct Components {
    country: Option<String>,
    state: Option<String>,
    county: Option<String>,
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
struct Geometry {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct ResultItem {
    formatted: String,
    #[serde(default)]
    components: Components,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Response {
    results: Vec<ResultItem>,
}

fn address_from_result(item: ResultItem) -> Address {
    let c = item.components;
    Address {
        found: true,
        cache_hit: false,
        coordinate: Coordinate::new(item.geometry.lat, item.geometry.lng, 0.0),
        display_name: item.formatted,
        country: c.country,
        state: c.state.or(c.county),
        municipality: None,
        city_district: c.city_district,
        postcode: c.postcode,
        city: c.city,
        town: c.town,
        village: c.village,
        suburb: c.suburb,
        street: c.road,
        house_number: c.house_number,
    }
}

#[async_trait]
impl Geocoder for OpenCage {
    fn name(&self) -> &str {
        "opencage"
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<Address> {
        let query = format!("{},{}", coordinate.lat, coordinate.lon);
        self.lookup(&query).await
    }

    async fn search(&self, query: &str) -> Result<Address> {
        self.lookup(query).await
    }
}

impl OpenCage {
    async fn lookup(&self, query: &str) -> Result<Address> {
        let resp: Response = self
            .client
            .get("https://api.opencagedata.com/geocode/v1/json")
            .query(&[("q", query), ("key", self.apikey.as_str()), ("limit", "1")])
            .timeout(std::time::Duration::from_secs(8))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        match resp.results.into_iter().next() {
            Some(item) => Ok(address_from_result(item)),
            None => Ok(Address::not_found(Coordinate::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_apikey() {
        assert!(OpenCage::new(String::new()).is_err());
        assert!(OpenCage::new("   ".to_owned()).is_err());
        assert!(OpenCage::new("abc123".to_owned()).is_ok());
    }
}
