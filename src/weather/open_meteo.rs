//! Default weather backend: the free, keyless Open-Meteo forecast API.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::config::Units;
use crate::coordinate::Coordinate;
use crate::Result;

use super::{DayHour, Reading, WeatherData, WeatherProvider};

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const CURRENT_PARAMS: &str = "temperature_2m,apparent_temperature,relative_humidity_2m,surface_pressure,wind_speed_10m,wind_direction_10m,wind_gusts_10m,weather_code,is_day";
const HOURLY_PARAMS: &str = "temperature_2m,apparent_temperature,relative_humidity_2m,surface_pressure,wind_speed_10m,wind_direction_10m,wind_gusts_10m,weather_code,is_day";

pub struct OpenMeteo {
    client: reqwest::Client,
}

impl OpenMeteo {
    pub fn new() -> OpenMeteo {
        OpenMeteo {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OpenMeteo {
    fn default() -> Self {
        OpenMeteo::new()
    }
}

#[derive(Debug, Deserialize)]
struct CurrentUnits {
    temperature_2m: String,
    wind_speed_10m: String,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    surface_pressure: f64,
    wind_speed_10m: f64,
    wind_direction_10m: f64,
    wind_gusts_10m: f64,
    weather_code: u16,
    is_day: u8,
}

#[derive(Debug, Deserialize)]
struct Hourly {
    time: Vec<String>,
    temperature_2m: Vec<f64>,
    apparent_temperature: Vec<f64>,
    relative_humidity_2m: Vec<f64>,
    surface_pressure: Vec<f64>,
    wind_speed_10m: Vec<f64>,
    wind_direction_10m: Vec<f64>,
    wind_gusts_10m: Vec<f64>,
    weather_code: Vec<u16>,
    is_day: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Current,
    current_units: CurrentUnits,
    hourly: Hourly,
}

fn reading_from_current(current: &Current, units: &CurrentUnits) -> Reading {
    Reading {
        temperature: current.temperature_2m,
        apparent_temperature: current.apparent_temperature,
        humidity: current.relative_humidity_2m,
        pressure: current.surface_pressure,
        wind_speed: current.wind_speed_10m,
        wind_direction: current.wind_direction_10m,
        wind_gusts: current.wind_gusts_10m,
        weather_code: current.weather_code,
        is_day: current.is_day != 0,
        temperature_unit: units.temperature_2m.clone(),
        wind_speed_unit: units.wind_speed_10m.clone(),
    }
}

fn hourly_map(hourly: &Hourly, units: &CurrentUnits) -> BTreeMap<DayHour, Reading> {
    let mut map = BTreeMap::new();
    for i in 0..hourly.time.len() {
        let Ok(dt) = NaiveDateTime::parse_from_str(&hourly.time[i], "%Y-%m-%dT%H:%M") else {
            continue;
        };
        let reading = Reading {
            temperature: hourly.temperature_2m[i],
            apparent_temperature: hourly.apparent_temperature[i],
            humidity: hourly.relative_humidity_2m[i],
            pressure: hourly.surface_pressure[i],
            wind_speed: hourly.wind_speed_10m[i],
            wind_direction: hourly.wind_direction_10m[i],
            wind_gusts: hourly.wind_gusts_10m[i],
            weather_code: hourly.weather_code[i],
            is_day: hourly.is_day[i] != 0,
            temperature_unit: units.temperature_2m.clone(),
            wind_speed_unit: units.wind_speed_10m.clone(),
        };
        map.insert(DayHour::from_datetime(&dt), reading);
    }
    map
}

#[async_trait]
impl WeatherProvider for OpenMeteo {
    fn name(&self) -> &str {
        "open-meteo"
    }

    async fn fetch(&self, coordinate: Coordinate, units: Units) -> Result<WeatherData> {
        let (temperature_unit, wind_speed_unit) = match units {
            Units::Metric => ("celsius", "kmh"),
            Units::Imperial => ("fahrenheit", "mph"),
        };
        let resp: ForecastResponse = self
            .client
            .get(FORECAST_URL)
            .query(&[
                ("latitude", coordinate.lat.to_string()),
                ("longitude", coordinate.lon.to_string()),
                ("current", CURRENT_PARAMS.to_owned()),
                ("hourly", HOURLY_PARAMS.to_owned()),
                ("timezone", "auto".to_owned()),
                ("forecast_days", "3".to_owned()),
                ("temperature_unit", temperature_unit.to_owned()),
                ("wind_speed_unit", wind_speed_unit.to_owned()),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(WeatherData {
            generated_at: SystemTime::now(),
            coordinate,
            current: reading_from_current(&resp.current, &resp.current_units),
            hourly: hourly_map(&resp.hourly, &resp.current_units),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_map_skips_unparseable_timestamps() {
        let units = CurrentUnits {
            temperature_2m: "°C".to_owned(),
            wind_speed_10m: "km/h".to_owned(),
        };
        let hourly = Hourly {
            time: vec!["not-a-timestamp".to_owned(), "2026-07-30T15:00".to_owned()],
            temperature_2m: vec![0.0, 21.5],
            apparent_temperature: vec![0.0, 20.0],
            relative_humidity_2m: vec![0.0, 55.0],
            surface_pressure: vec![0.0, 1012.0],
            wind_speed_10m: vec![0.0, 10.0],
            wind_direction_10m: vec![0.0, 270.0],
            wind_gusts_10m: vec![0.0, 15.0],
            weather_code: vec![0, 3],
            is_day: vec![0, 1],
        };
        let map = hourly_map(&hourly, &units);
        assert_eq!(map.len(), 1);
        let (key, reading) = map.iter().next().unwrap();
        assert_eq!(key.hour, 15);
        assert_eq!(reading.temperature, 21.5);
    }
}
