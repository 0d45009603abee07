//! Weather fetching: the abstract contract, plus the default backend.

pub mod open_meteo;

use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::Units;
use crate::coordinate::Coordinate;
use crate::Result;

/// An hourly bucket in the forecast map: a calendar date plus an hour of day
/// (0-23, local time as reported by the provider).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayHour {
    pub date: NaiveDate,
    pub hour: u8,
}

impl DayHour {
    pub fn new(date: NaiveDate, hour: u8) -> DayHour {
        DayHour { date, hour }
    }

    pub fn from_datetime(dt: &chrono::NaiveDateTime) -> DayHour {
        DayHour::new(dt.date(), dt.hour() as u8)
    }
}

/// A single hourly (or "current") weather reading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Reading {
    pub temperature: f64,
    pub apparent_temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub wind_gusts: f64,
    /// WMO weather interpretation code.
    pub weather_code: u16,
    pub is_day: bool,
    pub temperature_unit: String,
    pub wind_speed_unit: String,
}

/// A complete weather fetch: a "now" reading plus an hourly forecast.
#[derive(Clone, Debug)]
pub struct WeatherData {
    pub generated_at: SystemTime,
    pub coordinate: Coordinate,
    pub current: Reading,
    pub hourly: BTreeMap<DayHour, Reading>,
}

impl WeatherData {
    /// The forecast reading `hours` ahead of `current`'s bucket, if known.
    pub fn forecast_by_offset(&self, from: DayHour, hours: i64) -> Option<&Reading> {
        let naive = from.date.and_hms_opt(from.hour as u32, 0, 0)?;
        let target = naive.checked_add_signed(chrono::Duration::hours(hours))?;
        self.hourly.get(&DayHour::from_datetime(&target))
    }
}

/// Abstract weather-fetching interface. A single implementation
/// ([`open_meteo::OpenMeteo`]) ships by default, but the trait keeps the
/// service loop decoupled from any one provider's wire format.
#[async_trait]
pub trait WeatherProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Fetch current conditions and an hourly forecast for `coordinate`,
    /// reported in the given `units`.
    async fn fetch(&self, coordinate: Coordinate, units: Units) -> Result<WeatherData>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn forecast_offset_looks_up_the_right_bucket() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let mut hourly = BTreeMap::new();
        hourly.insert(DayHour::new(date, 15), Reading { temperature: 20.0, ..Reading::default() });
        let data = WeatherData {
            generated_at: SystemTime::now(),
            coordinate: Coordinate::default(),
            current: Reading::default(),
            hourly,
        };
        let found = data.forecast_by_offset(DayHour::new(date, 12), 3).unwrap();
        assert_eq!(found.temperature, 20.0);
        assert!(data.forecast_by_offset(DayHour::new(date, 12), 7).is_none());
    }
}
