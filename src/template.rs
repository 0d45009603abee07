//! Renders the four waybar output strings (text, alt_text, tooltip,
//! alt_tooltip) from a weather fetch, via user-configurable
//! [minijinja](https://docs.rs/minijinja) templates (spec §6).

use chrono::{Datelike, NaiveDate};
use minijinja::{context, Environment};
use serde::Serialize;

use crate::geocode::Address;
use crate::weather::{DayHour, Reading, WeatherData};
use crate::Result;

/// Moon phase names, eight buckets over a 29.53-day synodic month.
const MOON_PHASES: [&str; 8] = [
    "New Moon",
    "Waxing Crescent",
    "First Quarter",
    "Waxing Gibbous",
    "Full Moon",
    "Waning Gibbous",
    "Last Quarter",
    "Waning Crescent",
];

/// Approximates the moon's phase name for a given calendar date using a
/// fixed reference new moon (2000-01-06) and the 29.53-day synodic period.
/// Accurate to within about a day, which is plenty for a status-bar icon.
pub fn moon_phase_name(date: NaiveDate) -> &'static str {
    const SYNODIC_DAYS: f64 = 29.530588;
    let reference = NaiveDate::from_ymd_opt(2000, 1, 6).expect("valid reference date");
    let days_since = (date - reference).num_days() as f64;
    let age = days_since.rem_euclid(SYNODIC_DAYS);
    let bucket = ((age / SYNODIC_DAYS) * MOON_PHASES.len() as f64).floor() as usize;
    MOON_PHASES[bucket.min(MOON_PHASES.len() - 1)]
}

/// Eight-point compass directions, each 22.5 degrees wide, centered on N/NE/...
const COMPASS_POINTS: [(&str, &str); 8] = [
    ("N", "↓"),
    ("NE", "↙"),
    ("E", "←"),
    ("SE", "↖"),
    ("S", "↑"),
    ("SW", "↗"),
    ("W", "→"),
    ("NW", "↘"),
];

/// Maps a wind direction in degrees (0 = north, clockwise) to an 8-point
/// compass label and an arrow glyph pointing where the wind is blowing
/// *toward* (hence the glyph is the reverse of the named direction).
pub fn wind_compass(direction_deg: f64) -> (&'static str, &'static str) {
    let normalized = direction_deg.rem_euclid(360.0);
    let index = ((normalized + 22.5) / 45.0).floor() as usize % 8;
    COMPASS_POINTS[index]
}

/// A WMO weather code mapped to a human condition, an icon glyph, and a
/// coarse category used for waybar CSS classes.
pub struct WeatherCondition {
    pub condition: &'static str,
    pub icon: &'static str,
    pub category: &'static str,
}

/// Maps an Open-Meteo / WMO weather code to a condition description, day/night
/// icon, and category. See
/// <https://open-meteo.com/en/docs> for the code table.
pub fn weather_condition(code: u16, is_day: bool) -> WeatherCondition {
    let (condition, icon_day, icon_night, category) = match code {
        0 => ("Clear sky", "☀️", "🌙", "clear"),
        1..=2 => ("Partly cloudy", "🌤️", "☁️", "clear"),
        3 => ("Overcast", "☁️", "☁️", "cloudy"),
        45 | 48 => ("Fog", "🌫️", "🌫️", "fog"),
        51..=57 => ("Drizzle", "🌦️", "🌧️", "rain"),
        61..=67 => ("Rain", "🌧️", "🌧️", "rain"),
        71..=77 => ("Snow", "🌨️", "🌨️", "snow"),
        80..=82 => ("Rain showers", "🌦️", "🌧️", "rain"),
        85 | 86 => ("Snow showers", "🌨️", "🌨️", "snow"),
        95..=99 => ("Thunderstorm", "⛈️", "⛈️", "thunderstorm"),
        _ => ("Unknown", "❓", "❓", ""),
    };
    WeatherCondition {
        condition,
        icon: if is_day { icon_day } else { icon_night },
        category,
    }
}

#[derive(Serialize)]
struct ReadingContext<'a> {
    temperature: f64,
    apparent_temperature: f64,
    humidity: f64,
    pressure: f64,
    wind_speed: f64,
    wind_direction: f64,
    wind_compass: &'static str,
    wind_arrow: &'static str,
    wind_gusts: f64,
    condition: &'static str,
    icon: &'static str,
    category: &'static str,
    temperature_unit: &'a str,
    wind_speed_unit: &'a str,
}

fn reading_context<'a>(reading: &'a Reading) -> ReadingContext<'a> {
    let (compass, arrow) = wind_compass(reading.wind_direction);
    let condition = weather_condition(reading.weather_code, reading.is_day);
    ReadingContext {
        temperature: reading.temperature,
        apparent_temperature: reading.apparent_temperature,
        humidity: reading.humidity,
        pressure: reading.pressure,
        wind_speed: reading.wind_speed,
        wind_direction: reading.wind_direction,
        wind_compass: compass,
        wind_arrow: arrow,
        wind_gusts: reading.wind_gusts,
        condition: condition.condition,
        icon: condition.icon,
        category: condition.category,
        temperature_unit: &reading.temperature_unit,
        wind_speed_unit: &reading.wind_speed_unit,
    }
}

/// The four rendered output strings for one waybar update.
#[derive(Debug, Default, Clone)]
pub struct Rendered {
    pub text: String,
    pub alt_text: String,
    pub tooltip: String,
    pub alt_tooltip: String,
}

/// Holds the four user-configurable template sources and renders them
/// against a weather fetch plus the current address.
pub struct Templates {
    text: String,
    alt_text: String,
    tooltip: String,
    alt_tooltip: String,
}

impl Templates {
    pub fn new(text: String, alt_text: String, tooltip: String, alt_tooltip: String) -> Templates {
        Templates {
            text,
            alt_text,
            tooltip,
            alt_tooltip,
        }
    }

    pub fn render(
        &self,
        address: &Address,
        weather: &WeatherData,
        now: DayHour,
        forecast_hours: u8,
    ) -> Result<Rendered> {
        let mut env = Environment::new();
        env.add_template("text", &self.text)?;
        env.add_template("alt_text", &self.alt_text)?;
        env.add_template("tooltip", &self.tooltip)?;
        env.add_template("alt_tooltip", &self.alt_tooltip)?;

        let current = reading_context(&weather.current);
        let forecast = weather
            .forecast_by_offset(now, forecast_hours as i64)
            .map(reading_context);
        let moon_phase = moon_phase_name(now.date);
        let city = address.city_name().unwrap_or("Unknown location");

        let ctx = context! {
            current => current,
            forecast => forecast,
            forecast_hours => forecast_hours,
            moon_phase => moon_phase,
            city => city,
            address => address,
            day => now.date.day(),
            month => now.date.month(),
            year => now.date.year(),
            hour => now.hour,
        };

        Ok(Rendered {
            text: env.get_template("text")?.render(&ctx)?,
            alt_text: env.get_template("alt_text")?.render(&ctx)?,
            tooltip: env.get_template("tooltip")?.render(&ctx)?,
            alt_tooltip: env.get_template("alt_tooltip")?.render(&ctx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compass_buckets_are_22_5_degrees_wide() {
        assert_eq!(wind_compass(0.0).0, "N");
        assert_eq!(wind_compass(10.0).0, "N");
        assert_eq!(wind_compass(350.0).0, "N");
        assert_eq!(wind_compass(90.0).0, "E");
        assert_eq!(wind_compass(180.0).0, "S");
        assert_eq!(wind_compass(270.0).0, "W");
    }

    #[test]
    fn weather_condition_picks_day_or_night_icon() {
        let day = weather_condition(0, true);
        let night = weather_condition(0, false);
        assert_ne!(day.icon, night.icon);
        assert_eq!(day.category, "clear");
    }

    #[test]
    fn unknown_code_falls_back_gracefully() {
        let c = weather_condition(9999, true);
        assert_eq!(c.category, "");
    }

    #[test]
    fn moon_phase_is_stable_across_a_known_full_moon() {
        // 2000-01-06 is the reference new moon; ~14.77 days later is full.
        let full_ish = NaiveDate::from_ymd_opt(2000, 1, 21).unwrap();
        assert_eq!(moon_phase_name(full_ish), "Full Moon");
    }

    #[test]
    fn renders_all_four_templates() {
        let templates = Templates::new(
            "{{ current.temperature }}".to_owned(),
            "{{ city }}".to_owned(),
            "{{ current.condition }}".to_owned(),
            "{{ moon_phase }}".to_owned(),
        );
        let address = Address {
            found: true,
            city: Some("Berlin".to_owned()),
            ..Address::default()
        };
        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let weather = WeatherData {
            generated_at: std::time::SystemTime::now(),
            coordinate: crate::coordinate::Coordinate::default(),
            current: Reading {
                temperature: 21.0,
                weather_code: 0,
                is_day: true,
                ..Reading::default()
            },
            hourly: Default::default(),
        };
        let now = DayHour::new(date, 12);
        let rendered = templates.render(&address, &weather, now, 3).unwrap();
        assert_eq!(rendered.text, "21");
        assert_eq!(rendered.alt_text, "Berlin");
        assert_eq!(rendered.tooltip, "Clear sky");
    }
}
