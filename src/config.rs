//! Configuration loading: TOML/YAML/JSON, auto-detected by file extension,
//! merged with `WAYBARWEATHER_<SECTION>_<KEY>` environment overrides (spec
//! §6).

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

fn default_geolocation_key() -> String {
    "default".to_owned()
}

fn default_cityname_file() -> PathBuf {
    default_config_dir().join("cityname")
}

fn default_geolocation_file() -> PathBuf {
    default_config_dir().join("location")
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waybar-weather")
}

/// Units a weather provider should be asked to report in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Metric,
    Imperial,
}

impl Default for Units {
    fn default() -> Self {
        Units::Metric
    }
}

pub const DEFAULT_TEXT_TEMPLATE: &str =
    "{{ current.icon }} {{ current.temperature }}{{ current.temperature_unit }}";
const DEFAULT_TEXT_TEMPLATE_NO_ICON: &str = "{{ current.temperature }}{{ current.temperature_unit }}";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub key: String,
    pub disable_geoip: bool,
    pub disable_geoapi: bool,
    pub disable_ichnaea: bool,
    pub disable_gpsd: bool,
    pub disable_cityname_file: bool,
    pub disable_geolocation_file: bool,
    pub cityname_file: PathBuf,
    pub geolocation_file: PathBuf,
    pub gpsd_host: String,
    pub gpsd_port: u16,
    pub geoapi_url: Option<String>,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        GeolocationConfig {
            key: default_geolocation_key(),
            disable_geoip: false,
            disable_geoapi: true,
            disable_ichnaea: true,
            disable_gpsd: true,
            disable_cityname_file: true,
            disable_geolocation_file: true,
            cityname_file: default_cityname_file(),
            geolocation_file: default_geolocation_file(),
            gpsd_host: "127.0.0.1".to_owned(),
            gpsd_port: 2947,
            geoapi_url: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub provider: String,
    pub apikey: Option<String>,
    pub cache: bool,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        GeocoderConfig {
            provider: "nominatim".to_owned(),
            apikey: None,
            cache: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub provider: String,
    /// Forecast offset, in hours, used by the renderer. Clamped to [1, 24].
    pub forecast_hours: u8,
    pub cold_threshold: f64,
    pub hot_threshold: f64,
}

impl WeatherConfig {
    pub fn forecast_hours_clamped(&self) -> u8 {
        self.forecast_hours.clamp(1, 24)
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        WeatherConfig {
            provider: "open-meteo".to_owned(),
            forecast_hours: 3,
            cold_threshold: -2.0,
            hot_threshold: 30.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    pub weather_update_secs: u64,
    pub output_secs: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        IntervalsConfig {
            weather_update_secs: 900,
            output_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub text: String,
    pub alt_text: String,
    pub tooltip: String,
    pub alt_tooltip: String,
    pub use_css_icon: bool,
}

impl TemplatesConfig {
    /// The effective text template, honoring `use_css_icon`: if the
    /// template is still at its built-in default and icons are delegated to
    /// CSS, the emoji icon is stripped out.
    pub fn effective_text(&self) -> &str {
        if self.use_css_icon && self.text == DEFAULT_TEXT_TEMPLATE {
            DEFAULT_TEXT_TEMPLATE_NO_ICON
        } else {
            &self.text
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        TemplatesConfig {
            text: DEFAULT_TEXT_TEMPLATE.to_owned(),
            alt_text: "{{ city }}: {{ current.condition }}".to_owned(),
            tooltip: "{{ city }}\n{{ current.condition }}, {{ current.temperature }}{{ current.temperature_unit }} (feels {{ current.apparent_temperature }}{{ current.temperature_unit }})\nWind {{ current.wind_speed }}{{ current.wind_speed_unit }} {{ current.wind_compass }} {{ current.wind_arrow }}\n{{ moon_phase }}".to_owned(),
            alt_tooltip: "{{ city }} -- {{ current.condition }}".to_owned(),
            use_css_icon: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub units: Units,
    /// BCP-47 locale tag. Empty means auto-detect.
    pub locale: String,
    /// Standard leveled name (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
    pub geolocation: GeolocationConfig,
    pub geocoder: GeocoderConfig,
    pub weather: WeatherConfig,
    pub intervals: IntervalsConfig,
    pub templates: TemplatesConfig,
}

impl Config {
    pub fn log_level_or_default(&self) -> &str {
        if self.log_level.is_empty() {
            "error"
        } else {
            &self.log_level
        }
    }
}

/// Formats the file extension of `path`, used to decide how to parse it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Format {
    Toml,
    Yaml,
    Json,
}

fn format_for_path(path: &Path) -> Result<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Ok(Format::Toml),
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        other => anyhow::bail!("unrecognized config file extension: {:?}", other),
    }
}

fn parse(contents: &str, format: Format) -> Result<Config> {
    Ok(match format {
        Format::Toml => toml::from_str(contents)?,
        Format::Yaml => serde_yaml::from_str(contents)?,
        Format::Json => serde_json::from_str(contents)?,
    })
}

/// Search order for an implicit config file, tried in order.
fn search_paths() -> Vec<PathBuf> {
    let dir = default_config_dir();
    vec![
        dir.join("config.toml"),
        dir.join("config.yaml"),
        dir.join("config.yml"),
        dir.join("config.json"),
    ]
}

/// Loads configuration: from `explicit_path` if given, otherwise the first
/// existing file in the standard search path, otherwise defaults. Applies
/// `WAYBARWEATHER_<SECTION>_<KEY>` environment overrides last.
pub fn load(explicit_path: Option<&Path>) -> Result<Config> {
    let mut config = match explicit_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|err| anyhow::anyhow!("could not read config file {}: {}", path.display(), err))?;
            parse(&contents, format_for_path(path)?)?
        }
        None => {
            let mut found = None;
            for candidate in search_paths() {
                if candidate.is_file() {
                    let contents = std::fs::read_to_string(&candidate)?;
                    found = Some(parse(&contents, format_for_path(&candidate)?)?);
                    break;
                }
            }
            found.unwrap_or_default()
        }
    };
    apply_env_overrides(&mut config, &env::vars().collect())?;
    Ok(config)
}

/// Applies `WAYBARWEATHER_<SECTION>_<KEY>` overrides on top of an
/// already-parsed config, by round-tripping it through a JSON value so we
/// don't need one setter per field.
fn apply_env_overrides(config: &mut Config, vars: &HashMap<String, String>) -> Result<()> {
    let mut value = serde_json::to_value(&*config)?;
    let prefix = "WAYBARWEATHER_";
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let parsed = || serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.clone()));

        // Try the whole suffix as a top-level scalar key first (`units`,
        // `locale`, `log_level`) — this also covers single-word suffixes
        // with no underscore at all, which can never be a `SECTION_KEY` pair.
        let top_level_key = rest.to_lowercase();
        let is_top_level = value.as_object().is_some_and(|obj| obj.contains_key(&top_level_key));
        if is_top_level {
            if let Some(obj) = value.as_object_mut() {
                obj.insert(top_level_key, parsed());
            }
            continue;
        }

        let Some((section, key)) = rest.split_once('_') else {
            continue;
        };
        let section = section.to_lowercase();
        let key = key.to_lowercase();
        if let Some(obj) = value.get_mut(&section).and_then(|v| v.as_object_mut()) {
            obj.insert(key, parsed());
        }
    }
    *config = serde_json::from_value(value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detected_by_extension() {
        assert_eq!(format_for_path(Path::new("c.toml")).unwrap(), Format::Toml);
        assert_eq!(format_for_path(Path::new("c.yaml")).unwrap(), Format::Yaml);
        assert_eq!(format_for_path(Path::new("c.yml")).unwrap(), Format::Yaml);
        assert_eq!(format_for_path(Path::new("c.json")).unwrap(), Format::Json);
        assert!(format_for_path(Path::new("c.ini")).is_err());
    }

    #[test]
    fn toml_roundtrips_defaults() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.weather.provider, config.weather.provider);
        assert_eq!(parsed.units, config.units);
    }

    #[test]
    fn env_override_replaces_a_scalar_field() {
        let mut config = Config::default();
        let mut vars = HashMap::new();
        vars.insert(
            "WAYBARWEATHER_WEATHER_PROVIDER".to_owned(),
            "\"some-other-provider\"".to_owned(),
        );
        apply_env_overrides(&mut config, &vars).unwrap();
        assert_eq!(config.weather.provider, "some-other-provider");
    }

    #[test]
    fn env_override_replaces_a_single_word_top_level_field() {
        let mut config = Config::default();
        let mut vars = HashMap::new();
        vars.insert("WAYBARWEATHER_LOCALE".to_owned(), "\"fr-FR\"".to_owned());
        apply_env_overrides(&mut config, &vars).unwrap();
        assert_eq!(config.locale, "fr-FR");
    }

    #[test]
    fn env_override_replaces_a_multi_word_top_level_field() {
        let mut config = Config::default();
        let mut vars = HashMap::new();
        vars.insert("WAYBARWEATHER_LOG_LEVEL".to_owned(), "\"debug\"".to_owned());
        apply_env_overrides(&mut config, &vars).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn unrelated_env_vars_are_ignored() {
        let mut config = Config::default();
        let before = config.weather.provider.clone();
        let mut vars = HashMap::new();
        vars.insert("PATH".to_owned(), "/usr/bin".to_owned());
        apply_env_overrides(&mut config, &vars).unwrap();
        assert_eq!(config.weather.provider, before);
    }

    #[test]
    fn forecast_hours_are_clamped() {
        let mut weather = WeatherConfig::default();
        weather.forecast_hours = 99;
        assert_eq!(weather.forecast_hours_clamped(), 24);
        weather.forecast_hours = 0;
        assert_eq!(weather.forecast_hours_clamped(), 1);
    }

    #[test]
    fn css_icon_mode_strips_default_text_template_icon() {
        let mut templates = TemplatesConfig::default();
        templates.use_css_icon = true;
        assert_eq!(templates.effective_text(), DEFAULT_TEXT_TEMPLATE_NO_ICON);

        templates.text = "custom {{ current.icon }}".to_owned();
        assert_eq!(templates.effective_text(), "custom {{ current.icon }}");
    }
}
