//! The service loop: wires the geolocation bus, provider orchestrator,
//! geocoder and weather provider together, and renders waybar output on a
//! schedule (spec §4.6).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::GeolocationBus;
use crate::config::Config;
use crate::geocode::{Address, Geocoder};
use crate::orchestrator::ProviderOrchestrator;
use crate::provider::Provider;
use crate::template::Templates;
use crate::weather::{DayHour, WeatherData, WeatherProvider};
use crate::Result;

const LOCATION_BUFFER: usize = 8;
const WEATHER_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct LocationState {
    address: Address,
    lat: f64,
    lon: f64,
    is_set: bool,
}

impl Default for LocationState {
    fn default() -> Self {
        LocationState {
            address: Address::default(),
            lat: 0.0,
            lon: 0.0,
            is_set: false,
        }
    }
}

struct WeatherState {
    weather: Option<WeatherData>,
}

/// Runs the service until `cancel` fires: subscribes to the bus, debounces
/// reverse geocoding, fetches weather on a schedule, and prints one JSON
/// line per render to stdout.
pub struct Service {
    config: Config,
    bus: GeolocationBus,
    geocoder: Arc<dyn Geocoder>,
    weather_provider: Arc<dyn WeatherProvider>,
    location: Arc<RwLock<LocationState>>,
    weather: Arc<RwLock<WeatherState>>,
    display_alt_text: Arc<std::sync::atomic::AtomicBool>,
    cancel: CancellationToken,
}

impl Service {
    pub fn new(
        config: Config,
        geocoder: Arc<dyn Geocoder>,
        weather_provider: Arc<dyn WeatherProvider>,
        cancel: CancellationToken,
    ) -> Service {
        Service {
            config,
            bus: GeolocationBus::new(),
            geocoder,
            weather_provider,
            location: Arc::new(RwLock::new(LocationState::default())),
            weather: Arc::new(RwLock::new(WeatherState { weather: None })),
            display_alt_text: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            cancel,
        }
    }

    pub fn bus(&self) -> GeolocationBus {
        self.bus.clone()
    }

    pub fn toggle_display_alt_text(&self) {
        let prev = self
            .display_alt_text
            .fetch_xor(true, std::sync::atomic::Ordering::SeqCst);
        info!(alt_text = !prev, "toggled display mode");
    }

    pub async fn log_current_location(&self) {
        let location = self.location.read().await;
        if location.is_set {
            info!(
                lat = location.lat,
                lon = location.lon,
                city = location.address.city_name(),
                "current location"
            );
        } else {
            info!("no location fix yet");
        }
    }

    /// Spawns the provider orchestrator and enters the subscribe/render loop.
    /// Returns when `cancel` fires.
    pub async fn run(self: Arc<Self>, providers: Vec<Arc<dyn Provider>>) -> Result<()> {
        if providers.is_empty() {
            anyhow::bail!("no location providers enabled; refusing to start");
        }

        let orchestrator = ProviderOrchestrator::spawn(
            self.bus.clone(),
            self.config.geolocation.key.clone(),
            self.cancel.clone(),
            providers,
        );

        let render_interval = Duration::from_secs(self.config.intervals.output_secs);
        let render_self = self.clone();
        let render_job = crate::job::spawn_singleton_job("render", render_interval, self.cancel.clone(), move || {
            let service = render_self.clone();
            async move {
                if let Err(err) = service.print_weather().await {
                    warn!(%err, "rendering failed");
                }
            }
        });

        let refresh_interval = Duration::from_secs(self.config.intervals.weather_update_secs);
        let refresh_self = self.clone();
        let refresh_job = crate::job::spawn_singleton_job("weather-refresh", refresh_interval, self.cancel.clone(), move || {
            let service = refresh_self.clone();
            async move {
                if let Err(err) = service.fetch_weather().await {
                    warn!(%err, "weather refresh failed");
                }
            }
        });

        let suspend_self = self.clone();
        let suspend_cancel = self.cancel.clone();
        let suspend_task = tokio::spawn(async move {
            crate::suspend::run(suspend_cancel, move || {
                let service = suspend_self.clone();
                async move {
                    info!("resumed from suspend, refreshing weather");
                    if let Err(err) = service.fetch_weather().await {
                        warn!(%err, "post-resume weather refresh failed");
                    }
                }
            })
            .await;
        });

        let (mut rx, _unsub) = self.bus.subscribe(self.config.geolocation.key.clone(), LOCATION_BUFFER).await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                update = rx.recv() => {
                    let Some(update) = update else { break };
                    self.handle_location_update(update.lat, update.lon).await;
                }
            }
        }

        orchestrator.join().await;
        if let Some(handle) = render_job {
            handle.abort();
        }
        if let Some(handle) = refresh_job {
            handle.abort();
        }
        suspend_task.abort();
        Ok(())
    }

    async fn handle_location_update(&self, lat: f64, lon: f64) {
        let coordinate = crate::coordinate::Coordinate::new(lat, lon, 0.0);
        if !coordinate.valid() {
            warn!(lat, lon, "skipping invalid coordinate from bus");
            return;
        }

        match self.geocoder.reverse(coordinate).await {
            Ok(address) => {
                let mut location = self.location.write().await;
                location.lat = lat;
                location.lon = lon;
                if address.found {
                    location.address = address;
                }
                location.is_set = true;
            }
            Err(err) => warn!(%err, lat, lon, "reverse geocode failed"),
        }

        if let Err(err) = self.fetch_weather().await {
            warn!(%err, "weather refresh after location update failed");
        }
        if let Err(err) = self.print_weather().await {
            warn!(%err, "render after location update failed");
        }
    }

    pub async fn fetch_weather(&self) -> Result<()> {
        let (lat, lon, is_set) = {
            let location = self.location.read().await;
            (location.lat, location.lon, location.is_set)
        };
        if !is_set {
            return Ok(());
        }
        let coordinate = crate::coordinate::Coordinate::new(lat, lon, 0.0);
        let data = tokio::time::timeout(
            WEATHER_FETCH_TIMEOUT,
            self.weather_provider.fetch(coordinate, self.config.units),
        )
        .await
        .map_err(|_| anyhow::anyhow!("weather fetch timed out"))??;
        self.weather.write().await.weather = Some(data);
        Ok(())
    }

    pub async fn print_weather(&self) -> Result<()> {
        let location = self.location.read().await;
        if !location.is_set {
            return Ok(());
        }
        let weather = self.weather.read().await;
        let Some(weather) = weather.weather.as_ref() else {
            return Ok(());
        };

        let templates = Templates::new(
            self.config.templates.effective_text().to_owned(),
            self.config.templates.alt_text.clone(),
            self.config.templates.tooltip.clone(),
            self.config.templates.alt_tooltip.clone(),
        );
        let now: chrono::DateTime<chrono::Local> = chrono::Local::now();
        let day_hour = DayHour::new(now.date_naive(), now.hour_as_u8());
        let forecast_hours = self.config.weather.forecast_hours_clamped();
        let rendered = templates.render(&location.address, weather, day_hour, forecast_hours)?;

        let mut classes = vec!["waybar-weather".to_owned()];
        if weather.current.temperature <= self.config.weather.cold_threshold {
            classes.push("cold".to_owned());
        } else if weather.current.temperature >= self.config.weather.hot_threshold {
            classes.push("hot".to_owned());
        }

        let use_alt = self.display_alt_text.load(std::sync::atomic::Ordering::SeqCst);
        let line = WaybarLine {
            text: if use_alt { rendered.alt_text } else { rendered.text },
            tooltip: if use_alt { rendered.alt_tooltip } else { rendered.tooltip },
            class: classes,
        };
        println!("{}", serde_json::to_string(&line)?);
        Ok(())
    }
}

trait HourExt {
    fn hour_as_u8(&self) -> u8;
}

impl HourExt for chrono::DateTime<chrono::Local> {
    fn hour_as_u8(&self) -> u8 {
        use chrono::Timelike;
        self.hour() as u8
    }
}

#[derive(serde::Serialize)]
struct WaybarLine {
    text: String,
    tooltip: String,
    class: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waybar_line_serializes_as_expected_shape() {
        let line = WaybarLine {
            text: "21C".to_owned(),
            tooltip: "Clear sky".to_owned(),
            class: vec!["waybar-weather".to_owned(), "cold".to_owned()],
        };
        let json = serde_json::to_string(&line).unwrap();
        assert!(json.contains("\"text\":\"21C\""));
        assert!(json.contains("\"class\":[\"waybar-weather\",\"cold\"]"));
    }
}
