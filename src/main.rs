#![recursion_limit = "128"]

pub use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};
use tracing_subscriber::{
    fmt::{format::FmtSpan, Subscriber},
    prelude::*,
    EnvFilter,
};

mod bus;
mod config;
mod coordinate;
mod errors;
mod geocode;
mod job;
mod orchestrator;
mod provider;
mod result;
mod service;
mod suspend;
mod template;
mod weather;

use crate::config::Config;
use crate::geocode::cache::CachedGeocoder;
use crate::geocode::Geocoder;
use crate::provider::{
    ApiProvider, CityNameFileProvider, GeolocationFileProvider, GpsdProvider, IpProvider, Provider,
    WifiProvider,
};
use crate::service::Service;
use crate::weather::open_meteo::OpenMeteo;
use crate::weather::WeatherProvider;

#[cfg(all(feature = "jemallocator", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Status-bar weather agent that fuses multiple location providers into a
/// single trustworthy position, then reports current conditions for
/// consumption by a waybar custom module.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opt {
    /// Path to a TOML/YAML/JSON config file. If omitted, the standard search
    /// path under `$HOME/.config/waybar-weather/` is used.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
}

fn build_geocoder(config: &Config) -> Result<Arc<dyn Geocoder>> {
    let mut geocoder: Box<dyn Geocoder> = match config.geocoder.provider.as_str() {
        "nominatim" => Box::new(geocode::nominatim::Nominatim::new()?),
        "opencage" => {
            let apikey = config.geocoder.apikey.clone().unwrap_or_default();
            Box::new(geocode::opencage::OpenCage::new(apikey)?)
        }
        other => anyhow::bail!("unknown geocoder backend {:?}", other),
    };
    if config.geocoder.cache {
        geocoder = Box::new(CachedGeocoder::new(geocoder));
    }
    Ok(Arc::from(geocoder))
}

fn build_weather_provider(config: &Config) -> Result<Arc<dyn WeatherProvider>> {
    match config.weather.provider.as_str() {
        "open-meteo" => Ok(Arc::new(OpenMeteo::new())),
        other => anyhow::bail!("unknown weather provider {:?}", other),
    }
}

fn build_providers(config: &Config, geocoder: Arc<dyn Geocoder>) -> Vec<Arc<dyn Provider>> {
    let geolocation = &config.geolocation;
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    if !geolocation.disable_geoip {
        providers.push(Arc::new(IpProvider::new()));
    }
    if !geolocation.disable_geoapi {
        if let Some(url) = &geolocation.geoapi_url {
            providers.push(Arc::new(ApiProvider::new(
                url.clone(),
                std::time::Duration::from_secs(300),
                std::time::Duration::from_secs(600),
                crate::coordinate::AccuracyClass::City.meters(),
            )));
        } else {
            warn!("geolocation.disable_geoapi is false but geolocation.geoapi_url is unset; skipping");
        }
    }
    if !geolocation.disable_ichnaea {
        providers.push(Arc::new(WifiProvider::new()));
    }
    if !geolocation.disable_gpsd {
        providers.push(Arc::new(GpsdProvider::new(
            geolocation.gpsd_host.clone(),
            geolocation.gpsd_port,
        )));
    }
    if !geolocation.disable_geolocation_file {
        providers.push(Arc::new(GeolocationFileProvider::new(geolocation.geolocation_file.clone())));
    }
    if !geolocation.disable_cityname_file {
        providers.push(Arc::new(CityNameFileProvider::new(
            geolocation.cityname_file.clone(),
            geocoder.clone(),
        )));
    }

    providers
}

async fn run(config: Config) -> Result<()> {
    debug!(?config, "loaded configuration");

    let geocoder = build_geocoder(&config)?;
    let weather_provider = build_weather_provider(&config)?;
    let providers = build_providers(&config, geocoder.clone());

    let cancel = CancellationToken::new();
    let service = Arc::new(Service::new(config, geocoder, weather_provider, cancel.clone()));

    let signal_service = service.clone();
    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        handle_signals(signal_service, signal_cancel).await;
    });

    let run_result = service.run(providers).await;
    cancel.cancel();
    let _ = signal_task.await;
    run_result
}

async fn handle_signals(service: Arc<Service>, cancel: CancellationToken) {
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "could not install SIGINT handler");
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "could not install SIGTERM handler");
            return;
        }
    };
    let mut sigabrt = match signal(SignalKind::from_raw(libc_sigabrt())) {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "could not install SIGABRT handler");
            return;
        }
    };
    let mut sigusr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "could not install SIGUSR1 handler");
            return;
        }
    };
    let mut sigusr2 = match signal(SignalKind::user_defined2()) {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "could not install SIGUSR2 handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                cancel.cancel();
                break;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                cancel.cancel();
                break;
            }
            _ = sigabrt.recv() => {
                info!("received SIGABRT, shutting down");
                cancel.cancel();
                break;
            }
            _ = sigusr1.recv() => {
                service.toggle_display_alt_text();
                if let Err(err) = service.print_weather().await {
                    warn!(%err, "re-render after SIGUSR1 failed");
                }
            }
            _ = sigusr2.recv() => {
                service.log_current_location().await;
            }
        }
    }
}

/// `SIGABRT`'s raw signal number on Linux. `tokio::signal::unix::SignalKind`
/// has no named constructor for it.
fn libc_sigabrt() -> std::os::raw::c_int {
    6
}

#[tokio::main]
async fn main() -> ExitCode {
    let opt = Opt::parse();
    let config = match config::load(opt.config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: could not load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    // `RUST_LOG` always wins if set; otherwise fall back to the config file's
    // `log_level`.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level_or_default()));
    Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_env_filter(filter)
        .finish()
        .init();
    let _span = info_span!("waybar-weather").entered();
    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            errors::display_causes_and_backtrace(&err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_weather_provider_rejects_unknown_backend() {
        let mut config = Config::default();
        config.weather.provider = "not-a-real-provider".to_owned();
        assert!(build_weather_provider(&config).is_err());
    }

    #[test]
    fn build_providers_defaults_to_geoip_only() {
        let config = Config::default();
        let geocoder: Arc<dyn Geocoder> = Arc::new(geocode::nominatim::Nominatim::new().unwrap());
        let providers = build_providers(&config, geocoder);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "ip");
    }
}
