//! Location providers: the abstract contract, plus concrete implementations.
//!
//! Only the contract itself is core (spec §4.4); wire formats are
//! deliberately thin, since the hard part of this system is fusing results,
//! not parsing any one provider's payload.

mod api;
mod cityname;
mod file;
mod gpsd;
mod ip;
mod wifi;

pub use api::ApiProvider;
pub use cityname::CityNameFileProvider;
pub use file::GeolocationFileProvider;
pub use gpsd::GpsdProvider;
pub use ip::IpProvider;
pub use wifi::WifiProvider;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::result::LocationResult;

/// A source of location fixes.
///
/// Implementations internally throttle to their own cadence and stamp
/// results with their own TTL; the orchestrator only cares about keeping the
/// stream alive and forwarding whatever it yields.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// A stable identifier used in [`LocationResult::source`] and logs.
    fn name(&self) -> &str;

    /// Start a lazy, possibly infinite stream of results for `key`.
    ///
    /// Must close the stream when `cancel` fires. Returns `None` if the
    /// provider could not start this time (missing hardware, unreachable
    /// service, bad config) -- the orchestrator treats this the same as a
    /// stream that immediately ended, and retries after backoff.
    async fn lookup_stream(
        &self,
        cancel: CancellationToken,
        key: String,
    ) -> Option<BoxStream<'static, LocationResult>>;
}
