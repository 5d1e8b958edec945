//! Orientation Stream Adapter: device transports, debouncing and reconnection
//!
//! Only this module touches the wireless link. Everything downstream sees a
//! channel of [`StableFaceEvent`](crate::models::StableFaceEvent)s.

pub mod debounce;
pub mod line;
pub mod stream;
#[cfg(feature = "ble")]
pub mod ble;

pub use debounce::Debouncer;
pub use line::LineTransport;
pub use stream::{OrientationStream, ReconnectPolicy, StreamOptions};

use async_trait::async_trait;

use crate::error::ConnectionError;
use crate::models::Face;

/// Something that can open a connection to the cube by address
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceConnection>, ConnectionError>;
}

/// An open link delivering raw orientation readings
#[async_trait]
pub trait DeviceConnection: Send {
    /// Wait for the next reading
    ///
    /// `Ok(None)` means the source has ended for good; `Err` means the link
    /// was lost and a reconnect may bring it back. Must be cancel safe.
    async fn next_reading(&mut self) -> Result<Option<Face>, ConnectionError>;

    /// Release the link; best effort, called before the connection is dropped
    async fn close(&mut self) {}
}
