//! Bus transport abstraction.
//!
//! The physical transport (serial, VISA, a scripted mock) is consumed through
//! two small traits: [`Bus`] enumerates reachable addresses and opens links,
//! [`BusLink`] carries line-oriented traffic to one instrument. The rest of
//! the crate never touches a concrete transport type; [`Session`] wraps a
//! `BusLink` with the logging and failure-swallowing policy scripts rely on.
//!
//! [`Session`]: crate::session::Session

pub mod mock;
#[cfg(feature = "transport_serial")]
pub mod serial;
#[cfg(feature = "transport_visa")]
pub mod visa;

pub use mock::MockBus;
#[cfg(feature = "transport_serial")]
pub use serial::SerialBus;
#[cfg(feature = "transport_visa")]
pub use visa::VisaBus;

use crate::config::BusSettings;
use crate::error::AppResult;
use std::time::Duration;

/// Per-link parameters, resolved from [`BusSettings`] at open time.
#[derive(Debug, Clone)]
pub struct LinkParams {
    pub baud_rate: u32,
    pub timeout: Duration,
    pub read_terminator: String,
    pub write_terminator: String,
}

impl From<&BusSettings> for LinkParams {
    fn from(settings: &BusSettings) -> Self {
        Self {
            baud_rate: settings.baud_rate,
            timeout: settings.timeout,
            read_terminator: settings.read_terminator.clone(),
            write_terminator: settings.write_terminator.clone(),
        }
    }
}

/// A physical instrument bus.
pub trait Bus {
    /// Enumerate every reachable address on the bus.
    fn list_resources(&self) -> AppResult<Vec<String>>;

    /// Open a link to one address. Fails with [`DaqError::Connection`] on a
    /// bus-level failure.
    ///
    /// [`DaqError::Connection`]: crate::error::DaqError::Connection
    fn open_resource(&self, address: &str, params: &LinkParams) -> AppResult<Box<dyn BusLink>>;
}

impl Bus for Box<dyn Bus> {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        (**self).list_resources()
    }

    fn open_resource(&self, address: &str, params: &LinkParams) -> AppResult<Box<dyn BusLink>> {
        (**self).open_resource(address, params)
    }
}

/// One open line-oriented connection to one address.
///
/// Commands are passed without terminators; the link appends the configured
/// write terminator and strips the read terminator from responses.
pub trait BusLink: Send {
    /// Write one terminated command line.
    fn write_line(&mut self, command: &str) -> AppResult<()>;

    /// Write one command line and read one terminated response line, bounded
    /// by `timeout`. A timeout is an error at this layer.
    fn query_line(&mut self, command: &str, timeout: Duration) -> AppResult<String>;

    /// Close the link. Implementations must tolerate being called twice.
    fn close(&mut self) -> AppResult<()>;
}
