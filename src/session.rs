//! Instrument sessions and the live-address registry.
//!
//! [`SessionManager`] is the resource-manager analog: it owns the bus, the
//! default link parameters and the registry of addresses with a live session.
//! Opening an address that already has a live session is refused outright:
//! the transport guarantees bus exclusivity, this layer guarantees it never
//! asks for two sessions on one address in the first place.
//!
//! [`Session`] wraps one open link with the failure policy scripted
//! procedures rely on: `send` and `query` log a communication failure and
//! swallow it (queries return `None` as the sentinel), so one bad command
//! does not abort a whole characterization run. Bus-level open failures are
//! the exception; those are re-raised because nothing can proceed without a
//! session. Close is idempotent and also runs on drop, on every exit path.

use crate::config::BusSettings;
use crate::error::{AppResult, DaqError};
use crate::transport::{Bus, BusLink, LinkParams};
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Identification handshake query, uniform across instrument kinds.
pub const HANDSHAKE_QUERY: &str = "*IDN?";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens sessions and tracks which addresses currently have one.
pub struct SessionManager {
    bus: Arc<dyn Bus>,
    settings: BusSettings,
    live: Arc<Mutex<HashSet<String>>>,
}

impl SessionManager {
    pub fn new(bus: impl Bus + 'static, settings: BusSettings) -> Self {
        Self {
            bus: Arc::new(bus),
            settings,
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Enumerate every reachable address on the underlying bus.
    pub fn list_resources(&self) -> AppResult<Vec<String>> {
        self.bus.list_resources()
    }

    /// Whether `address` currently has a live session.
    pub fn is_live(&self, address: &str) -> bool {
        lock(&self.live).contains(address)
    }

    /// Open a session to `address`.
    ///
    /// Fails with [`DaqError::AddressBusy`] if a previous session for the
    /// address is still alive, and with [`DaqError::Connection`] on a
    /// bus-level open failure. Both are logged and re-raised.
    pub fn open(&self, address: &str) -> AppResult<Session> {
        if !lock(&self.live).insert(address.to_string()) {
            error!("-> Address {address} already has an open session");
            return Err(DaqError::AddressBusy(address.to_string()));
        }
        let params = LinkParams::from(&self.settings);
        match self.bus.open_resource(address, &params) {
            Ok(link) => {
                info!("-> Connection to instrument at {address} opened");
                Ok(Session {
                    address: address.to_string(),
                    link: Some(link),
                    default_timeout: self.settings.timeout,
                    handshake_timeout: self.settings.handshake_timeout,
                    live: Arc::clone(&self.live),
                })
            }
            Err(err) => {
                lock(&self.live).remove(address);
                error!("-> Connection to instrument was unsuccessful: {err}");
                Err(err)
            }
        }
    }
}

/// One open, exclusive connection to a single address.
pub struct Session {
    address: String,
    link: Option<Box<dyn BusLink>>,
    default_timeout: Duration,
    handshake_timeout: Duration,
    live: Arc<Mutex<HashSet<String>>>,
}

impl Session {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Send one command. A communication failure is logged and swallowed.
    pub fn send(&mut self, command: &str) {
        let Some(link) = self.link.as_mut() else {
            error!("[{}] send '{}' on a closed session", self.address, command);
            return;
        };
        if let Err(err) = link.write_line(command) {
            error!("-> Communication with instrument was unsuccessful: {err}");
        }
    }

    /// Query with the default timeout. `None` is the swallowed-failure
    /// sentinel; callers that care must check for it.
    pub fn query(&mut self, command: &str) -> Option<String> {
        self.query_with(command, self.default_timeout)
    }

    /// Query with an explicit timeout. No retry happens at this layer.
    pub fn query_with(&mut self, command: &str, timeout: Duration) -> Option<String> {
        let Some(link) = self.link.as_mut() else {
            error!("[{}] query '{}' on a closed session", self.address, command);
            return None;
        };
        match link.query_line(command, timeout) {
            Ok(response) => Some(response),
            Err(err) => {
                error!("-> Communication with instrument was unsuccessful: {err}");
                None
            }
        }
    }

    /// Identification handshake with the short discovery timeout.
    pub fn handshake(&mut self) -> Option<String> {
        self.query_with(HANDSHAKE_QUERY, self.handshake_timeout)
    }

    /// Close the session. Idempotent: closing an already-closed session logs
    /// a warning and returns normally.
    pub fn close(&mut self) {
        match self.link.take() {
            Some(mut link) => {
                if let Err(err) = link.close() {
                    warn!("-> Connection could not be closed: {err}");
                } else {
                    info!("-> Connection to instrument at {} closed", self.address);
                }
                lock(&self.live).remove(&self.address);
            }
            None => warn!("-> Connection could not be closed or is not open"),
        }
    }

    fn close_silent(&mut self) {
        if let Some(mut link) = self.link.take() {
            let _ = link.close();
            lock(&self.live).remove(&self.address);
            info!("-> Connection to instrument at {} closed", self.address);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_silent();
    }
}
