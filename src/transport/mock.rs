//! Scripted mock bus for tests and dry runs.
//!
//! Each address hosts a [`MockDevice`] with a canned identity, canned query
//! responses and optional failure behavior (dead handshake, refused open,
//! failing writes). Devices record every command they receive so tests can
//! assert on the traffic after the session is gone.
//!
//! Mode tracking mirrors a real function-switchable instrument: a write of
//! `CMD "VALUE"` updates the value reported by `CMD?`, unless the value was
//! registered as rejected, in which case the write is silently ignored;
//! exactly the condition the mode read-back assertion exists to catch.

use super::{Bus, BusLink, LinkParams};
use crate::error::{AppResult, DaqError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One simulated instrument behind a bus address.
#[derive(Debug, Default)]
pub struct MockDevice {
    identity: Option<String>,
    responses: HashMap<String, String>,
    mode_command: Option<String>,
    mode: Option<String>,
    rejected_modes: HashSet<String>,
    fail_writes: bool,
    refuse_open: bool,
    log: Vec<String>,
}

impl MockDevice {
    /// A device that answers the identification handshake with `identity`.
    pub fn new(identity: &str) -> Self {
        Self {
            identity: Some(identity.to_string()),
            ..Self::default()
        }
    }

    /// A device that never answers: every query times out.
    pub fn dead() -> Self {
        Self::default()
    }

    /// Canned response for one query string.
    pub fn with_response(mut self, query: &str, response: &str) -> Self {
        self.responses.insert(query.to_string(), response.to_string());
        self
    }

    /// Track a mode-control command: writes of `command "VALUE"` update the
    /// response to `command?`.
    pub fn with_mode_tracking(mut self, command: &str, initial: &str) -> Self {
        self.mode_command = Some(command.to_string());
        self.mode = Some(initial.to_string());
        self
    }

    /// Writes requesting this mode value are ignored, as a real instrument
    /// ignores an unsupported function selection.
    pub fn rejecting_mode(mut self, value: &str) -> Self {
        self.rejected_modes.insert(value.to_string());
        self
    }

    /// Every write (and therefore every query) fails.
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Opening a link to this address fails at the bus level.
    pub fn refusing_open(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    fn take_write(&mut self, command: &str) -> bool {
        let Some(mode_cmd) = &self.mode_command else {
            return false;
        };
        let Some(rest) = command.strip_prefix(mode_cmd.as_str()) else {
            return false;
        };
        let Some(value) = rest.strip_prefix(' ') else {
            return false;
        };
        // accept both `CMD "VALUE"` and the routed form `CMD "VALUE", (@n)`
        let value = value.trim();
        let value = match value.strip_prefix('"') {
            Some(quoted) => quoted.split('"').next().unwrap_or(""),
            None => value.split([',', ' ']).next().unwrap_or(value),
        };
        if !self.rejected_modes.contains(value) {
            self.mode = Some(value.to_string());
        }
        true
    }
}

type SharedDevice = Arc<Mutex<MockDevice>>;

/// A bus populated with [`MockDevice`]s. Cloning shares the device table, so
/// a test can keep a handle for assertions while the session layer owns one.
#[derive(Clone, Default)]
pub struct MockBus {
    devices: Arc<Mutex<BTreeMap<String, SharedDevice>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, address: &str, device: MockDevice) -> Self {
        lock(&self.devices).insert(address.to_string(), Arc::new(Mutex::new(device)));
        self
    }

    /// Commands received by the device at `address`, in order.
    pub fn commands_sent(&self, address: &str) -> Vec<String> {
        lock(&self.devices)
            .get(address)
            .map(|device| lock(device).log.clone())
            .unwrap_or_default()
    }

    /// The mode value the device at `address` currently reports.
    pub fn reported_mode(&self, address: &str) -> Option<String> {
        lock(&self.devices)
            .get(address)
            .and_then(|device| lock(device).mode.clone())
    }
}

impl Bus for MockBus {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        Ok(lock(&self.devices).keys().cloned().collect())
    }

    fn open_resource(&self, address: &str, _params: &LinkParams) -> AppResult<Box<dyn BusLink>> {
        let device = lock(&self.devices)
            .get(address)
            .cloned()
            .ok_or_else(|| DaqError::Connection {
                address: address.to_string(),
                reason: "no such resource".to_string(),
            })?;
        if lock(&device).refuse_open {
            return Err(DaqError::Connection {
                address: address.to_string(),
                reason: "resource refused to open".to_string(),
            });
        }
        Ok(Box::new(MockLink {
            address: address.to_string(),
            device,
        }))
    }
}

struct MockLink {
    address: String,
    device: SharedDevice,
}

impl MockLink {
    fn comm_error(&self, command: &str, reason: &str) -> DaqError {
        DaqError::Communication {
            address: self.address.clone(),
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl BusLink for MockLink {
    fn write_line(&mut self, command: &str) -> AppResult<()> {
        let mut device = lock(&self.device);
        device.log.push(command.to_string());
        if device.fail_writes {
            return Err(self.comm_error(command, "write failed"));
        }
        device.take_write(command);
        Ok(())
    }

    fn query_line(&mut self, command: &str, _timeout: Duration) -> AppResult<String> {
        let mut device = lock(&self.device);
        device.log.push(command.to_string());
        if device.fail_writes {
            return Err(self.comm_error(command, "write failed"));
        }
        if command == "*IDN?" {
            return device
                .identity
                .clone()
                .ok_or_else(|| self.comm_error(command, "timed out"));
        }
        if let Some(mode_cmd) = device.mode_command.clone() {
            if command == format!("{mode_cmd}?") {
                return device
                    .mode
                    .clone()
                    .ok_or_else(|| self.comm_error(command, "timed out"));
            }
        }
        device
            .responses
            .get(command)
            .cloned()
            .ok_or_else(|| self.comm_error(command, "timed out"))
    }

    fn close(&mut self) -> AppResult<()> {
        Ok(())
    }
}
