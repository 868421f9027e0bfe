//! Serial port bus implementation.
//!
//! Wraps the `serialport` crate behind the [`Bus`] interface. Addresses are
//! the platform port names (`/dev/ttyUSB0`, `COM4`). Reads are terminated by
//! the configured read terminator and bounded by an explicit deadline, so a
//! silent instrument surfaces as a communication error instead of a hang.

use super::{Bus, BusLink, LinkParams};
use crate::error::{AppResult, DaqError};
use log::debug;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Poll interval for the terminated-read loop.
const READ_CHUNK_TIMEOUT: Duration = Duration::from_millis(10);

/// A [`Bus`] over local serial ports.
#[derive(Debug, Default)]
pub struct SerialBus;

impl SerialBus {
    pub fn new() -> Self {
        Self
    }
}

impl Bus for SerialBus {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        let ports = serialport::available_ports().map_err(|err| DaqError::Connection {
            address: "<enumeration>".to_string(),
            reason: err.to_string(),
        })?;
        Ok(ports.into_iter().map(|info| info.port_name).collect())
    }

    fn open_resource(&self, address: &str, params: &LinkParams) -> AppResult<Box<dyn BusLink>> {
        let port = serialport::new(address, params.baud_rate)
            .timeout(READ_CHUNK_TIMEOUT)
            .open()
            .map_err(|err| DaqError::Connection {
                address: address.to_string(),
                reason: err.to_string(),
            })?;
        debug!(
            "Serial port '{}' opened at {} baud",
            address, params.baud_rate
        );
        Ok(Box::new(SerialLink {
            address: address.to_string(),
            port: Some(port),
            params: params.clone(),
        }))
    }
}

struct SerialLink {
    address: String,
    port: Option<Box<dyn SerialPort>>,
    params: LinkParams,
}

impl SerialLink {
    fn comm_error(&self, command: &str, reason: String) -> DaqError {
        DaqError::Communication {
            address: self.address.clone(),
            command: command.to_string(),
            reason,
        }
    }

    fn port(&mut self, command: &str) -> AppResult<&mut Box<dyn SerialPort>> {
        let address = self.address.clone();
        self.port.as_mut().ok_or_else(|| DaqError::Communication {
            address,
            command: command.to_string(),
            reason: "port is closed".to_string(),
        })
    }
}

impl BusLink for SerialLink {
    fn write_line(&mut self, command: &str) -> AppResult<()> {
        let line = format!("{}{}", command, self.params.write_terminator);
        let port = self.port(command)?;
        port.write_all(line.as_bytes())
            .and_then(|()| port.flush())
            .map_err(|err| DaqError::Communication {
                address: self.address.clone(),
                command: command.to_string(),
                reason: err.to_string(),
            })?;
        debug!("[{}] sent: {}", self.address, command);
        Ok(())
    }

    fn query_line(&mut self, command: &str, timeout: Duration) -> AppResult<String> {
        let terminator = self.params.read_terminator.clone();
        {
            let port = self.port(command)?;
            let _ = port.clear(serialport::ClearBuffer::Input);
        }
        self.write_line(command)?;

        let deadline = Instant::now() + timeout;
        let mut response: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            if Instant::now() > deadline {
                return Err(self.comm_error(command, format!("timed out after {timeout:?}")));
            }
            let read = self.port(command)?.read(&mut chunk);
            match read {
                Ok(0) => continue,
                Ok(n) => {
                    response.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&response);
                    if text.ends_with(terminator.as_str()) {
                        let reply = text
                            .trim_end_matches(terminator.as_str())
                            .trim_end_matches('\r')
                            .to_string();
                        debug!("[{}] query '{}' -> '{}'", self.address, command, reply);
                        return Ok(reply);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(err) => return Err(self.comm_error(command, err.to_string())),
            }
        }
    }

    fn close(&mut self) -> AppResult<()> {
        if self.port.take().is_some() {
            debug!("Serial port '{}' closed", self.address);
        }
        Ok(())
    }
}
