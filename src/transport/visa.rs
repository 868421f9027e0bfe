//! VISA bus implementation.
//!
//! Wraps the `visa-rs` crate behind the [`Bus`] interface for GPIB, USB-TMC
//! and LXI instruments. Addresses are VISA resource strings
//! (`ASRL4::INSTR`, `USB0::0x05E6::0x6500::04612268::INSTR`, ...).
//!
//! The VISA session timeout is set at open time from the link parameters;
//! per-query deadlines are enforced by the terminated-read loop on top.

use super::{Bus, BusLink, LinkParams};
use crate::error::{AppResult, DaqError};
use log::debug;
use std::ffi::CString;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use visa_rs::prelude::*;

/// A [`Bus`] over a VISA resource manager.
pub struct VisaBus {
    rm: DefaultRM,
}

impl VisaBus {
    pub fn new() -> AppResult<Self> {
        let rm = DefaultRM::new().map_err(|err| DaqError::Connection {
            address: "<resource manager>".to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self { rm })
    }

    fn connection_error(address: &str, err: impl std::fmt::Display) -> DaqError {
        DaqError::Connection {
            address: address.to_string(),
            reason: err.to_string(),
        }
    }
}

impl Bus for VisaBus {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        let expr = CString::new("?*::INSTR")
            .map_err(|err| Self::connection_error("<enumeration>", err))?;
        let list = self
            .rm
            .find_res_list(&expr.into())
            .map_err(|err| Self::connection_error("<enumeration>", err))?;
        let mut addresses = Vec::new();
        for res in list {
            let res = res.map_err(|err| Self::connection_error("<enumeration>", err))?;
            addresses.push(res.to_string_lossy().to_string());
        }
        Ok(addresses)
    }

    fn open_resource(&self, address: &str, params: &LinkParams) -> AppResult<Box<dyn BusLink>> {
        let c_string =
            CString::new(address).map_err(|err| Self::connection_error(address, err))?;
        let visa_string = visa_rs::VisaString::from(c_string);
        let session = self
            .rm
            .open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
            .map_err(|err| Self::connection_error(address, err))?;
        debug!("VISA resource '{}' opened", address);
        Ok(Box::new(VisaLink {
            address: address.to_string(),
            session: Some(session),
            params: params.clone(),
        }))
    }
}

struct VisaLink {
    address: String,
    session: Option<Instrument>,
    params: LinkParams,
}

impl VisaLink {
    fn comm_error(&self, command: &str, reason: String) -> DaqError {
        DaqError::Communication {
            address: self.address.clone(),
            command: command.to_string(),
            reason,
        }
    }
}

impl BusLink for VisaLink {
    fn write_line(&mut self, command: &str) -> AppResult<()> {
        let line = format!("{}{}", command, self.params.write_terminator);
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DaqError::Communication {
                address: self.address.clone(),
                command: command.to_string(),
                reason: "session is closed".to_string(),
            })?;
        session
            .write_all(line.as_bytes())
            .map_err(|err| DaqError::Communication {
                address: self.address.clone(),
                command: command.to_string(),
                reason: err.to_string(),
            })?;
        debug!("[{}] sent: {}", self.address, command);
        Ok(())
    }

    fn query_line(&mut self, command: &str, timeout: Duration) -> AppResult<String> {
        self.write_line(command)?;
        let terminator = self.params.read_terminator.clone();
        let deadline = Instant::now() + timeout;
        let mut response: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            if Instant::now() > deadline {
                return Err(self.comm_error(command, format!("timed out after {timeout:?}")));
            }
            let session = self
                .session
                .as_mut()
                .ok_or_else(|| DaqError::Communication {
                    address: self.address.clone(),
                    command: command.to_string(),
                    reason: "session is closed".to_string(),
                })?;
            match session.read(&mut chunk) {
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
                Err(err) => return Err(self.comm_error(command, err.to_string())),
            }
        }
    }

    fn close(&mut self) -> AppResult<()> {
        if self.session.take().is_some() {
            debug!("VISA resource '{}' closed", self.address);
        }
        Ok(())
    }
}
