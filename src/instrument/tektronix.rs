//! Tektronix bench oscilloscope.
//!
//! Thin contract implementation: the scope participates in discovery and
//! allocation like any other kind, but only the vertical-settings queries and
//! acquisition control needed by the characterization scripts are wrapped.
//! Waveform bulk transfer is out of scope for this layer.

use crate::instrument::{Instrument, NoMode};
use crate::session::Session;

/// Vertical configuration of one analog channel.
#[derive(Debug, Clone, PartialEq)]
pub struct VerticalSettings {
    pub offset: f64,
    pub position: f64,
    pub scale: f64,
    pub units: String,
}

pub struct TekScope {
    session: Session,
}

impl Instrument for TekScope {
    type Mode = NoMode;
    const KIND: &'static str = "TekScope";

    fn default_addresses() -> &'static [&'static str] {
        &[
            "USB0::0x0699::0x0522::C012581::INSTR",
            "USB0::0x0699::0x0522::C012608::INSTR",
        ]
    }

    fn attach(session: Session) -> Self {
        Self { session }
    }

    fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    fn release(&mut self) {
        self.session.send("UNLock ALL");
    }

    fn stop(&mut self) {
        self.session.send("ACQuire:STATE STOP");
    }
}

impl TekScope {
    /// Disable response headers so query replies parse as bare values.
    pub fn header_off(&mut self) {
        self.session.send("header off");
    }

    pub fn vertical_settings(&mut self, channel: u8) -> Option<VerticalSettings> {
        let offset = self.query_f64(&format!("CH{channel}:OFFSet?"))?;
        let position = self.query_f64(&format!("CH{channel}:POSition?"))?;
        let scale = self.query_f64(&format!("CH{channel}:SCAle?"))?;
        let units = self
            .session
            .query(&format!("CH{channel}:PROBE:UNITS?"))?
            .trim()
            .trim_matches('"')
            .to_string();
        Some(VerticalSettings {
            offset,
            position,
            scale,
            units,
        })
    }

    /// Arm a single-sequence acquisition.
    pub fn single_sequence(&mut self) {
        self.session.send("ACQuire:STOPAfter SEQuence");
        self.session.send("ACQuire:STATE RUN");
    }

    /// Whether an acquisition is currently running.
    pub fn acquisition_running(&mut self) -> Option<bool> {
        self.query_f64("ACQuire:STATE?").map(|state| state != 0.0)
    }

    fn query_f64(&mut self, command: &str) -> Option<f64> {
        self.session
            .query(command)
            .and_then(|raw| raw.trim().parse().ok())
    }
}
