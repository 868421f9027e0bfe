//! Keithley DMM6500 6½-digit multimeter.
//!
//! SCPI protocol; the measurement function is the instrument mode
//! (`:SENS:FUNC`). With a scanner card fitted, channels are sub-addressed on
//! the same session via `ROUT:CLOS`; routing a channel remembers the
//! previous function as the fallback mode so a later acquisition can restore
//! it.

use crate::error::AppResult;
use crate::instrument::{Instrument, ModeValue};
use crate::session::Session;

/// Measurement function, plus the reserved leave-as-is sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DmmMode {
    #[default]
    Default,
    DcVolts,
    AcVolts,
    DcAmps,
    AcAmps,
    Res2Wire,
    Res4Wire,
}

impl ModeValue for DmmMode {
    fn command(self) -> Option<&'static str> {
        match self {
            DmmMode::Default => None,
            DmmMode::DcVolts => Some("VOLT:DC"),
            DmmMode::AcVolts => Some("VOLT:AC"),
            DmmMode::DcAmps => Some("CURR:DC"),
            DmmMode::AcAmps => Some("CURR:AC"),
            DmmMode::Res2Wire => Some("RES"),
            DmmMode::Res4Wire => Some("FRES"),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "VOLT:DC" => Some(DmmMode::DcVolts),
            "VOLT:AC" => Some(DmmMode::AcVolts),
            "CURR:DC" => Some(DmmMode::DcAmps),
            "CURR:AC" => Some(DmmMode::AcAmps),
            "RES" => Some(DmmMode::Res2Wire),
            "FRES" => Some(DmmMode::Res4Wire),
            _ => None,
        }
    }
}

/// Scanner-card channel reference. Channel 1 carries the temperature
/// reference junction on the standard card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Ch1TempRef,
    Ch2,
    Ch3,
    Ch4,
    Ch5,
    Ch6,
    Ch7,
    Ch8,
    Ch9,
    Ch10,
}

impl Channel {
    fn tag(self) -> &'static str {
        match self {
            Channel::Ch1TempRef => "1",
            Channel::Ch2 => "2",
            Channel::Ch3 => "3",
            Channel::Ch4 => "4",
            Channel::Ch5 => "5",
            Channel::Ch6 => "6",
            Channel::Ch7 => "7",
            Channel::Ch8 => "8",
            Channel::Ch9 => "9",
            Channel::Ch10 => "10",
        }
    }
}

pub struct Dmm6500 {
    session: Session,
    fallback_mode: Option<DmmMode>,
    channel_reference: Option<Channel>,
}

impl Instrument for Dmm6500 {
    type Mode = DmmMode;
    const KIND: &'static str = "DMM6500";
    const MODE_CTRL_CMD: &'static str = ":SENS:FUNC";

    fn default_addresses() -> &'static [&'static str] {
        &[
            "USB0::0x05E6::0x6500::04612268::INSTR",
            "USB0::0x05E6::0x6500::04612414::INSTR",
            "USB0::0x05E6::0x6500::04612430::INSTR",
        ]
    }

    fn attach(session: Session) -> Self {
        Self {
            session,
            fallback_mode: None,
            channel_reference: None,
        }
    }

    fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    fn release(&mut self) {
        self.session.send("ROUT:OPEN (@ALLSLOTS)");
        self.session.send("TRIG:CONT REST");
    }

    fn stop(&mut self) {
        self.reset();
    }
}

impl Dmm6500 {
    pub fn fallback_mode(&self) -> Option<DmmMode> {
        self.fallback_mode
    }

    pub fn channel_reference(&self) -> Option<Channel> {
        self.channel_reference
    }

    /// Route a scanner channel and switch it to `mode`, remembering the
    /// current function as the fallback. Asserted by read-back like any
    /// other mode change.
    pub fn route_channel(&mut self, channel: Channel, mode: DmmMode) -> AppResult<()> {
        self.fallback_mode = self.mode();
        if let Some(value) = mode.command() {
            let tag = channel.tag();
            self.session
                .send(&format!("{} \"{}\", (@{})", Self::MODE_CTRL_CMD, value, tag));
        }
        self.session.send("ROUT:OPEN (@ALLSLOTS)");
        self.session
            .send(&format!("ROUT:CLOS (@{})", channel.tag()));
        self.assert_mode(mode)?;
        self.channel_reference = Some(channel);
        Ok(())
    }

    pub fn set_voltage_range(&mut self, range: f64) {
        self.session.send(&format!(":SENS:VOLT:RANG {range}"));
    }

    pub fn set_current_range(&mut self, range: f64) {
        self.session.send(&format!(":SENS:CURR:RANG {range}"));
    }

    /// Take one reading. When a fallback mode is pending (a channel was
    /// routed since the last acquisition), the routing is released and the
    /// fallback function restored first. `flush` clears the reading buffer
    /// afterwards.
    pub fn acquire_measurement(&mut self, flush: bool) -> AppResult<Option<f64>> {
        if let Some(fallback) = self.fallback_mode.take() {
            self.release();
            self.apply_mode(fallback)?;
        }
        let reading = self
            .session
            .query(":MEAS?")
            .and_then(|raw| raw.trim().parse::<f64>().ok());
        if flush {
            self.session.send(":TRAC:CLE");
        }
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusSettings;
    use crate::error::DaqError;
    use crate::session::SessionManager;
    use crate::transport::mock::{MockBus, MockDevice};

    fn meter_device() -> MockDevice {
        MockDevice::new("KEITHLEY INSTRUMENTS,MODEL DMM6500")
            .with_mode_tracking(":SENS:FUNC", "VOLT:DC")
            .with_response(":MEAS?", "1.2345E+01")
    }

    fn open_meter(bus: &MockBus) -> Dmm6500 {
        let manager = SessionManager::new(bus.clone(), BusSettings::default());
        Dmm6500::attach(manager.open("USB0::0x05E6::0x6500::04612268::INSTR").unwrap())
    }

    #[test]
    fn test_mode_parse_round_trip() {
        for mode in [
            DmmMode::DcVolts,
            DmmMode::AcVolts,
            DmmMode::DcAmps,
            DmmMode::AcAmps,
            DmmMode::Res2Wire,
            DmmMode::Res4Wire,
        ] {
            let value = mode.command().unwrap();
            assert_eq!(DmmMode::parse(value), Some(mode));
        }
        assert_eq!(DmmMode::Default.command(), None);
    }

    #[test]
    fn test_apply_mode_with_readback() {
        let bus = MockBus::new()
            .with_device("USB0::0x05E6::0x6500::04612268::INSTR", meter_device());
        let mut meter = open_meter(&bus);
        meter.apply_mode(DmmMode::DcAmps).unwrap();
        assert_eq!(meter.mode(), Some(DmmMode::DcAmps));
    }

    #[test]
    fn test_rejected_mode_is_fatal() {
        let bus = MockBus::new().with_device(
            "USB0::0x05E6::0x6500::04612268::INSTR",
            meter_device().rejecting_mode("FRES"),
        );
        let mut meter = open_meter(&bus);
        let err = meter.apply_mode(DmmMode::Res4Wire).unwrap_err();
        assert!(matches!(err, DaqError::ModeAssertion { .. }));
    }

    #[test]
    fn test_route_channel_records_fallback() {
        let bus = MockBus::new()
            .with_device("USB0::0x05E6::0x6500::04612268::INSTR", meter_device());
        let mut meter = open_meter(&bus);
        meter.route_channel(Channel::Ch3, DmmMode::Res4Wire).unwrap();
        assert_eq!(meter.fallback_mode(), Some(DmmMode::DcVolts));
        assert_eq!(meter.channel_reference(), Some(Channel::Ch3));

        let sent = bus.commands_sent("USB0::0x05E6::0x6500::04612268::INSTR");
        assert!(sent.contains(&":SENS:FUNC \"FRES\", (@3)".to_string()));
        assert!(sent.contains(&"ROUT:CLOS (@3)".to_string()));
    }

    #[test]
    fn test_acquire_restores_fallback_mode() {
        let bus = MockBus::new()
            .with_device("USB0::0x05E6::0x6500::04612268::INSTR", meter_device());
        let mut meter = open_meter(&bus);
        meter.route_channel(Channel::Ch2, DmmMode::DcAmps).unwrap();
        let reading = meter.acquire_measurement(true).unwrap();
        assert_eq!(reading, Some(12.345));
        // fallback restored and consumed
        assert_eq!(meter.mode(), Some(DmmMode::DcVolts));
        assert_eq!(meter.fallback_mode(), None);
    }
}
