//! Aim-TTi CPX400DP dual-channel bench power supply.
//!
//! Text protocol over serial: `V<n> <value>` / `V<n>?` for voltage,
//! `I<n>` for current limit, `OP<n> <0|1>` for output switching, `LSR<n>?`
//! for the limit-status register. Output switching waits a blanking time
//! before trusting the instrument state, per the settling behavior of the
//! analog output stage.

use crate::instrument::{Instrument, NoMode};
use crate::session::Session;
use log::{info, warn};
use std::thread;
use std::time::Duration;

/// Limit-status register bits (`LSR<n>?`).
const LSR_BIT_MESSAGES: &[(u8, &str)] = &[
    (0, "Output reached set voltage limit"),
    (1, "Output reached set current limit"),
    (2, "Overvoltage protection engaged"),
    (3, "Overcurrent protection engaged"),
    (4, "Output power limitation engaged"),
    (6, "Hard trip occured - perform manual reset"),
];

pub struct Cpx400dp {
    session: Session,
    output_blanking: Duration,
}

impl Instrument for Cpx400dp {
    type Mode = NoMode;
    const KIND: &'static str = "CPX400DP";

    fn default_addresses() -> &'static [&'static str] {
        &["ASRL4::INSTR", "ASRL11::INSTR"]
    }

    fn attach(session: Session) -> Self {
        Self {
            session,
            output_blanking: Duration::from_secs(1),
        }
    }

    fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    fn release(&mut self) {
        self.session.send("LOCAL");
    }

    fn stop(&mut self) {
        // shutdown paces the outputs with the same settling wait as normal
        // switching
        self.output_off(1, self.output_blanking);
        self.output_off(2, self.output_blanking);
    }
}

impl Cpx400dp {
    pub fn output_blanking(&self) -> Duration {
        self.output_blanking
    }

    /// Settling wait applied around output switching, including the two
    /// output-off commands of the stop sequence.
    pub fn set_output_blanking(&mut self, blanking: Duration) {
        self.output_blanking = blanking;
    }

    pub fn voltage(&mut self, channel: u8) -> Option<f64> {
        parse_reading(self.session.query(&format!("V{channel}?")))
    }

    pub fn set_voltage(&mut self, channel: u8, volts: f64) {
        self.session.send(&format!("V{channel} {volts}"));
    }

    pub fn current(&mut self, channel: u8) -> Option<f64> {
        parse_reading(self.session.query(&format!("I{channel}?")))
    }

    pub fn set_current(&mut self, channel: u8, amps: f64) {
        self.session.send(&format!("I{channel} {amps}"));
    }

    /// Switch an output on after the blanking time. The limit-status
    /// register is read first to clear stale latched bits.
    pub fn output_on(&mut self, channel: u8, blanking_time: Duration) {
        thread::sleep(blanking_time);
        let _ = self.limit_status_raw(channel);
        self.session.send(&format!("OP{channel} 1"));
        info!("-> Switching OUT{channel} on");
    }

    pub fn output_off(&mut self, channel: u8, blanking_time: Duration) {
        thread::sleep(blanking_time);
        self.session.send(&format!("OP{channel} 0"));
        info!("-> Switching OUT{channel} off");
    }

    pub fn output_status(&mut self, channel: u8) -> Option<String> {
        self.session.query(&format!("OP{channel}?"))
    }

    /// Claim the remote interface lock. Returns false when the instrument
    /// reports the lock could not be taken.
    pub fn lock(&mut self) -> bool {
        match self.session.query("IFLOCK").as_deref().map(str::trim) {
            Some("1") => true,
            _ => {
                warn!("! lock failed refer to instrument manual for possible causes");
                false
            }
        }
    }

    pub fn unlock(&mut self) -> bool {
        match self.session.query("IFUNLOCK").as_deref().map(str::trim) {
            Some("0") => true,
            _ => {
                warn!("! unlock failed refer to instrument manual for possible causes");
                false
            }
        }
    }

    fn limit_status_raw(&mut self, channel: u8) -> Option<u16> {
        self.session
            .query(&format!("LSR{channel}?"))
            .and_then(|raw| raw.trim().parse::<u16>().ok())
    }

    /// Bit positions currently set in the limit-status register.
    pub fn limit_status_active_bits(&mut self, channel: u8) -> Vec<u8> {
        let Some(register) = self.limit_status_raw(channel) else {
            return Vec::new();
        };
        (0..16).filter(|bit| register & (1 << bit) != 0).collect()
    }

    /// Log a human-readable report of the active limit conditions.
    pub fn report_limit_status(&mut self, channel: u8) {
        let active = self.limit_status_active_bits(channel);
        warn!("OUT{channel} Limits [");
        for (bit, message) in LSR_BIT_MESSAGES {
            if active.contains(bit) {
                warn!("+ {message}");
            }
        }
        warn!("]");
    }

    /// Step the output voltage from `from_volts` to `to_volts` in 0.1 V
    /// increments, waiting `step_delay` before each step.
    pub fn ramp_voltage(&mut self, channel: u8, from_volts: f64, to_volts: f64, step_delay: Duration) {
        let start = (from_volts * 10.0).round() as i64;
        let end = (to_volts * 10.0).round() as i64;
        let steps: Vec<i64> = if start <= end {
            (start..=end).collect()
        } else {
            (end..=start).rev().collect()
        };
        for tenths in steps {
            thread::sleep(step_delay);
            self.set_voltage(channel, tenths as f64 / 10.0);
        }
    }
}

fn parse_reading(raw: Option<String>) -> Option<f64> {
    // readings come back as e.g. "V1 12.000" or bare "12.000"
    let raw = raw?;
    let token = raw.split_whitespace().last()?;
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusSettings;
    use crate::session::SessionManager;
    use crate::transport::mock::{MockBus, MockDevice};

    fn supply_bus() -> MockBus {
        MockBus::new().with_device(
            "ASRL4::INSTR",
            MockDevice::new("THURLBY THANDAR, CPX400DP")
                .with_response("V1?", "V1 12.000")
                .with_response("I1?", "I1 0.500")
                .with_response("LSR1?", "5")
                .with_response("IFLOCK", "1"),
        )
    }

    fn open_supply(bus: &MockBus) -> Cpx400dp {
        let manager = SessionManager::new(bus.clone(), BusSettings::default());
        let mut supply = Cpx400dp::attach(manager.open("ASRL4::INSTR").unwrap());
        supply.set_output_blanking(Duration::ZERO);
        supply
    }

    #[test]
    fn test_voltage_readback_parses_prefixed_reply() {
        let bus = supply_bus();
        let mut supply = open_supply(&bus);
        assert_eq!(supply.voltage(1), Some(12.0));
        assert_eq!(supply.current(1), Some(0.5));
    }

    #[test]
    fn test_limit_status_bits() {
        let bus = supply_bus();
        let mut supply = open_supply(&bus);
        assert_eq!(supply.limit_status_active_bits(1), vec![0, 2]);
    }

    #[test]
    fn test_output_on_reads_lsr_first() {
        let bus = supply_bus();
        let mut supply = open_supply(&bus);
        supply.output_on(1, Duration::ZERO);
        assert_eq!(bus.commands_sent("ASRL4::INSTR"), vec!["LSR1?", "OP1 1"]);
    }

    #[test]
    fn test_stop_switches_both_outputs_off() {
        let bus = supply_bus();
        let mut supply = open_supply(&bus);
        supply.stop();
        assert_eq!(bus.commands_sent("ASRL4::INSTR"), vec!["OP1 0", "OP2 0"]);
    }

    #[test]
    fn test_stop_paces_outputs_with_configured_blanking() {
        let bus = supply_bus();
        let manager = SessionManager::new(bus.clone(), BusSettings::default());
        let mut supply = Cpx400dp::attach(manager.open("ASRL4::INSTR").unwrap());
        assert_eq!(supply.output_blanking(), Duration::from_secs(1));

        supply.set_output_blanking(Duration::from_millis(5));
        let before = std::time::Instant::now();
        supply.stop();
        // one settling wait per output
        assert!(before.elapsed() >= Duration::from_millis(10));
        assert_eq!(bus.commands_sent("ASRL4::INSTR"), vec!["OP1 0", "OP2 0"]);
    }

    #[test]
    fn test_ramp_steps_by_tenths() {
        let bus = supply_bus();
        let mut supply = open_supply(&bus);
        supply.ramp_voltage(1, 1.0, 1.3, Duration::ZERO);
        assert_eq!(
            bus.commands_sent("ASRL4::INSTR"),
            vec!["V1 1", "V1 1.1", "V1 1.2", "V1 1.3"]
        );
    }

    #[test]
    fn test_ramp_downwards() {
        let bus = supply_bus();
        let mut supply = open_supply(&bus);
        supply.ramp_voltage(1, 0.2, 0.0, Duration::ZERO);
        assert_eq!(
            bus.commands_sent("ASRL4::INSTR"),
            vec!["V1 0.2", "V1 0.1", "V1 0"]
        );
    }

    #[test]
    fn test_interface_lock() {
        let bus = supply_bus();
        let mut supply = open_supply(&bus);
        assert!(supply.lock());
        assert!(!supply.unlock()); // no canned IFUNLOCK reply -> sentinel
    }
}
