//! Sweep-and-measure power characterization.
//!
//! Allocates a voltmeter and an ammeter (both DMM6500) plus a supply
//! (CPX400DP), steps the supply through the voltage range in 0.1 V
//! increments and records voltage, current and computed power series to a
//! report file.

use crate::data::{Series, SeriesWriter};
use crate::discovery::{AllocationPrompt, InstrumentDiscovery};
use crate::error::AppResult;
use crate::instrument::dmm6500::DmmMode;
use crate::instrument::{Cpx400dp, Dmm6500, NoMode};
use log::info;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SweepParams {
    /// Swept supply voltage range in volts.
    pub voltage_range: (f64, f64),
    /// Supply current limit range; the upper bound is programmed.
    pub current_range: (f64, f64),
    /// Wait after switching the output on.
    pub output_blanking: Duration,
    /// Wait after each voltage step before reading the meters.
    pub step_settle: Duration,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            voltage_range: (0.0, 24.0),
            current_range: (0.0, 0.5),
            output_blanking: Duration::from_secs(1),
            step_settle: Duration::from_millis(50),
        }
    }
}

impl SweepParams {
    pub fn current_limit(&self) -> f64 {
        self.current_range.1
    }
}

/// Run the sweep and write the report. With a prompt, the two meter
/// allocations go through operator confirmation (the supply is always taken
/// non-interactively, as there is only one role for it).
pub fn power_sweep(
    discovery: &mut InstrumentDiscovery,
    params: &SweepParams,
    writer: &SeriesWriter,
    mut prompt: Option<&mut dyn AllocationPrompt>,
) -> AppResult<PathBuf> {
    let mut voltmeter = match prompt.as_mut() {
        Some(prompt) => discovery.allocate_interactive::<Dmm6500>(DmmMode::DcVolts, &mut **prompt)?,
        None => discovery.allocate::<Dmm6500>(DmmMode::DcVolts)?,
    };
    let mut ammeter = match prompt.as_mut() {
        Some(prompt) => discovery.allocate_interactive::<Dmm6500>(DmmMode::DcAmps, &mut **prompt)?,
        None => discovery.allocate::<Dmm6500>(DmmMode::DcAmps)?,
    };
    let mut supply = discovery.allocate::<Cpx400dp>(NoMode::Default)?;
    supply.set_output_blanking(params.output_blanking);

    let mut volts = Series::new("v");
    let mut amps = Series::new("i");
    let mut watts = Series::new("p");

    let (v_start, v_end) = params.voltage_range;
    supply.set_current(1, params.current_limit());
    supply.set_voltage(1, v_start);
    supply.output_on(1, params.output_blanking);

    let start = (v_start * 10.0).round() as i64;
    let end = (v_end * 10.0).round() as i64;
    for tenths in start..=end {
        supply.set_voltage(1, tenths as f64 / 10.0);
        thread::sleep(params.step_settle);
        let volt = voltmeter.acquire_measurement(true)?;
        let amp = ammeter.acquire_measurement(true)?;
        volts.add_data_point(volt);
        amps.add_data_point(amp);
        watts.add_data_point(match (volt, amp) {
            (Some(v), Some(i)) => Some(v * i),
            _ => None,
        });
    }

    // shutdown sequence runs for each instrument here
    drop(supply);
    drop(ammeter);
    drop(voltmeter);

    let points = volts.len();
    let path = writer.write(&volts.join(amps).join(watts))?;
    info!("-> Power sweep finished, {points} points");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusSettings;
    use crate::session::SessionManager;
    use crate::transport::mock::{MockBus, MockDevice};

    fn meter(reading: &str) -> MockDevice {
        MockDevice::new("KEITHLEY DMM6500")
            .with_mode_tracking(":SENS:FUNC", "VOLT:DC")
            .with_response(":MEAS?", reading)
    }

    #[test]
    fn test_power_sweep_writes_three_columns() {
        let bus = MockBus::new()
            .with_device("USB0::0x05E6::0x6500::04612268::INSTR", meter("2.0"))
            .with_device("USB0::0x05E6::0x6500::04612414::INSTR", meter("0.25"))
            .with_device("ASRL4::INSTR", MockDevice::new("CPX400DP"));
        let manager = SessionManager::new(bus.clone(), BusSettings::default());
        let mut discovery = InstrumentDiscovery::new(manager).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let writer = SeriesWriter::new(dir.path().join("power.csv"));
        let params = SweepParams {
            voltage_range: (0.0, 0.2),
            output_blanking: Duration::ZERO,
            step_settle: Duration::ZERO,
            ..SweepParams::default()
        };

        let path = power_sweep(&mut discovery, &params, &writer, None).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("v;i;p"));
        // 0.0, 0.1, 0.2 -> three measurement rows
        assert_eq!(lines.clone().count(), 3);
        assert_eq!(lines.next(), Some("2;0.25;0.5"));

        // the supply saw the limit, the sweep steps and the shutdown
        let sent = bus.commands_sent("ASRL4::INSTR");
        assert!(sent.contains(&"I1 0.5".to_string()));
        assert!(sent.contains(&"V1 0.2".to_string()));
        assert!(sent.contains(&"OP1 1".to_string()));
        assert!(sent.ends_with(&[
            "OP1 0".to_string(),
            "OP2 0".to_string(),
            "LOCAL".to_string(),
            "*RST".to_string()
        ]));
    }

    #[test]
    fn test_inverted_range_records_no_points() {
        let bus = MockBus::new()
            .with_device("USB0::0x05E6::0x6500::04612268::INSTR", meter("2.0"))
            .with_device("USB0::0x05E6::0x6500::04612414::INSTR", meter("0.25"))
            .with_device("ASRL4::INSTR", MockDevice::new("CPX400DP"));
        let manager = SessionManager::new(bus.clone(), BusSettings::default());
        let mut discovery = InstrumentDiscovery::new(manager).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let writer = SeriesWriter::new(dir.path().join("power.csv"));
        let params = SweepParams {
            voltage_range: (0.2, 0.0),
            output_blanking: Duration::ZERO,
            step_settle: Duration::ZERO,
            ..SweepParams::default()
        };

        // an inverted range sweeps nothing: header row only
        let path = power_sweep(&mut discovery, &params, &writer, None).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["v;i;p"]);
    }

    #[test]
    fn test_needs_two_meters() {
        // only one DMM present: the second allocation exhausts the pool
        let bus = MockBus::new()
            .with_device("USB0::0x05E6::0x6500::04612268::INSTR", meter("2.0"))
            .with_device("ASRL4::INSTR", MockDevice::new("CPX400DP"));
        let manager = SessionManager::new(bus.clone(), BusSettings::default());
        let mut discovery = InstrumentDiscovery::new(manager).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let writer = SeriesWriter::new(dir.path().join("power.csv"));
        let err = power_sweep(&mut discovery, &SweepParams::default(), &writer, None).unwrap_err();
        assert!(matches!(
            err,
            crate::error::DaqError::AllocationExhausted { kind: "DMM6500" }
        ));
    }
}
