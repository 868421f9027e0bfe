//! Triangular voltage-ramp profiles.
//!
//! Used to find logic thresholds and hysteresis of supervisor pins (PGOOD,
//! UVLO, enable inputs): the supply output ramps from a resting level to a
//! turning level and back in 0.1 V steps, with hold times before and after
//! the excursion so the device under test settles. An optional second
//! channel provides a fixed bias rail for the duration of the profile.

use crate::instrument::Cpx400dp;
use std::thread;
use std::time::Duration;

/// Hold times shorter than this give the device under test no time to
/// settle before the excursion starts.
const MIN_HOLD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RampParams {
    /// Ramped output channel.
    pub channel: u8,
    /// Resting level the profile starts and ends at, in volts.
    pub start_volts: f64,
    /// Turning level of the excursion. Below the resting level the profile
    /// is convex, above it concave.
    pub turn_volts: f64,
    /// Fixed bias rail held on a second channel for the whole profile.
    pub bias: Option<(u8, f64)>,
    /// Wait after programming the initial levels, before switching on.
    pub power_up_delay: Duration,
    pub init_hold: Duration,
    pub final_hold: Duration,
    /// Wait before each 0.1 V step.
    pub step_delay: Duration,
    /// Wait around output switching.
    pub output_blanking: Duration,
}

impl Default for RampParams {
    fn default() -> Self {
        Self {
            channel: 1,
            start_volts: 24.0,
            turn_volts: 10.0,
            bias: None,
            power_up_delay: Duration::from_secs(10),
            init_hold: MIN_HOLD,
            final_hold: MIN_HOLD,
            step_delay: Duration::from_millis(50),
            output_blanking: Duration::from_secs(1),
        }
    }
}

impl RampParams {
    /// Set the hold times, clamped to the minimum settling hold.
    pub fn with_holds(mut self, init_hold: Duration, final_hold: Duration) -> Self {
        self.init_hold = init_hold.max(MIN_HOLD);
        self.final_hold = final_hold.max(MIN_HOLD);
        self
    }
}

/// Drive one triangular excursion on an already-allocated supply.
pub fn triangular_ramp(supply: &mut Cpx400dp, params: &RampParams) {
    supply.set_output_blanking(params.output_blanking);
    supply.set_voltage(params.channel, params.start_volts);
    if let Some((bias_channel, bias_volts)) = params.bias {
        supply.set_voltage(bias_channel, bias_volts);
    }
    thread::sleep(params.power_up_delay);

    supply.output_on(params.channel, params.output_blanking);
    if let Some((bias_channel, _)) = params.bias {
        supply.output_on(bias_channel, params.output_blanking);
    }

    thread::sleep(params.init_hold);
    supply.ramp_voltage(
        params.channel,
        params.start_volts,
        params.turn_volts,
        params.step_delay,
    );
    supply.ramp_voltage(
        params.channel,
        params.turn_volts,
        params.start_volts,
        params.step_delay,
    );
    thread::sleep(params.final_hold);

    if let Some((bias_channel, _)) = params.bias {
        supply.output_off(bias_channel, params.output_blanking);
    }
    supply.output_off(params.channel, params.output_blanking);
}
