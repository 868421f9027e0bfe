//! Scripted characterization procedures.
//!
//! Sequences of calls against the session/allocation layer: everything here
//! is deliberately thin glue over the instrument drivers, with explicit
//! settle waits between state-changing commands.

pub mod power;
pub mod ramp;

pub use power::{power_sweep, SweepParams};
pub use ramp::{triangular_ramp, RampParams};
