//! Instrument protocol base.
//!
//! Every driver kind implements [`Instrument`]: the capability set shared by
//! all bench instruments (default addresses, release to local control, safe
//! stop, `*RST` reset, mode control with read-back assertion). Mode values
//! implement [`ModeValue`]; each kind carries a reserved Default sentinel
//! meaning "leave the current mode as-is on entry".
//!
//! [`Active`] is the scoped lifecycle: constructing it applies the requested
//! mode on the already-open session, dropping it brings the instrument back
//! to a safe, local state by running `stop`, `release`, `reset` in that
//! fixed order, on every exit path, panicking or not.

pub mod cpx400dp;
pub mod dmm6500;
pub mod tektronix;

pub use cpx400dp::Cpx400dp;
pub use dmm6500::Dmm6500;
pub use tektronix::TekScope;

use crate::error::{AppResult, DaqError};
use crate::session::Session;
use log::info;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Timeout for mode read-back queries.
const MODE_QUERY_TIMEOUT: Duration = Duration::from_millis(10);

/// An instrument operating mode.
pub trait ModeValue: Copy + PartialEq + std::fmt::Debug + 'static {
    /// Wire value for this mode. `None` is the reserved Default sentinel.
    fn command(self) -> Option<&'static str>;

    /// Parse an instrument-reported value.
    fn parse(raw: &str) -> Option<Self>;
}

/// Mode type for kinds without a switchable measurement function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoMode {
    #[default]
    Default,
}

impl ModeValue for NoMode {
    fn command(self) -> Option<&'static str> {
        None
    }

    fn parse(_raw: &str) -> Option<Self> {
        None
    }
}

/// Capability set every concrete instrument kind must supply.
pub trait Instrument: Sized {
    type Mode: ModeValue;

    /// Kind tag used in logs and allocation errors.
    const KIND: &'static str;

    /// Command stem for mode control (e.g. `:SENS:FUNC`); empty for kinds
    /// without one.
    const MODE_CTRL_CMD: &'static str = "";

    /// Addresses at which instances of this kind are conventionally found.
    /// Allocation tries them in declaration order.
    fn default_addresses() -> &'static [&'static str];

    /// Wrap an open session. No bus traffic happens here; the mode is
    /// applied when the instrument is brought up as [`Active`].
    fn attach(session: Session) -> Self;

    fn session(&mut self) -> &mut Session;

    /// Return the instrument to local/manual control.
    fn release(&mut self);

    /// Bring the instrument to a safe idle state (e.g. all outputs off).
    fn stop(&mut self);

    /// Hardware reset.
    fn reset(&mut self) {
        self.session().send("*RST");
    }

    /// Read the current operating mode. `None` when the query fails or the
    /// reported value is not a known mode.
    fn mode(&mut self) -> Option<Self::Mode> {
        let query = format!("{}?", Self::MODE_CTRL_CMD);
        let raw = self.session().query_with(&query, MODE_QUERY_TIMEOUT)?;
        Self::Mode::parse(raw.trim().trim_matches('"'))
    }

    /// Issue the mode-change command and confirm it by read-back.
    ///
    /// The Default sentinel leaves the current mode untouched. A read-back
    /// mismatch is fatal ([`DaqError::ModeAssertion`]) and is never retried:
    /// measuring under an unconfirmed mode produces nonsense data.
    fn apply_mode(&mut self, mode: Self::Mode) -> AppResult<()> {
        let Some(value) = mode.command() else {
            return Ok(());
        };
        let command = format!("{} \"{}\"", Self::MODE_CTRL_CMD, value);
        self.session().send(&command);
        self.assert_mode(mode)
    }

    /// Read back the mode and fail unless it matches `mode`.
    fn assert_mode(&mut self, mode: Self::Mode) -> AppResult<()> {
        let Some(requested) = mode.command() else {
            return Ok(());
        };
        let query = format!("{}?", Self::MODE_CTRL_CMD);
        let reported = self
            .session()
            .query_with(&query, MODE_QUERY_TIMEOUT)
            .unwrap_or_default();
        let reported = reported.trim().trim_matches('"');
        if reported == requested {
            Ok(())
        } else {
            Err(DaqError::ModeAssertion {
                requested: requested.to_string(),
                reported: reported.to_string(),
            })
        }
    }
}

/// An instrument under remote control, with its configured mode applied.
///
/// Dropping the handle runs the fixed shutdown sequence `stop`, `release`,
/// `reset`, then closes the underlying session.
pub struct Active<I: Instrument> {
    inner: Option<I>,
}

impl<I: Instrument> Active<I> {
    /// Apply `mode` (with read-back assertion) and take over the instrument.
    ///
    /// On a mode-assertion failure the instrument is dropped as-is: the
    /// session closes, but no shutdown commands are sent beyond the one
    /// attempted mode change.
    pub fn bring_up(mut instrument: I, mode: I::Mode) -> AppResult<Self> {
        instrument.apply_mode(mode)?;
        Ok(Self {
            inner: Some(instrument),
        })
    }
}

impl<I: Instrument> std::fmt::Debug for Active<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Active").field("kind", &I::KIND).finish()
    }
}

impl<I: Instrument> Deref for Active<I> {
    type Target = I;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &I {
        self.inner.as_ref().expect("instrument present until drop")
    }
}

impl<I: Instrument> DerefMut for Active<I> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut I {
        self.inner.as_mut().expect("instrument present until drop")
    }
}

impl<I: Instrument> Drop for Active<I> {
    fn drop(&mut self) {
        if let Some(mut instrument) = self.inner.take() {
            instrument.stop();
            instrument.release();
            instrument.reset();
            info!("-> Remote lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusSettings;
    use crate::session::SessionManager;
    use crate::transport::mock::{MockBus, MockDevice};

    struct TestMeter {
        session: Session,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestMode {
        Default,
        Volts,
        Amps,
    }

    impl ModeValue for TestMode {
        fn command(self) -> Option<&'static str> {
            match self {
                TestMode::Default => None,
                TestMode::Volts => Some("VOLT:DC"),
                TestMode::Amps => Some("CURR:DC"),
            }
        }

        fn parse(raw: &str) -> Option<Self> {
            match raw {
                "VOLT:DC" => Some(TestMode::Volts),
                "CURR:DC" => Some(TestMode::Amps),
                _ => None,
            }
        }
    }

    impl Instrument for TestMeter {
        type Mode = TestMode;
        const KIND: &'static str = "TestMeter";
        const MODE_CTRL_CMD: &'static str = ":SENS:FUNC";

        fn default_addresses() -> &'static [&'static str] {
            &["T1"]
        }

        fn attach(session: Session) -> Self {
            Self { session }
        }

        fn session(&mut self) -> &mut Session {
            &mut self.session
        }

        fn release(&mut self) {
            self.session.send("LOCAL");
        }

        fn stop(&mut self) {
            self.session.send("STOP");
        }
    }

    fn meter_bus() -> MockBus {
        MockBus::new().with_device(
            "T1",
            MockDevice::new("METER")
                .with_mode_tracking(":SENS:FUNC", "VOLT:DC")
                .rejecting_mode("CURR:DC"),
        )
    }

    fn open_meter(bus: &MockBus) -> TestMeter {
        let manager = SessionManager::new(bus.clone(), BusSettings::default());
        TestMeter::attach(manager.open("T1").unwrap())
    }

    #[test]
    fn test_mode_round_trip() {
        let bus = meter_bus();
        let mut meter = open_meter(&bus);
        assert_eq!(meter.mode(), Some(TestMode::Volts));
        meter.apply_mode(TestMode::Volts).unwrap();
        assert_eq!(meter.mode(), Some(TestMode::Volts));
    }

    #[test]
    fn test_rejected_mode_fails_assertion() {
        let bus = meter_bus();
        let mut meter = open_meter(&bus);
        let err = meter.apply_mode(TestMode::Amps).unwrap_err();
        assert!(matches!(err, DaqError::ModeAssertion { .. }));
        // instrument still reports the old mode
        assert_eq!(meter.mode(), Some(TestMode::Volts));
    }

    #[test]
    fn test_default_mode_is_left_as_is() {
        let bus = meter_bus();
        let mut meter = open_meter(&bus);
        meter.apply_mode(TestMode::Default).unwrap();
        // only the attach-time traffic, no mode command
        assert!(bus
            .commands_sent("T1")
            .iter()
            .all(|cmd| !cmd.starts_with(":SENS:FUNC \"")));
    }

    #[test]
    fn test_active_debug_names_the_kind() {
        let bus = meter_bus();
        let meter = open_meter(&bus);
        let active = Active::bring_up(meter, TestMode::Default).unwrap();
        assert_eq!(format!("{active:?}"), "Active { kind: \"TestMeter\" }");

        // results holding an Active must be debuggable for unwrap_err
        let failed: AppResult<Active<TestMeter>> =
            Err(DaqError::AllocationExhausted { kind: "TestMeter" });
        assert!(matches!(
            failed.unwrap_err(),
            DaqError::AllocationExhausted { .. }
        ));
    }

    #[test]
    fn test_active_shutdown_sequence() {
        let bus = meter_bus();
        let meter = open_meter(&bus);
        let active = Active::bring_up(meter, TestMode::Default).unwrap();
        drop(active);
        let sent = bus.commands_sent("T1");
        let tail: Vec<&str> = sent.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["STOP", "LOCAL", "*RST"]);
    }
}
