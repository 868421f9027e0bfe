//! Bench-instrument automation library.
//!
//! This library layers session management, instrument discovery and role
//! allocation on top of a pluggable transport (serial, VISA or a scripted
//! mock), plus the drivers and scripted procedures the characterization
//! scripts are built from. It is used by the `bench_daq` command-line tool
//! and by standalone measurement scripts.

pub mod config;
pub mod data;
pub mod discovery;
pub mod error;
pub mod guard;
pub mod instrument;
pub mod procedures;
pub mod session;
pub mod transport;

pub use discovery::InstrumentDiscovery;
pub use error::{AppResult, DaqError};
pub use guard::SessionGuard;
pub use session::{Session, SessionManager};
