//! Command-line entry point for the bench automation tools.

use anyhow::Result;
use bench_daq::config::Settings;
use bench_daq::data::SeriesWriter;
use bench_daq::discovery::{AllocationPrompt, InstrumentDiscovery, StdinPrompt};
use bench_daq::error::DaqError;
use bench_daq::instrument::{Cpx400dp, NoMode};
use bench_daq::procedures::{power_sweep, triangular_ramp, RampParams, SweepParams};
use bench_daq::session::SessionManager;
use bench_daq::transport::Bus;
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bench_daq", version, about = "Bench-instrument discovery and characterization scripts")]
struct Cli {
    /// Configuration file (TOML). Environment variables with the BENCH_DAQ_
    /// prefix override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Transport the instruments are reached over.
    #[arg(long, value_enum, global = true, default_value_t = Transport::Serial)]
    transport: Transport,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Serial,
    Visa,
}

#[derive(Subcommand)]
enum Command {
    /// Enumerate the bus and print every instrument that answers `*IDN?`.
    Discover,
    /// Sweep a supply voltage range while logging meter readings to a report.
    PowerSweep {
        /// Sweep start voltage.
        #[arg(long, default_value_t = 0.0)]
        vmin: f64,
        /// Sweep end voltage.
        #[arg(long, default_value_t = 24.0)]
        vmax: f64,
        /// Programmed supply current limit.
        #[arg(long, default_value_t = 0.5)]
        imax: f64,
        /// Report directory; defaults to the configured storage path.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Confirm each meter allocation on the console.
        #[arg(short, long)]
        interactive: bool,
    },
    /// Drive one triangular voltage excursion on a supply output.
    Ramp {
        #[arg(long, default_value_t = 1)]
        channel: u8,
        /// Resting level the profile starts and ends at.
        #[arg(long)]
        start: f64,
        /// Turning level of the excursion.
        #[arg(long)]
        turn: f64,
        /// Fixed bias voltage held on the other output for the whole profile.
        #[arg(long)]
        bias: Option<f64>,
        /// Hold time before and after the excursion, in seconds.
        #[arg(long, default_value_t = 5)]
        hold: u64,
    },
}

fn open_bus(transport: Transport) -> Result<Box<dyn Bus>> {
    match transport {
        Transport::Serial => {
            #[cfg(feature = "transport_serial")]
            {
                Ok(Box::new(bench_daq::transport::serial::SerialBus::new()))
            }
            #[cfg(not(feature = "transport_serial"))]
            {
                Err(DaqError::FeatureNotEnabled("transport_serial".to_string()).into())
            }
        }
        Transport::Visa => {
            #[cfg(feature = "transport_visa")]
            {
                Ok(Box::new(bench_daq::transport::visa::VisaBus::new()?))
            }
            #[cfg(not(feature = "transport_visa"))]
            {
                Err(DaqError::FeatureNotEnabled("transport_visa".to_string()).into())
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    env_logger::Builder::from_env(
        Env::default().default_filter_or(settings.log_level.as_filter()),
    )
    .init();

    let bus = open_bus(cli.transport)?;
    let manager = SessionManager::new(bus, settings.bus.clone());

    match cli.command {
        Command::Discover => {
            let discovery = InstrumentDiscovery::new(manager)?;
            for address in discovery.discovered() {
                match discovery.handshakes().get(address) {
                    Some(identity) => println!("{address}  {identity}"),
                    None => println!("{address}  <no response>"),
                }
            }
        }
        Command::PowerSweep {
            vmin,
            vmax,
            imax,
            output,
            interactive,
        } => {
            let mut discovery = InstrumentDiscovery::new(manager)?;
            let params = SweepParams {
                voltage_range: (vmin, vmax),
                current_range: (0.0, imax),
                ..SweepParams::default()
            };
            let report_dir =
                output.unwrap_or_else(|| PathBuf::from(&settings.storage.default_path));
            let writer = SeriesWriter::new(report_dir.join("power.csv"));
            let mut prompt = StdinPrompt;
            let prompt: Option<&mut dyn AllocationPrompt> =
                if interactive { Some(&mut prompt) } else { None };
            let path = power_sweep(&mut discovery, &params, &writer, prompt)?;
            println!("Report written to {}", path.display());
        }
        Command::Ramp {
            channel,
            start,
            turn,
            bias,
            hold,
        } => {
            let mut discovery = InstrumentDiscovery::new(manager)?;
            let mut supply = discovery.allocate::<Cpx400dp>(NoMode::Default)?;
            let params = RampParams {
                channel,
                start_volts: start,
                turn_volts: turn,
                bias: bias.map(|volts| (if channel == 1 { 2 } else { 1 }, volts)),
                ..RampParams::default()
            }
            .with_holds(Duration::from_secs(hold), Duration::from_secs(hold));
            triangular_ramp(&mut supply, &params);
        }
    }
    Ok(())
}
