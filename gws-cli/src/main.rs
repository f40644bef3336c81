//! GWS Shifter CLI Application
//!
//! Command-line front end for the gws-protocol engine. It adds:
//! - Configuration file loading with command-line overrides
//! - Bus adapters (candump replay in, candump text out)
//! - The receiver and LED refresh threads
//! - An end-of-run summary (text or JSON)

use anyhow::{Context, Result};
use clap::Parser;
use gws_protocol::{GearState, GwsController};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod bus;
mod config;
mod report;
mod runtime;

use bus::{BusAdapter, CandumpReplay, CandumpWriter, FrameSink};
use config::{AppConfig, BusConfig};
use runtime::RuntimeOptions;

/// GWS Shifter - emulate the gear selector side of a BMW F-series GWS
#[derive(Parser, Debug)]
#[command(name = "gws-cli")]
#[command(about = "Drive a BMW F-series gear selector from a candump stream", long_about = None)]
#[command(version)]
struct Args {
    /// candump log to replay ("-" reads stdin)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file for outbound frames (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Gear at startup (P, R, N, D, M1-M8)
    #[arg(long, value_name = "GEAR")]
    initial_gear: Option<GearState>,

    /// Maximum number of frames to receive
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<usize>,

    /// Pace the replay by the capture timestamps
    #[arg(long)]
    realtime: bool,

    /// Print the end-of-run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("GWS Shifter CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using protocol library v{}", gws_protocol::VERSION);

    let config = resolve_config(&args)?;
    log::debug!("Effective configuration: {:?}", config);

    let bus = open_input(&config.bus)?;
    let sink = open_output(&config.bus)?;

    let controller = Arc::new(GwsController::new(config.shifter.clone()));
    let options = RuntimeOptions {
        receive_timeout: config.receive.timeout(),
        refresh_interval: config.led.refresh_interval(),
        max_frames: args.max_frames,
        backlight: config.led.startup_backlight(),
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            log::info!("Stop requested");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let summary = runtime::run(Arc::clone(&controller), bus, sink, &options, shutdown)?;
    let snapshot = controller.snapshot();

    // Outbound frames own stdout when no output file is given
    if config.bus.output.is_some() {
        report::write_report(&mut io::stdout().lock(), &snapshot, &summary, args.json)?;
    } else {
        report::write_report(&mut io::stderr().lock(), &snapshot, &summary, args.json)?;
    }

    Ok(())
}

/// Load the config file (if any) and apply command-line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(input) = &args.input {
        config.bus.input = Some(input.clone());
    }
    if let Some(output) = &args.output {
        config.bus.output = Some(output.clone());
    }
    if let Some(gear) = args.initial_gear {
        config.shifter.initial_gear = gear;
    }
    if args.realtime {
        config.bus.realtime = true;
    }

    Ok(config)
}

fn open_input(bus: &BusConfig) -> Result<Box<dyn BusAdapter>> {
    let path = bus
        .input
        .as_ref()
        .context("No input specified (use --input or set [bus] input)")?;

    if path.as_os_str() == "-" {
        log::info!("Replaying candump from stdin");
        return Ok(Box::new(CandumpReplay::stdin(bus.realtime)?));
    }

    log::info!("Replaying candump log: {:?}", path);
    Ok(Box::new(CandumpReplay::open(path, bus.realtime)?))
}

fn open_output(bus: &BusConfig) -> Result<Box<dyn FrameSink>> {
    match &bus.output {
        Some(path) => {
            log::info!("Writing outbound frames to: {:?}", path);
            let file = File::create(path)
                .with_context(|| format!("Failed to create output: {:?}", path))?;
            Ok(Box::new(CandumpWriter::new(BufWriter::new(file), bus.channel.as_str())))
        }
        None => Ok(Box::new(CandumpWriter::new(io::stdout(), bus.channel.as_str()))),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
