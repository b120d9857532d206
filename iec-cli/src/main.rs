//! IEC bridge - drive the device interface against a real host.
//!
//! Usage:
//!   iec-bridge --port <PORT> <SCRIPT>
//!
//! Examples:
//!   iec-bridge --list-ports                          # Show serial ports
//!   iec-bridge --port /dev/ttyUSB0 load-dir.json     # Replay a bus session
//!   iec-bridge --config bridge.json -vv save.json    # Settings from a file

mod script;
mod serial_link;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use iec_core::{AtnCheck, Config, HeadlessBus, Interface, PipelineReport};

use crate::script::Script;
use crate::serial_link::SerialLink;

/// IEC device bridge
#[derive(Parser, Debug)]
#[command(name = "iec-bridge")]
#[command(about = "Answer a scripted IEC bus session from a serial host")]
struct Args {
    /// JSON bus session to replay
    #[arg(required_unless_present = "list_ports")]
    script: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the host
    #[arg(short, long)]
    port: Option<String>,

    /// Serial speed
    #[arg(short, long)]
    baud: Option<u32>,

    /// Host read timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Bus device number
    #[arg(short, long)]
    device: Option<u8>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Enable byte-level tracing
    #[arg(short, long)]
    trace: bool,
}

impl Args {
    /// Config file values, then command line overrides.
    fn config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(port) = &self.port {
            config.link.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.link.timeout_ms = timeout_ms;
        }
        if let Some(device) = self.device {
            config.device_number = device;
        }
        config.validate()?;
        Ok(config)
    }
}

/// What the session put on the bus.
struct Summary {
    reports: Vec<PipelineReport>,
    stopped: bool,
}

fn run_session(
    mut iface: Interface<HeadlessBus, SerialLink>,
    stop: &AtomicBool,
) -> (Summary, HeadlessBus) {
    let mut reports = Vec::new();
    let mut stopped = false;
    while iface.bus().pending_attention() > 0 {
        if stop.load(Ordering::Relaxed) {
            stopped = true;
            break;
        }
        let check = iface.handler();
        if check == AtnCheck::Error {
            warn!("bus error during attention");
        }
        if let Some(report) = iface.take_report() {
            info!(?report, "pipeline done");
            reports.push(report);
        }
    }
    let (bus, _link) = iface.into_parts();
    (Summary { reports, stopped }, bus)
}

fn print_summary(summary: &Summary, bus: &HeadlessBus) {
    println!("Bus output ({} bytes):", bus.sent().len());
    for line in bus.sent().chunks(16) {
        let hex: Vec<String> = line
            .iter()
            .map(|b| {
                if b.eoi {
                    format!("{:02X}*", b.value)
                } else {
                    format!("{:02X}", b.value)
                }
            })
            .collect();
        println!("  {}", hex.join(" "));
    }
    if bus.fnf_count() > 0 {
        println!("File not found signalled {} time(s)", bus.fnf_count());
    }
    for report in &summary.reports {
        println!("{:?}", report);
    }
    if summary.stopped {
        println!("Stopped before the session finished");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.trace {
        Level::TRACE
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.list_ports {
        serial_link::list_ports()?;
        return Ok(());
    }

    let config = args.config()?;
    let script_path = args.script.clone().ok_or("no session script given")?;
    let script = Script::load(&script_path)?;
    eprintln!(
        "Loaded session: {} ({} events)",
        script_path.display(),
        script.events.len()
    );

    let link = SerialLink::from_config(&config.link)?;
    let bus = script.into_bus(config.device_number);
    let iface = Interface::with_config(bus, link, &config);

    let stop = Arc::new(AtomicBool::new(false));
    let session_stop = Arc::clone(&stop);

    // The dispatcher blocks on serial reads, so keep it off the runtime.
    let mut session = tokio::task::spawn_blocking(move || run_session(iface, &session_stop));

    let (summary, bus) = tokio::select! {
        result = &mut session => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, finishing current event...");
            stop.store(true, Ordering::Relaxed);
            session.await?
        }
    };

    print_summary(&summary, &bus);
    Ok(())
}
