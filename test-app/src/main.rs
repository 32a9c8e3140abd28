// ieapspect test application -- CLI tool for exercising the spectrometer
// drivers against real hardware or the simulated device.
//
// Usage:
//   spect-test-app list
//   spect-test-app --device dummy info
//   spect-test-app --device serspect --port /dev/ttyACM0 get 0x02
//   spect-test-app --device serspect set 0x02 300
//   spect-test-app --device serspect ping
//   spect-test-app --device dm100 --program ./ieapspect-wrapper-dm100 props
//   spect-test-app --device spectrig monitor --count 100
//   spect-test-app --device sipos monitor --duration 30
//   spect-test-app --device serspect stress 0x02 --count 200

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use rand::Rng;
use tracing_subscriber::EnvFilter;

use ieapspect::serspect::SerSpectBuilder;
use ieapspect::{ConnectOptions, DeviceKind, SessionState, Spectrometer, connect, events};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// ieapspect test application -- exercises spectrometer drivers from the
/// command line.
#[derive(Parser)]
#[command(name = "spect-test-app", version, about)]
struct Cli {
    /// Device kind: serspect, sipos, dm100, spectrig, dummy.
    /// Required for all commands except `list`.
    #[arg(long)]
    device: Option<DeviceKind>,

    /// Serial port path (e.g. /dev/ttyACM0, COM4). Serial devices look
    /// themselves up by USB description when omitted.
    #[arg(long)]
    port: Option<String>,

    /// Helper program for dm100 and spectrig.
    #[arg(long)]
    program: Option<String>,

    /// Deadline for property reads and pings, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the device kinds compiled into this build.
    List,
    /// Print device information.
    Info,
    /// List the device's configurable properties.
    Props,
    /// Read a property.
    Get {
        /// Property id (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_id)]
        id: u8,
    },
    /// Write a property.
    Set {
        #[arg(value_parser = parse_id)]
        id: u8,
        value: u32,
    },
    /// Round-trip a ping (serspect only).
    Ping,
    /// Start acquisition and print events.
    Monitor {
        /// Stop after this many events (0 = unlimited).
        #[arg(long, default_value_t = 0)]
        count: usize,
        /// Stop after this many seconds (0 = unlimited).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
    /// Write random values to a property and read each one back.
    Stress {
        #[arg(value_parser = parse_id)]
        id: u8,
        #[arg(long, default_value_t = 100)]
        count: u32,
    },
}

/// Parse "0x10" or "16" into a u8.
fn parse_id(s: &str) -> std::result::Result<u8, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).map_err(|e| format!("invalid hex id: {e}")),
        None => s.parse().map_err(|e| format!("invalid id: {e}")),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Device construction
// ---------------------------------------------------------------------------

fn connect_options(cli: &Cli) -> ConnectOptions {
    ConnectOptions {
        port: cli.port.clone(),
        program: cli.program.clone(),
        response_timeout: cli.timeout_ms.map(Duration::from_millis),
        ..Default::default()
    }
}

fn device_kind(cli: &Cli) -> Result<DeviceKind> {
    cli.device
        .context("--device is required (see `spect-test-app list`)")
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    println!("{:<10}  Available", "Device");
    println!("{:-<10}  {:-<9}", "", "");
    for kind in DeviceKind::ALL {
        println!("{:<10}  {}", kind.name(), if kind.is_available() { "yes" } else { "no" });
    }
    Ok(())
}

async fn cmd_info(spect: &dyn Spectrometer) -> Result<()> {
    let info = spect.info();
    println!("Device Information");
    println!("  Driver:         {}", info.driver);
    println!("  Channels:       {}", info.channels);
    println!(
        "  Firmware:       {}",
        if info.fw_version.is_empty() { "n/a" } else { &info.fw_version }
    );
    match info.serial_number {
        Some(serial) => println!("  Serial number:  {serial}"),
        None => println!("  Serial number:  n/a"),
    }
    println!("  State:          {}", spect.state());
    println!("  Properties:     {}", spect.properties().len());
    Ok(())
}

async fn cmd_props(spect: &dyn Spectrometer) -> Result<()> {
    let props = spect.properties();
    if props.is_empty() {
        println!("{} has no configurable properties.", spect.info().driver);
        return Ok(());
    }
    println!("{:<6}  {:<16}  {:>5}  Range", "Id", "Name", "Width");
    for p in props {
        println!(
            "{:<#6x}  {:<16}  {:>5}  {}..{}",
            p.id, p.name, p.width, p.range.start, p.range.end
        );
    }
    Ok(())
}

async fn cmd_get(spect: &dyn Spectrometer, id: u8) -> Result<()> {
    let value = spect.get_prop(id).await?;
    println!("{id:#04x} = {value} ({value:#x})");
    Ok(())
}

async fn cmd_set(spect: &dyn Spectrometer, id: u8, value: u32) -> Result<()> {
    spect.set_prop(id, value).await?;
    println!("{id:#04x} <- {value}");
    Ok(())
}

async fn cmd_ping(cli: &Cli) -> Result<()> {
    let mut builder = SerSpectBuilder::new();
    if let Some(port) = &cli.port {
        builder = builder.serial_port(port);
    }
    if let Some(ms) = cli.timeout_ms {
        builder = builder.response_timeout(Duration::from_millis(ms));
    }
    let spect = builder.build().await?;

    let start = Instant::now();
    let result = spect.ping().await;
    let rtt = start.elapsed();
    spect.close().await.ok();
    result?;
    println!("PONG in {:.3} ms", rtt.as_secs_f64() * 1000.0);
    Ok(())
}

async fn cmd_monitor(spect: &dyn Spectrometer, count: usize, duration_secs: u64) -> Result<()> {
    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
    let limit = if count > 0 { count } else { usize::MAX };

    spect.start().await?;
    println!("Monitoring events (Ctrl-C to stop)...");
    println!("{:<8}  {:>6}  {:>20}  Checksum", "Elapsed", "Value", "Timestamp");

    let started = Instant::now();
    let mut received = 0usize;
    let mut errors = 0usize;
    let mut stream = Box::pin(events(spect).take(limit));

    loop {
        let remaining = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(Ok(event))) => {
                received += 1;
                let elapsed = started.elapsed();
                println!(
                    "{:>4}.{:03}s  {:>6}  {:>20}  {}",
                    elapsed.as_secs(),
                    elapsed.subsec_millis(),
                    event.value,
                    event.timestamp.map(|t| t.to_string()).unwrap_or_default(),
                    match event.checksum_valid {
                        Some(true) => "ok",
                        Some(false) => "BAD",
                        None => "-",
                    }
                );
            }
            Ok(Some(Err(e))) => {
                errors += 1;
                eprintln!("[error] {e}");
            }
            Ok(None) => break,
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                }
                break;
            }
        }
    }
    drop(stream);

    if spect.state() == SessionState::Running {
        spect.end().await?;
    }
    let secs = started.elapsed().as_secs_f64();
    println!();
    println!("  Events:         {received}");
    println!("  Errors:         {errors}");
    if secs > 0.0 {
        println!("  Rate:           {:.1} events/sec", received as f64 / secs);
    }
    Ok(())
}

async fn cmd_stress(spect: &dyn Spectrometer, id: u8, count: u32) -> Result<()> {
    let desc = spect
        .properties()
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .with_context(|| format!("{} has no property {id:#04x}", spect.info().driver))?;
    if desc.range.is_empty() {
        bail!("property {} has an empty range", desc.name);
    }

    let original = spect.get_prop(id).await?;
    println!("Stress test: {count} cycles on {} (currently {original})", desc.name);

    let mut rng = rand::thread_rng();
    let mut failures = 0u32;
    let start = Instant::now();

    for i in 1..=count {
        let target = rng.gen_range(desc.range.clone());
        if let Err(e) = spect.set_prop(id, target).await {
            eprintln!("[{i}/{count}] set failed: {e}");
            failures += 1;
            continue;
        }
        match spect.get_prop(id).await {
            Ok(readback) if readback == target => {}
            Ok(readback) => {
                eprintln!("[{i}/{count}] mismatch: set {target} but read back {readback}");
                failures += 1;
            }
            Err(e) => {
                eprintln!("[{i}/{count}] get failed: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!();
    println!("Results:");
    println!("  Total cycles:   {count}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {elapsed:.3} s");

    if let Err(e) = spect.set_prop(id, original).await {
        eprintln!("Warning: failed to restore {}: {e}", desc.name);
    } else {
        println!("  Restored:       {original}");
    }

    if failures > 0 {
        bail!("{failures} out of {count} stress cycles failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if matches!(cli.command, Command::List) {
        return cmd_list();
    }

    let kind = device_kind(&cli)?;

    // Ping is a SerSpect extension, not part of the common trait.
    if matches!(cli.command, Command::Ping) {
        if kind != DeviceKind::SerSpect {
            bail!("ping is only supported by serspect");
        }
        return cmd_ping(&cli).await;
    }

    let spect = connect(kind, &connect_options(&cli))
        .await
        .with_context(|| format!("connecting to {kind}"))?;

    let result = match &cli.command {
        Command::Info => cmd_info(spect.as_ref()).await,
        Command::Props => cmd_props(spect.as_ref()).await,
        Command::Get { id } => cmd_get(spect.as_ref(), *id).await,
        Command::Set { id, value } => cmd_set(spect.as_ref(), *id, *value).await,
        Command::Monitor { count, duration } => {
            cmd_monitor(spect.as_ref(), *count, *duration).await
        }
        Command::Stress { id, count } => cmd_stress(spect.as_ref(), *id, *count).await,
        Command::List | Command::Ping => Ok(()),
    };

    if let Err(e) = spect.close().await {
        tracing::warn!(error = %e, "close failed");
    }
    result
}
