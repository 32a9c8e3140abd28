//! Print events from any supported spectrometer as they arrive.
//!
//! Builds a running histogram and prints a summary on exit. Defaults to the
//! simulated device so it runs without hardware.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p ieapspect --example monitor_events -- dummy 50
//! RUST_LOG=debug cargo run -p ieapspect --example monitor_events -- serspect 1000
//! ```

use std::time::Duration;

use futures::StreamExt;
use ieapspect::{ConnectOptions, DeviceKind, connect, events};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let kind: DeviceKind = args.next().as_deref().unwrap_or("dummy").parse()?;
    let count: usize = args.next().as_deref().unwrap_or("20").parse()?;

    let opts = ConnectOptions {
        dummy_period: Duration::from_millis(100),
        ..Default::default()
    };
    let spect = connect(kind, &opts).await?;
    let info = spect.info();
    println!(
        "Connected: {} ({} channels, firmware {})",
        info.driver,
        info.channels,
        if info.fw_version.is_empty() { "n/a" } else { &info.fw_version }
    );

    spect.start().await?;

    let mut histogram = vec![0u64; info.channels as usize + 1];
    let mut stream = Box::pin(events(spect.as_ref()).take(count));
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                println!("{:>6}  ts={:?}", event.value, event.timestamp);
                if let Some(bin) = histogram.get_mut(event.value as usize) {
                    *bin += 1;
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    drop(stream);

    spect.end().await?;
    spect.close().await?;

    let total: u64 = histogram.iter().sum();
    let peak = histogram
        .iter()
        .enumerate()
        .max_by_key(|(_, n)| **n)
        .map(|(ch, _)| ch)
        .unwrap_or(0);
    println!("\n{total} events, most populated channel {peak}");
    Ok(())
}
