use anyhow::Result;
use clap::Parser;
use metrolink_device::{DeviceServer, ProcessorConfig};
use metrolink_shared::timing;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Simulated Metrolink measurement device
#[derive(Parser, Debug)]
#[command(name = "metrolink-device")]
#[command(about = "Serve measurement commands over TCP")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value_t = format!("0.0.0.0:{}", timing::DEFAULT_DEVICE_PORT))]
    listen: String,

    /// Device identifier reported in status
    #[arg(long, default_value = "DEV12345")]
    device_id: String,

    /// Stop-signal poll interval in milliseconds
    #[arg(long, default_value_t = timing::STOP_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    /// Share of measurements that end in a device-side timeout
    #[arg(long, default_value_t = timing::TIMEOUT_INJECTION_RATE)]
    timeout_rate: f64,

    /// Report the device as not calibrated
    #[arg(long)]
    uncalibrated: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = ProcessorConfig {
        device_id: args.device_id,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        timeout_injection_rate: args.timeout_rate,
        calibrated: !args.uncalibrated,
        ..Default::default()
    };

    info!(
        device_id = %config.device_id,
        firmware = %config.firmware_version,
        "device starting"
    );

    let server = DeviceServer::bind(&args.listen, config).await?;
    server.run().await
}
