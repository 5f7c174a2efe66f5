//! Command-line controller for a Metrolink measurement device

use anyhow::Result;
use clap::{Parser, Subcommand};
use metrolink_controller::cli::{self, DeviceCommand};
use metrolink_controller::transport::TcpConnector;
use metrolink_controller::{ConnectionConfig, DeviceClient};
use metrolink_shared::timing;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Metrolink controller
#[derive(Parser, Debug)]
#[command(name = "metrolink-controller")]
#[command(about = "Send commands to a Metrolink measurement device")]
struct Args {
    /// Device address
    #[arg(short, long, default_value_t = format!("127.0.0.1:{}", timing::DEFAULT_DEVICE_PORT))]
    addr: String,

    /// Timeout for instantaneous commands in milliseconds
    #[arg(long, default_value_t = timing::COMMAND_TIMEOUT_MS)]
    command_timeout_ms: u64,

    /// Timeout for measurements in milliseconds
    #[arg(long, default_value_t = timing::LONG_COMMAND_TIMEOUT_MS)]
    measurement_timeout_ms: u64,

    #[command(subcommand)]
    command: Invocation,
}

#[derive(Subcommand, Debug)]
enum Invocation {
    /// Keep one connection open and read commands from stdin
    Shell,
    #[command(flatten)]
    Device(DeviceCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = ConnectionConfig {
        address: args.addr.clone(),
        command_timeout: Duration::from_millis(args.command_timeout_ms),
        measurement_timeout: Duration::from_millis(args.measurement_timeout_ms),
        ..Default::default()
    };

    let connector = TcpConnector::new(config.address.clone(), config.connect_timeout);
    let client = DeviceClient::connect(&connector, config).await?;

    let command = match args.command {
        Invocation::Shell => {
            let outcome =
                cli::run_shell(&client, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;
            client.close().await;
            outcome?;
            return Ok(());
        }
        Invocation::Device(command) => command,
    };

    let result = cli::run_command(&client, command).await;
    client.close().await;
    let result = result?;

    info!(
        command = %result.command_type,
        completed = result.completed,
        timed_out = result.timed_out,
        "command finished"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
