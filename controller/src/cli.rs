//! Command-line front end shared by one-shot and interactive use

use crate::{CommandResult, ConsumptionMode, DeviceClient};
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Commands accepted both on the command line and inside the shell
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Set the stream mode (continuous, trigger, snapshot)
    SetMode { mode: String },
    /// Show the current stream mode
    GetMode,
    /// Start streaming
    StartStream {
        #[arg(long)]
        format: Option<String>,
    },
    /// Stop streaming
    StopStream,
    /// Run a measurement (standard, quick, detailed)
    Measure {
        #[arg(default_value = "standard")]
        mode: String,
        #[arg(long)]
        precision: Option<String>,
        /// Return as soon as the device accepts the request
        ///
        /// The device stops a measurement when its controller disconnects,
        /// so this is only useful inside `shell`.
        #[arg(long)]
        no_wait: bool,
    },
    /// Interrupt the running measurement
    StopMeasurement,
    /// Show device status
    Status,
    /// Fetch surface data from the last measurement
    Surface,
}

/// One line typed into the shell
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: DeviceCommand,
}

/// Send one command and wait according to its consumption mode
pub async fn run_command(client: &DeviceClient, command: DeviceCommand) -> Result<CommandResult> {
    let result = match command {
        DeviceCommand::SetMode { mode } => client.set_mode(&mode).await?,
        DeviceCommand::GetMode => client.get_mode().await?,
        DeviceCommand::StartStream { format } => client.start_stream(format.as_deref()).await?,
        DeviceCommand::StopStream => client.stop_stream().await?,
        DeviceCommand::Measure {
            mode,
            precision,
            no_wait,
        } => {
            let mut params = json!({ "mode": mode });
            if let Some(precision) = precision {
                params["precision"] = json!(precision);
            }
            let consumption = if no_wait {
                ConsumptionMode::NonBlocking
            } else {
                ConsumptionMode::Blocking
            };
            client.execute_measurement(params, consumption).await?
        }
        DeviceCommand::StopMeasurement => client.stop_measurement().await?,
        DeviceCommand::Status => client.get_status().await?,
        DeviceCommand::Surface => client.get_surface_data().await?,
    };
    Ok(result)
}

/// Read commands line by line over a single connection
///
/// The connection stays open between lines, so a measurement started with
/// `measure --no-wait` keeps running and can be stopped later. Ends on
/// `quit`, `exit` or end of input. Returns the number of commands sent.
pub async fn run_shell<R, W>(client: &DeviceClient, input: R, mut output: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        let parsed = match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e) => {
                output.write_all(e.render().to_string().as_bytes()).await?;
                continue;
            }
        };

        if !client.is_connected() {
            output.write_all(b"error: connection to device lost\n").await?;
            break;
        }

        debug!(command = ?parsed.command, "shell command");
        sent += 1;
        match run_command(client, parsed.command).await {
            Ok(result) => {
                let rendered = serde_json::to_string_pretty(&result)?;
                output.write_all(rendered.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            Err(e) => {
                output.write_all(format!("error: {e:#}\n").as_bytes()).await?;
            }
        }
        output.flush().await?;
    }

    info!(commands = sent, "shell finished");
    Ok(sent)
}
