//! Controller-side client for one measurement device

use crate::command::{CommandDispatcher, CommandResult, ConsumptionMode, DispatchError};
use crate::connection::{Connection, ConnectionConfig};
use crate::transport::{TransportConnector, TransportStream};
use anyhow::{Context, Result};
use metrolink_shared::CommandType;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Typed command surface over a device connection
pub struct DeviceClient {
    dispatcher: CommandDispatcher,
    connection: Mutex<Connection>,
    config: ConnectionConfig,
}

impl DeviceClient {
    /// Connect through a transport and start the connection tasks
    pub async fn connect<C: TransportConnector>(
        connector: &C,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let stream = connector
            .connect()
            .await
            .with_context(|| format!("{} connect to {} failed", connector.name(), config.address))?;
        info!(transport = connector.name(), address = %config.address, "connected to device");
        Ok(Self::from_stream(stream, config))
    }

    /// Wrap an already established stream
    pub fn from_stream<S: TransportStream>(stream: S, config: ConnectionConfig) -> Self {
        let connection = Connection::spawn(stream, &config);
        let dispatcher = CommandDispatcher::new(
            connection.pending.clone(),
            connection.outbound.clone(),
            connection.connected.clone(),
        );

        Self {
            dispatcher,
            connection: Mutex::new(connection),
            config,
        }
    }

    /// Close the connection; outstanding requests resolve as connection closed
    pub async fn close(&self) {
        self.connection.lock().await.close().await;
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    pub fn pending_count(&self) -> usize {
        self.dispatcher.pending_count()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Send any command with an explicit timeout and consumption mode
    pub async fn send_command(
        &self,
        command: CommandType,
        params: Option<Value>,
        timeout: Duration,
        mode: ConsumptionMode,
    ) -> Result<CommandResult, DispatchError> {
        self.dispatcher.send_command(command, params, timeout, mode).await
    }

    async fn send_blocking(
        &self,
        command: CommandType,
        params: Option<Value>,
    ) -> Result<CommandResult, DispatchError> {
        self.send_command(command, params, self.config.command_timeout, ConsumptionMode::Blocking)
            .await
    }

    /// Switch the stream mode (`continuous`, `trigger` or `snapshot`)
    pub async fn set_mode(&self, mode: &str) -> Result<CommandResult, DispatchError> {
        self.send_blocking(CommandType::SetMode, Some(json!({ "mode": mode })))
            .await
    }

    pub async fn get_mode(&self) -> Result<CommandResult, DispatchError> {
        self.send_blocking(CommandType::GetMode, None).await
    }

    /// Start streaming, optionally requesting a data format
    pub async fn start_stream(&self, format: Option<&str>) -> Result<CommandResult, DispatchError> {
        let params = format.map(|format| json!({ "format": format }));
        self.send_blocking(CommandType::StartStream, params).await
    }

    pub async fn stop_stream(&self) -> Result<CommandResult, DispatchError> {
        self.send_blocking(CommandType::StopStream, None).await
    }

    /// Run a measurement
    ///
    /// `params` carries at least `mode` (`standard`, `quick` or `detailed`)
    /// and optionally `precision`. In non-blocking mode the call returns as
    /// soon as the device accepts the request.
    pub async fn execute_measurement(
        &self,
        params: Value,
        mode: ConsumptionMode,
    ) -> Result<CommandResult, DispatchError> {
        self.send_command(
            CommandType::ExecuteMeasurement,
            Some(params),
            self.config.measurement_timeout,
            mode,
        )
        .await
    }

    /// Interrupt the measurement in progress
    pub async fn stop_measurement(&self) -> Result<CommandResult, DispatchError> {
        self.send_blocking(CommandType::StopMeasurement, None).await
    }

    pub async fn get_status(&self) -> Result<CommandResult, DispatchError> {
        self.send_blocking(CommandType::GetStatus, None).await
    }

    /// Fetch the surface grid produced by the last measurement
    pub async fn get_surface_data(&self) -> Result<CommandResult, DispatchError> {
        self.send_blocking(CommandType::GetSurfaceData, None).await
    }
}
