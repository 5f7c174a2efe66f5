//! Connection tasks: one I/O loop and one routing loop per device

use crate::command::{PendingTable, ResponseRouter};
use crate::transport::TransportStream;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use metrolink_shared::codec::FrameDecoder;
use metrolink_shared::timing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Reason handed to every request still pending when the connection ends
pub const CONNECTION_CLOSED: &str = "Connection closed";

/// Configuration for a device connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Device address (host:port)
    pub address: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Caller timeout for instantaneous commands
    pub command_timeout: Duration,
    /// Caller timeout for measurements
    pub measurement_timeout: Duration,
    /// Outbound frame queue depth
    pub outbound_capacity: usize,
    /// Inbound frame queue depth between the I/O loop and the router
    pub inbound_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", timing::DEFAULT_DEVICE_PORT),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_millis(timing::COMMAND_TIMEOUT_MS),
            measurement_timeout: Duration::from_millis(timing::LONG_COMMAND_TIMEOUT_MS),
            outbound_capacity: 64,
            inbound_capacity: 256,
        }
    }
}

/// Live connection state shared with the dispatcher
pub struct Connection {
    pub outbound: mpsc::Sender<Bytes>,
    pub connected: Arc<AtomicBool>,
    pub pending: Arc<PendingTable>,
    shutdown: Option<oneshot::Sender<()>>,
    io_task: Option<JoinHandle<()>>,
    router_task: Option<JoinHandle<()>>,
}

impl Connection {
    /// Start the I/O and routing tasks over an established stream
    pub fn spawn<S: TransportStream>(stream: S, config: &ConnectionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(config.outbound_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(config.inbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let connected = Arc::new(AtomicBool::new(true));
        let pending = Arc::new(PendingTable::new());

        let io_task = tokio::spawn(io_loop(stream, outbound_rx, inbound_tx, shutdown_rx, connected.clone()));
        let router_task = tokio::spawn(route_loop(ResponseRouter::new(pending.clone()), pending.clone(), inbound_rx));

        Self {
            outbound: outbound_tx,
            connected,
            pending,
            shutdown: Some(shutdown_tx),
            io_task: Some(io_task),
            router_task: Some(router_task),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop the I/O loop and wait until every pending request is resolved
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.io_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "connection task failed");
            }
        }
        if let Some(task) = self.router_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "router task failed");
            }
        }
    }
}

/// Shuttle frames between the stream and the channels until either side ends
async fn io_loop<S: TransportStream>(
    stream: S,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    inbound_tx: mpsc::Sender<Bytes>,
    shutdown_rx: oneshot::Receiver<()>,
    connected: Arc<AtomicBool>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    match pump(&mut reader, &mut writer, &mut outbound_rx, &inbound_tx, shutdown_rx).await {
        Ok(()) => info!("connection closed locally"),
        Err(e) => error!(error = %e, "connection ended"),
    }

    connected.store(false, Ordering::SeqCst);
    outbound_rx.close();
    drop(inbound_tx);

    let mut stream = reader.unsplit(writer);
    if let Err(e) = TransportStream::shutdown(&mut stream).await {
        debug!(error = %e, "transport shutdown failed");
    }
}

async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    outbound_rx: &mut mpsc::Receiver<Bytes>,
    inbound_tx: &mpsc::Sender<Bytes>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => return Ok(()),

            // Send outbound frames
            Some(frame) = outbound_rx.recv() => {
                writer.write_all(&frame).await.context("write error")?;
                writer.flush().await.context("flush error")?;
            }

            // Read incoming frames
            result = reader.read(&mut read_buf) => {
                let n = result.context("read error")?;
                if n == 0 {
                    return Err(anyhow!("device closed connection"));
                }
                decoder.extend(&read_buf[..n]);

                while let Some(body) = decoder.decode_next()? {
                    if inbound_tx.send(body).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Route every received frame, then resolve whatever is still pending
async fn route_loop(
    router: ResponseRouter,
    pending: Arc<PendingTable>,
    mut inbound_rx: mpsc::Receiver<Bytes>,
) {
    while let Some(body) = inbound_rx.recv().await {
        router.route_frame(&body);
    }

    let drained = pending.drain_all(CONNECTION_CLOSED);
    if drained > 0 {
        info!(drained, "resolved pending requests on connection close");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandDispatcher, ConsumptionMode};
    use crate::transport::memory;
    use metrolink_shared::{codec, CommandType, WireMessage};

    async fn read_request<R: tokio::io::AsyncRead + Unpin>(device: &mut R) -> WireMessage {
        let len = device.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        device.read_exact(&mut body).await.unwrap();
        codec::decode_message(&body).unwrap()
    }

    #[tokio::test]
    async fn test_peer_close_drains_pending() {
        let (local, mut device) = memory::pair(4096);
        let connection = Connection::spawn(local, &ConnectionConfig::default());
        let dispatcher = CommandDispatcher::new(
            connection.pending.clone(),
            connection.outbound.clone(),
            connection.connected.clone(),
        );

        let device_task = tokio::spawn(async move {
            let request = read_request(&mut device).await;
            assert_eq!(request.command.as_deref(), Some("executeMeasurement"));
            // Hang up without answering
            drop(device);
        });

        let result = dispatcher
            .send_command(
                CommandType::ExecuteMeasurement,
                None,
                Duration::from_secs(5),
                ConsumptionMode::Blocking,
            )
            .await
            .unwrap();
        device_task.await.unwrap();

        assert!(!result.completed);
        assert!(!result.timed_out);
        assert_eq!(result.error_message.as_deref(), Some(CONNECTION_CLOSED));
        assert!(connection.pending.is_empty());
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_frames_before_close_are_routed() {
        let (local, mut device) = memory::pair(4096);
        let connection = Connection::spawn(local, &ConnectionConfig::default());
        let dispatcher = CommandDispatcher::new(
            connection.pending.clone(),
            connection.outbound.clone(),
            connection.connected.clone(),
        );

        let device_task = tokio::spawn(async move {
            let request = read_request(&mut device).await;
            let id = request.request_id.unwrap();
            let reply = WireMessage::success("getMode", &id, Some(serde_json::json!({"mode": "snapshot"})));
            device.write_all(&codec::encode(&reply).unwrap()).await.unwrap();
            // Close straight after the reply; it must still win over the drain
            drop(device);
        });

        let result = dispatcher
            .send_command(
                CommandType::GetMode,
                None,
                Duration::from_secs(5),
                ConsumptionMode::Blocking,
            )
            .await
            .unwrap();
        device_task.await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.payload["mode"], "snapshot");
    }

    #[tokio::test]
    async fn test_local_close_is_idempotent() {
        let (local, _device) = memory::pair(4096);
        let mut connection = Connection::spawn(local, &ConnectionConfig::default());

        connection.close().await;
        connection.close().await;

        assert!(!connection.is_connected());
        assert!(connection.outbound.is_closed());
    }
}
