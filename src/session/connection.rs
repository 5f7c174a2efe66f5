//! Individual controller session handling

use super::SessionManager;
use crate::command::CommandProcessor;
use anyhow::Result;
use bytes::Bytes;
use metrolink_shared::codec::{self, FrameDecoder};
use metrolink_shared::WireMessage;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Handle to send messages to a specific controller
#[derive(Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub peer: String,
    pub connected_at: Instant,
    writer: Arc<Mutex<BoxedWriter>>,
    tasks: Arc<std::sync::Mutex<JoinSet<()>>>,
}

impl SessionHandle {
    pub fn new<W>(id: u64, peer: String, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer,
            connected_at: Instant::now(),
            writer: Arc::new(Mutex::new(Box::new(writer))),
            tasks: Arc::new(std::sync::Mutex::new(JoinSet::new())),
        }
    }

    /// Send a message to this controller
    pub async fn send(&self, message: &WireMessage) -> Result<()> {
        let encoded = codec::encode(message)?;
        self.send_frame(&encoded).await
    }

    async fn send_frame(&self, frame: &Bytes) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop finished tasks, logging any that panicked
    fn reap_finished(&self, tasks: &mut JoinSet<()>) {
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(session = self.id, error = %e, "session task failed");
            }
        }
    }

    /// Run background work owned by this session
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock_tasks();
        self.reap_finished(&mut tasks);
        tasks.spawn(task);
    }

    /// Number of background tasks still running
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.lock_tasks();
        self.reap_finished(&mut tasks);
        tasks.len()
    }

    /// Wait for every background task spawned so far
    pub async fn join_tasks(&self) {
        let mut tasks = std::mem::take(&mut *self.lock_tasks());

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(session = self.id, error = %e, "session task failed");
            }
        }
    }

    async fn shutdown(&self) {
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(session = self.id, error = %e, "writer shutdown failed");
        }
    }
}

/// Active controller session
pub struct ControllerSession<S> {
    handle: SessionHandle,
    reader: ReadHalf<S>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl<S> ControllerSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Create a new session from a connected stream
    pub fn new(stream: S, id: u64, peer: String) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            handle: SessionHandle::new(id, peer, writer),
            reader,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Get a cloneable handle for sending messages
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Read the next message from this session
    ///
    /// Returns None once the connection is closed or the framing breaks.
    /// Frames whose body is not a valid message are skipped.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        loop {
            // First try to decode from existing buffer
            match self.decoder.decode_next() {
                Ok(Some(body)) => match codec::decode_message(&body) {
                    Ok(message) => return Some(message),
                    Err(e) => {
                        warn!(peer = %self.handle.peer, error = %e, "dropping malformed message");
                        continue;
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    error!(peer = %self.handle.peer, error = %e, "framing error");
                    return None;
                }
            }

            // Read more data
            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return None,
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    error!(peer = %self.handle.peer, error = %e, "read error");
                    return None;
                }
            }
        }
    }
}

/// Serve one controller until it disconnects
///
/// Commands are handled in arrival order. Measurements started by this
/// controller are stopped and awaited before the session is dropped.
pub async fn serve_connection<S>(
    stream: S,
    peer: String,
    processor: Arc<CommandProcessor>,
    sessions: Arc<SessionManager>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut session = ControllerSession::new(stream, sessions.next_id(), peer);
    let handle = session.handle();
    sessions.register(handle.clone()).await;
    info!(session = handle.id, peer = %handle.peer, "controller connected");

    while let Some(message) = session.recv().await {
        processor.handle(&handle, message).await;
    }

    processor.cancel_session(handle.id).await;
    handle.join_tasks().await;
    handle.shutdown().await;
    sessions.unregister(handle.id).await;

    info!(
        session = handle.id,
        peer = %handle.peer,
        duration_ms = handle.connected_at.elapsed().as_millis() as u64,
        "controller disconnected"
    );
}
