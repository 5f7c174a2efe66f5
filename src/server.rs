//! TCP accept loop for the device

use crate::command::{CommandProcessor, ProcessorConfig};
use crate::session::{serve_connection, SessionManager};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

/// Listens for controllers and serves each connection on its own task
pub struct DeviceServer {
    listener: TcpListener,
    processor: Arc<CommandProcessor>,
    sessions: Arc<SessionManager>,
}

impl DeviceServer {
    /// Bind the listening socket
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: ProcessorConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind device listener")?;
        Ok(Self {
            listener,
            processor: Arc::new(CommandProcessor::new(config)),
            sessions: Arc::new(SessionManager::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn processor(&self) -> Arc<CommandProcessor> {
        self.processor.clone()
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "device listening");

        loop {
            let (socket, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            if let Err(e) = socket.set_nodelay(true) {
                error!(peer = %addr, error = %e, "failed to set TCP_NODELAY");
            }

            tokio::spawn(serve_connection(
                socket,
                addr.to_string(),
                self.processor.clone(),
                self.sessions.clone(),
            ));
        }
    }
}
