//! In-process transport backed by `tokio::io::duplex`

use crate::transport::traits::TransportStream;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::DuplexStream;

#[async_trait]
impl TransportStream for DuplexStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// Connected pair of in-memory streams: (controller side, device side)
pub fn pair(buffer: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(buffer)
}
