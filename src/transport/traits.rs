//! Transport trait abstraction for pluggable network backends

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream carrying the ground-control link
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> TransportStream for T {}

/// Factory for establishing transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt one connection, returning a live stream on success
    async fn connect(&self) -> Result<Self::Stream>;

    /// Human-readable endpoint name for log lines
    fn endpoint(&self) -> String;
}
