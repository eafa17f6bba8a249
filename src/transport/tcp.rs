//! TCP transport for the ground-control link

use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::transport::traits::TransportConnector;

/// Connects to a ground-control endpoint over plain TCP
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.address).await?;
        // Status frames are tiny; don't let them sit in Nagle's buffer
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn endpoint(&self) -> String {
        self.address.clone()
    }
}
