//! One-shot UDP round trips to the upstream resolver.
//!
//! Every call binds a fresh ephemeral socket, sends the query once and waits
//! for a single reply. The socket is dropped on every exit path. There are no
//! retries: one call, one attempt, one result.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::dns::MAX_DNS_PACKET_SIZE;

/// Default time to wait for the upstream reply.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a forward produced no response.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Forwards raw queries to a single upstream resolver.
#[derive(Debug, Clone)]
pub struct Forwarder {
    upstream: SocketAddr,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(upstream: SocketAddr) -> Self {
        Self::with_timeout(upstream, DEFAULT_UPSTREAM_TIMEOUT)
    }

    pub fn with_timeout(upstream: SocketAddr, timeout: Duration) -> Self {
        Self { upstream, timeout }
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Send `query` upstream and return the first datagram received back.
    ///
    /// The whole round trip (bind, send, receive) is bounded by the timeout.
    pub async fn forward(&self, query: &[u8]) -> Result<Vec<u8>, ForwardError> {
        match tokio::time::timeout(self.timeout, self.round_trip(query)).await {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout(self.timeout)),
        }
    }

    async fn round_trip(&self, query: &[u8]) -> Result<Vec<u8>, ForwardError> {
        let socket = UdpSocket::bind(unspecified_for(self.upstream)).await?;
        socket.connect(self.upstream).await?;
        socket.send(query).await?;

        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
        let len = socket.recv(&mut buf).await?;
        buf.truncate(len);

        Ok(buf)
    }
}

fn unspecified_for(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}
