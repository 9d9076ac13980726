//! UDP transport for DNS queries.
//!
//! One listening socket receives queries. Each datagram is handled in its
//! own task, so a slow upstream round trip never stalls other clients. The
//! reply goes back out through the listening socket to the sender.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::dns::{HEADER_LEN, MAX_DNS_PACKET_SIZE};
use crate::resolver::Resolver;
use crate::stats::Stats;

use super::QueryLogger;

/// Default cap on queries being handled at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// UDP transport for the relay.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    in_flight: Arc<Semaphore>,
}

impl UdpTransport {
    /// Bind the listening socket.
    ///
    /// At most `max_in_flight` queries are handled at once; datagrams that
    /// arrive while every slot is taken are dropped.
    pub async fn bind(addr: SocketAddr, max_in_flight: usize) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self {
            socket,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve queries until `shutdown` is cancelled.
    ///
    /// After cancellation no new datagrams are read; handlers already in
    /// flight run to completion (bounded by the upstream timeout) before
    /// this returns.
    pub async fn run(
        self,
        resolver: Arc<Resolver>,
        stats: Arc<Stats>,
        logger: QueryLogger,
        shutdown: CancellationToken,
    ) {
        let tracker = TaskTracker::new();
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

        loop {
            let (len, src) = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "UDP recv error");
                        continue;
                    }
                },
            };

            if len < HEADER_LEN {
                debug!(client = %src, len, "Dropping datagram shorter than a DNS header");
                continue;
            }

            let Ok(permit) = Arc::clone(&self.in_flight).try_acquire_owned() else {
                debug!(client = %src, "In-flight limit reached, dropping query");
                continue;
            };

            let query = buf[..len].to_vec();
            tracker.spawn(handle_query(
                permit,
                Arc::clone(&self.socket),
                Arc::clone(&resolver),
                Arc::clone(&stats),
                logger,
                query,
                src,
            ));
        }

        tracker.close();
        if !tracker.is_empty() {
            info!(in_flight = tracker.len(), "Waiting for in-flight queries");
        }
        tracker.wait().await;
        debug!("UDP transport stopped");
    }
}

/// Resolve one query and send the reply back to `src`.
async fn handle_query(
    _permit: OwnedSemaphorePermit,
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
    stats: Arc<Stats>,
    logger: QueryLogger,
    query: Vec<u8>,
    src: SocketAddr,
) {
    let start_time = Instant::now();
    let resolution = resolver.resolve(&query).await;

    if let Err(e) = socket.send_to(&resolution.response, src).await {
        warn!(client = %src, error = %e, "UDP response error");
    }

    let elapsed = start_time.elapsed();
    stats.record(resolution.outcome, elapsed.as_secs_f64() * 1000.0);
    logger.log(src, &resolution, elapsed);
}
