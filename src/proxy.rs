//! Relay orchestration.
//!
//! Binds the listening socket and runs the three long-lived loops (query
//! handling, cache sweeping, stats reporting) under one shutdown token.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::{DEFAULT_CACHE_TTL, ResponseCache};
use crate::filter::BlocklistOracle;
use crate::resolver::Resolver;
use crate::stats::Stats;
use crate::sweeper::{CacheSweeper, DEFAULT_SWEEP_INTERVAL};
use crate::transport::QueryLogger;
use crate::transport::udp::{DEFAULT_MAX_IN_FLIGHT, UdpTransport};
use crate::upstream::{DEFAULT_UPSTREAM_TIMEOUT, Forwarder};

/// Default interval between stats reports.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the relay.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 0.0.0.0:53)
    pub bind_addr: SocketAddr,
    /// Upstream resolver that receives every non-blocked, uncached query
    pub upstream: SocketAddr,
    /// How long to wait for one upstream reply
    pub upstream_timeout: Duration,
    /// Age at which a cached response is dropped by the sweeper
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    pub stats_interval: Duration,
    /// Queries handled at once; extra datagrams are dropped
    pub max_in_flight: usize,
    /// Log every query at info level
    pub verbose: bool,
}

impl ProxyConfig {
    pub fn new(bind_addr: SocketAddr, upstream: SocketAddr) -> Self {
        Self {
            bind_addr,
            upstream,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stats_interval: DEFAULT_STATS_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            verbose: false,
        }
    }
}

/// A bound relay, ready to serve.
pub struct Proxy {
    config: ProxyConfig,
    transport: UdpTransport,
    resolver: Arc<Resolver>,
    stats: Arc<Stats>,
}

impl Proxy {
    /// Bind the listening socket and build the resolver around `blocklist`.
    pub async fn bind(
        config: ProxyConfig,
        blocklist: Arc<dyn BlocklistOracle>,
    ) -> io::Result<Self> {
        let cache = Arc::new(ResponseCache::with_ttl(config.cache_ttl));
        let forwarder = Forwarder::with_timeout(config.upstream, config.upstream_timeout);
        let resolver = Arc::new(Resolver::new(blocklist, cache, forwarder));
        let transport = UdpTransport::bind(config.bind_addr, config.max_in_flight).await?;

        Ok(Self {
            config,
            transport,
            resolver,
            stats: Arc::new(Stats::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        self.resolver.cache()
    }

    /// Serve until `shutdown` is cancelled, then wait for every loop to exit.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            bind = %self.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            upstream = %self.resolver.upstream(),
            "DNS relay listening"
        );

        let sweeper = CacheSweeper::new(Arc::clone(self.resolver.cache()))
            .with_interval(self.config.sweep_interval)
            .with_cancellation(shutdown.clone());

        let handles = vec![
            tokio::spawn(self.transport.run(
                Arc::clone(&self.resolver),
                Arc::clone(&self.stats),
                QueryLogger::new(self.config.verbose),
                shutdown.clone(),
            )),
            tokio::spawn(sweeper.run()),
            tokio::spawn(report_stats(
                self.stats,
                Arc::clone(self.resolver.cache()),
                self.config.stats_interval,
                shutdown,
            )),
        ];

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Relay task panicked");
            }
        }

        info!("DNS relay stopped");
    }
}

/// Bind and serve with the given configuration until `shutdown` fires.
pub async fn run(
    config: ProxyConfig,
    blocklist: Arc<dyn BlocklistOracle>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let proxy = Proxy::bind(config, blocklist).await?;
    proxy.run(shutdown).await;
    Ok(())
}

async fn report_stats(
    stats: Arc<Stats>,
    cache: Arc<ResponseCache>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = stats.snapshot_and_reset();
                info!(
                    uptime_secs = snapshot.uptime_secs,
                    cache = cache.len(),
                    requests = snapshot.requests,
                    blocked = snapshot.blocked,
                    cached = snapshot.cached,
                    forwarded = snapshot.forwarded,
                    failed = snapshot.failed,
                    avg_response_ms = snapshot.avg_response_ms,
                    "stats"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::MAX_DNS_PACKET_SIZE;
    use crate::dns::tests::build_query;
    use crate::filter::Blocklist;
    use crate::resolver::Outcome;
    use tokio::net::UdpSocket;

    async fn echo_upstream() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
            while let Ok((len, src)) = socket.recv_from(&mut buf).await {
                let mut reply = buf[..len].to_vec();
                reply[2] = 0x81;
                reply[3] = 0x80;
                let _ = socket.send_to(&reply, src).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn config_intervals_reach_the_sweeper() {
        let upstream = echo_upstream().await;
        let mut config = ProxyConfig::new("127.0.0.1:0".parse().unwrap(), upstream);
        config.cache_ttl = Duration::from_millis(50);
        config.sweep_interval = Duration::from_millis(100);
        config.stats_interval = Duration::from_millis(40);
        config.verbose = true;

        let proxy = Proxy::bind(config, Arc::new(Blocklist::new())).await.unwrap();
        let addr = proxy.local_addr().unwrap();
        let cache = Arc::clone(proxy.cache());
        assert_eq!(cache.ttl(), Duration::from_millis(50));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(proxy.run(shutdown.clone()));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&build_query(1, "example.com"), addr)
            .await
            .unwrap();
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
        tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(cache.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn report_stats_resets_counters_each_interval() {
        let stats = Arc::new(Stats::new());
        let shutdown = CancellationToken::new();
        stats.record(Outcome::Forwarded, 1.0);
        stats.record(Outcome::Blocked, 1.0);

        let handle = tokio::spawn(report_stats(
            Arc::clone(&stats),
            Arc::new(ResponseCache::new()),
            Duration::from_millis(30),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(stats.snapshot_and_reset().requests, 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stats reporter did not stop")
            .unwrap();
    }
}
