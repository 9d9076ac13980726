use anyhow::Context;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sinkhole::filter::Blocklist;
use sinkhole::proxy::{self, ProxyConfig};

#[derive(Parser)]
#[command(name = "sinkhole")]
#[command(about = "Blocklist-filtering DNS relay", long_about = None)]
struct Args {
    /// Local port to listen on
    #[arg(short, long, default_value = "53")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Upstream DNS server (host:port)
    #[arg(short, long, default_value = "1.1.1.1:53")]
    upstream: String,

    /// Blocklist file, one domain per line
    #[arg(long, value_name = "FILE", default_value = "blocklist.txt")]
    blocklist: PathBuf,

    /// Log every query (domain, outcome, timing)
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Combine a bare IP (v4 or v6) with the listening port.
fn bind_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    Ok(SocketAddr::new(ip, port))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let bind_addr = bind_addr(&args.bind, args.port)?;
    let upstream: SocketAddr = args
        .upstream
        .parse()
        .with_context(|| format!("invalid upstream address {}", args.upstream))?;

    let blocklist = Blocklist::load(&args.blocklist)?;
    info!(
        path = %args.blocklist.display(),
        domains = blocklist.len(),
        "Loaded blocklist"
    );

    let mut config = ProxyConfig::new(bind_addr, upstream);
    config.verbose = args.verbose;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Shutting down");
        signal_token.cancel();
    });

    proxy::run(config, Arc::new(blocklist), shutdown)
        .await
        .with_context(|| format!("failed to serve on {bind_addr}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_accepts_ipv4_and_ipv6() {
        assert_eq!(
            bind_addr("0.0.0.0", 53).unwrap(),
            "0.0.0.0:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            bind_addr("::", 53).unwrap(),
            "[::]:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(bind_addr("::1", 5353).unwrap().port(), 5353);
    }

    #[test]
    fn bind_addr_rejects_hostnames_and_ports() {
        assert!(bind_addr("localhost", 53).is_err());
        assert!(bind_addr("127.0.0.1:53", 53).is_err());
    }
}
