//! Client-facing transport for the relay.
//!
//! Only UDP is served. The transport receives queries, hands them to the
//! [`Resolver`](crate::resolver::Resolver) and sends back whatever it
//! decides.

pub mod udp;

use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::resolver::Resolution;

macro_rules! query_event {
    ($level:ident, $client:expr, $resolution:expr, $total_ms:expr, $upstream_ms:expr) => {
        $level!(
            domain = %$resolution.domain,
            client = %$client,
            outcome = $resolution.outcome.as_str(),
            total_ms = $total_ms,
            upstream_ms = $upstream_ms,
            "query"
        )
    };
}

/// Logger for DNS query events.
///
/// Verbose mode logs every query at `info`; otherwise query lines are only
/// visible at `debug`. Upstream failures are always logged at `warn`.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogger {
    verbose: bool,
}

impl QueryLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn log(&self, client: SocketAddr, resolution: &Resolution, elapsed: Duration) {
        if let Some(error) = &resolution.error {
            warn!(
                domain = %resolution.domain,
                client = %client,
                error = %error,
                "Upstream failed, answering SERVFAIL"
            );
        }

        let total_ms = round_ms(elapsed);
        let upstream_ms = resolution.upstream_elapsed.map(round_ms).unwrap_or(0.0);

        if self.verbose {
            query_event!(info, client, resolution, total_ms, upstream_ms);
        } else {
            query_event!(debug, client, resolution, total_ms, upstream_ms);
        }
    }
}

/// Milliseconds with microsecond precision.
fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1_000_000.0).round() / 1000.0
}
