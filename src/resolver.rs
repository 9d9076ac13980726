//! DNS query resolution logic.
//!
//! Handles the per-query pipeline:
//! 1. Parse the queried name
//! 2. Filter it against the blocklist
//! 3. Serve a cached response if one exists
//! 4. Otherwise forward upstream, caching a successful reply
//!
//! Transports handle the actual I/O, the resolver handles decisions. Every
//! query ends with a response to send back; failures become SERVFAIL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::ResponseCache;
use crate::dns;
use crate::filter::BlocklistOracle;
use crate::upstream::{ForwardError, Forwarder};

/// How a query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Name is on the blocklist; answered with 0.0.0.0.
    Blocked,
    /// Served from the response cache.
    Cached,
    /// Answered by the upstream resolver.
    Forwarded,
    /// Upstream timed out or errored; answered with SERVFAIL.
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Blocked => "BLOCKED",
            Outcome::Cached => "CACHED",
            Outcome::Forwarded => "FORWARDED",
            Outcome::Failed => "SERVFAIL",
        }
    }
}

/// The reply for one query and how it was produced.
#[derive(Debug)]
pub struct Resolution {
    pub domain: String,
    pub outcome: Outcome,
    pub response: Vec<u8>,
    /// Time spent waiting on upstream, if the query was forwarded.
    pub upstream_elapsed: Option<Duration>,
    /// Present when the outcome is [`Outcome::Failed`].
    pub error: Option<ForwardError>,
}

/// Resolver handles DNS query processing decisions.
///
/// Shared by every in-flight query; the blocklist and cache do their own
/// locking.
pub struct Resolver {
    blocklist: Arc<dyn BlocklistOracle>,
    cache: Arc<ResponseCache>,
    forwarder: Forwarder,
}

impl Resolver {
    pub fn new(
        blocklist: Arc<dyn BlocklistOracle>,
        cache: Arc<ResponseCache>,
        forwarder: Forwarder,
    ) -> Self {
        Self {
            blocklist,
            cache,
            forwarder,
        }
    }

    /// Resolve a raw query into the response to send back.
    pub async fn resolve(&self, query: &[u8]) -> Resolution {
        let domain = dns::parse_domain(query);

        if self.blocklist.is_blocked(&domain) {
            return Resolution {
                domain,
                outcome: Outcome::Blocked,
                response: dns::blocked_response(query),
                upstream_elapsed: None,
                error: None,
            };
        }

        if let Some(response) = self.cache.lookup(query) {
            return Resolution {
                domain,
                outcome: Outcome::Cached,
                response,
                upstream_elapsed: None,
                error: None,
            };
        }

        let start = Instant::now();
        let result = self.forwarder.forward(query).await;
        let upstream_elapsed = Some(start.elapsed());

        match result {
            Ok(response) => {
                self.cache.insert(query, &response);
                Resolution {
                    domain,
                    outcome: Outcome::Forwarded,
                    response,
                    upstream_elapsed,
                    error: None,
                }
            }
            Err(e) => Resolution {
                domain,
                outcome: Outcome::Failed,
                response: dns::servfail_response(query),
                upstream_elapsed,
                error: Some(e),
            },
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn upstream(&self) -> std::net::SocketAddr {
        self.forwarder.upstream()
    }
}
