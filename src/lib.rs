//! Sinkhole - a blocklist-filtering DNS relay.
//!
//! Queries for blocked names are answered locally with 0.0.0.0, everything
//! else is served from a short-lived response cache or forwarded to a single
//! upstream resolver.

pub mod cache;
pub mod dns;
pub mod filter;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod sweeper;
pub mod transport;
pub mod upstream;
