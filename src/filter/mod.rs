//! Domain filtering.
//!
//! The resolver only needs a yes/no answer for a name; [`BlocklistOracle`]
//! is that seam. [`Blocklist`] is the in-memory implementation loaded from a
//! plain text list.

mod blocklist;

pub use blocklist::{Blocklist, BlocklistError};

/// Answers whether a domain name should be sinkholed.
pub trait BlocklistOracle: Send + Sync {
    fn is_blocked(&self, domain: &str) -> bool;
}

impl BlocklistOracle for Blocklist {
    fn is_blocked(&self, domain: &str) -> bool {
        Blocklist::is_blocked(self, domain)
    }
}
