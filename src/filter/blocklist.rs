//! Blocklist of sinkholed domains.
//!
//! The list file holds one domain per line; blank lines and lines starting
//! with `#` are ignored. Matching is exact on the lowercased name.

use rustc_hash::FxHashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum BlocklistError {
    #[error("failed to read blocklist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A set of blocked domains, safe to query and edit from several tasks.
pub struct Blocklist {
    domains: RwLock<FxHashSet<String>>,
}

impl Blocklist {
    /// Create an empty blocklist.
    pub fn new() -> Self {
        Self {
            domains: RwLock::new(FxHashSet::default()),
        }
    }

    /// Build a blocklist from an iterator of domains.
    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .filter_map(|d| normalize(d.as_ref()))
            .collect();

        Self {
            domains: RwLock::new(domains),
        }
    }

    /// Load a blocklist file.
    ///
    /// A missing file is not an error and yields an empty list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BlocklistError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(BlocklistError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Ok(Self::from_domains(
            contents.lines().filter(|line| !line.trim().starts_with('#')),
        ))
    }

    /// Check if a domain is blocked (case-insensitive exact match).
    pub fn is_blocked(&self, domain: &str) -> bool {
        let Ok(domains) = self.domains.read() else {
            warn!(domain, "Blocklist lock poisoned, treating domain as allowed");
            return false;
        };
        if domain.bytes().any(|b| b.is_ascii_uppercase()) {
            domains.contains(&domain.to_ascii_lowercase())
        } else {
            domains.contains(domain)
        }
    }

    /// Add a domain. Returns `false` if it was empty or already present.
    pub fn add(&self, domain: &str) -> bool {
        let Some(domain) = normalize(domain) else {
            return false;
        };
        self.domains
            .write()
            .map(|mut d| d.insert(domain))
            .unwrap_or(false)
    }

    /// Remove a domain. Returns `false` if it was not present.
    pub fn remove(&self, domain: &str) -> bool {
        let Some(domain) = normalize(domain) else {
            return false;
        };
        self.domains
            .write()
            .map(|mut d| d.remove(&domain))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut domains) = self.domains.write() {
            domains.clear();
        }
    }

    /// All blocked domains, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .domains
            .read()
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        all.sort_unstable();
        all
    }

    /// Returns the number of domains in the blocklist.
    pub fn len(&self) -> usize {
        self.domains.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Blocklist {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(domain: &str) -> Option<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_ascii_lowercase())
}
