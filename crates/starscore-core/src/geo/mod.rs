//! Client address to location resolution.
//!
//! Resolution walks a chain of [`LocationSource`]s and the first one that
//! recognizes the address wins:
//!
//! 1. [`LoopbackSource`] - `unknown` and loopback forms resolve to a fixed
//!    "local" location.
//! 2. [`PrivateNetworkSource`] - private and link-local ranges resolve to a
//!    fixed "private network" location.
//! 3. [`CidrTable`] - a small built-in prefix table, matched at whole-octet
//!    granularity.
//! 4. [`OctetHeuristic`] - a best-effort placeholder derived from the first
//!    octet. Its output is **not** geographically accurate.
//!
//! `resolve` never fails: any [`ResolutionError`] degrades to
//! [`GeoLocation::unknown`]. Successful resolutions are memoized in a
//! [`LocationCache`].

mod cache;
mod sources;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use cache::{ConcurrentLocationCache, LocationCache};
pub use sources::{CidrTable, LoopbackSource, OctetHeuristic, PrivateNetworkSource};

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
}

impl GeoLocation {
    pub fn new(
        country: impl Into<String>,
        region: impl Into<String>,
        city: impl Into<String>,
        isp: impl Into<String>,
    ) -> Self {
        Self {
            country: country.into(),
            region: region.into(),
            city: city.into(),
            isp: isp.into(),
        }
    }

    /// The machine itself.
    #[must_use]
    pub fn local() -> Self {
        Self::new("local", "local", "local", "local")
    }

    /// Any private or link-local network.
    #[must_use]
    pub fn private_network() -> Self {
        Self::new("private", "private network", "private network", "intranet")
    }

    /// Returned when resolution fails.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN)
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("unparseable address: {0}")]
    Unparseable(String),

    #[error("no location source matched {0}")]
    NoMatch(String),
}

/// One step of the resolution chain.
pub trait LocationSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` passes the address on to the next source.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` when the address cannot be interpreted at all.
    fn lookup(&self, address: &str) -> Result<Option<GeoLocation>, ResolutionError>;

    /// Number of static entries this source carries.
    fn table_size(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoStats {
    pub cache_size: usize,
    pub builtin_ranges: usize,
}

pub struct GeoResolver {
    sources: Vec<Box<dyn LocationSource>>,
    cache: Box<dyn LocationCache>,
}

impl GeoResolver {
    pub fn new(sources: Vec<Box<dyn LocationSource>>, cache: Box<dyn LocationCache>) -> Self {
        Self { sources, cache }
    }

    /// Default chain with the built-in table. `cache_capacity` of 0 disables
    /// eviction.
    #[must_use]
    pub fn builtin(cache_capacity: usize) -> Self {
        Self::new(
            vec![
                Box::new(LoopbackSource),
                Box::new(PrivateNetworkSource),
                Box::new(CidrTable::builtin()),
                Box::new(OctetHeuristic),
            ],
            Box::new(ConcurrentLocationCache::new(cache_capacity)),
        )
    }

    /// Resolves `address`, falling back to [`GeoLocation::unknown`] on error.
    pub fn resolve(&self, address: &str) -> GeoLocation {
        if let Some(hit) = self.cache.get(address) {
            return hit;
        }

        match self.lookup(address) {
            Ok(location) => {
                self.cache.insert(address.to_string(), location.clone());
                location
            }
            Err(e) => {
                debug!(address, error = %e, "Geolocation degraded to unknown");
                GeoLocation::unknown()
            }
        }
    }

    /// Resolves each distinct address once.
    pub fn resolve_batch<'a, I>(&self, addresses: I) -> HashMap<String, GeoLocation>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut results = HashMap::new();
        for address in addresses {
            if !results.contains_key(address) {
                results.insert(address.to_string(), self.resolve(address));
            }
        }
        results
    }

    #[must_use]
    pub fn stats(&self) -> GeoStats {
        GeoStats {
            cache_size: self.cache.len(),
            builtin_ranges: self.sources.iter().map(|s| s.table_size()).sum(),
        }
    }

    fn lookup(&self, address: &str) -> Result<GeoLocation, ResolutionError> {
        for source in &self.sources {
            if let Some(location) = source.lookup(address)? {
                debug!(address, source = source.name(), "Geolocation resolved");
                return Ok(location);
            }
        }
        Err(ResolutionError::NoMatch(address.to_string()))
    }
}

impl Default for GeoResolver {
    fn default() -> Self {
        Self::builtin(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingSource(Arc<AtomicUsize>);

    impl LocationSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn lookup(&self, _address: &str) -> Result<Option<GeoLocation>, ResolutionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some(GeoLocation::new("Testland", "r", "c", "i")))
        }
    }

    #[test]
    fn loopback_and_private_sentinels_differ() {
        let resolver = GeoResolver::default();
        let local = resolver.resolve("127.0.0.1");
        let private = resolver.resolve("192.168.1.1");

        assert_eq!(local, GeoLocation::local());
        assert_eq!(private, GeoLocation::private_network());
        assert_ne!(local, private);
    }

    #[test]
    fn garbage_degrades_to_unknown() {
        let resolver = GeoResolver::default();
        assert_eq!(resolver.resolve("definitely not an ip"), GeoLocation::unknown());
        assert_eq!(resolver.resolve("2001:db8::1"), GeoLocation::unknown());
    }

    #[test]
    fn degraded_results_are_not_cached() {
        let resolver = GeoResolver::default();
        resolver.resolve("garbage");
        assert_eq!(resolver.stats().cache_size, 0);
    }

    #[test]
    fn resolve_is_idempotent() {
        let resolver = GeoResolver::default();
        for address in ["8.8.8.8", "10.0.0.1", "1.0.1.9", "::1"] {
            assert_eq!(resolver.resolve(address), resolver.resolve(address));
        }
    }

    #[test]
    fn cache_prevents_repeat_lookups() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = GeoResolver::new(
            vec![Box::new(CountingSource(Arc::clone(&calls)))],
            Box::new(ConcurrentLocationCache::default()),
        );

        resolver.resolve("203.0.113.1");
        resolver.resolve("203.0.113.1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_resolves_each_address_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = GeoResolver::new(
            vec![Box::new(CountingSource(Arc::clone(&calls)))],
            Box::new(ConcurrentLocationCache::default()),
        );

        let results = resolver.resolve_batch(["1.1.1.1", "2.2.2.2", "1.1.1.1"]);
        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stats_report_builtin_table() {
        let resolver = GeoResolver::default();
        resolver.resolve("8.8.8.8");
        let stats = resolver.stats();
        assert_eq!(stats.builtin_ranges, 8);
        assert_eq!(stats.cache_size, 1);
    }

    #[test]
    fn shared_between_threads() {
        let resolver = Arc::new(GeoResolver::builtin(64));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || resolver.resolve(&format!("{}.1.1.1", i + 1)))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().country, "China");
        }
        assert_eq!(resolver.stats().cache_size, 8);
    }
}
