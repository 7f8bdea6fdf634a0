//! Hostname cache for the resolver.
//!
//! Stores the full resolved address set per hostname with TTL-based
//! expiry. A fresh resolution overwrites the entry for its hostname —
//! results are never merged. The cache is consulted before any network
//! I/O is attempted for a repeated hostname.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::addr::{IpVersion, SocketAddress};

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of hostnames held; the oldest entry is evicted
    /// at capacity.
    pub max_entries: usize,
    /// Floor applied to record TTLs.
    pub min_ttl: Duration,
    /// Ceiling applied to record TTLs.
    pub max_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 16,
            min_ttl: Duration::from_secs(60),
            max_ttl: Duration::from_secs(86400),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    addresses: Vec<SocketAddress>,
    expires_at: Instant,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe hostname → address-set cache.
#[derive(Debug)]
pub(crate) struct DnsCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    config: CacheConfig,
}

impl DnsCache {
    pub(crate) fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns the cached addresses for `hostname` matching `version`,
    /// or `None` on a miss (absent, expired, or no matching version).
    pub(crate) fn get(&self, hostname: &str, version: IpVersion) -> Option<Vec<SocketAddress>> {
        let entries = self.entries.lock();
        let entry = entries.get(hostname)?;
        if entry.is_expired() {
            return None;
        }
        let matching: Vec<SocketAddress> = entry
            .addresses
            .iter()
            .filter(|a| a.version() == version)
            .copied()
            .collect();
        if matching.is_empty() {
            None
        } else {
            Some(matching)
        }
    }

    /// Stores a fresh resolution, overwriting any prior entry.
    pub(crate) fn put(&self, hostname: &str, addresses: Vec<SocketAddress>, ttl: Duration) {
        if addresses.is_empty() {
            return;
        }
        let ttl = ttl.clamp(self.config.min_ttl, self.config.max_ttl);
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.len() >= self.config.max_entries && !entries.contains_key(hostname) {
            entries.retain(|_, entry| !entry.is_expired());
            if entries.len() >= self.config.max_entries {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(key, _)| key.clone())
                {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            hostname.to_string(),
            CacheEntry {
                addresses,
                expires_at: now + ttl,
                inserted_at: now,
            },
        );
    }

    /// Drops every entry.
    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(a: u8) -> Vec<SocketAddress> {
        vec![SocketAddress::v4(192, 0, 2, a, 0)]
    }

    #[test]
    fn hit_after_put_miss_after_clear() {
        let cache = DnsCache::new(CacheConfig::default());
        assert!(cache.get("example.com", IpVersion::V4).is_none());
        cache.put("example.com", one(1), Duration::from_secs(300));
        assert_eq!(cache.get("example.com", IpVersion::V4).unwrap(), one(1));
        cache.clear();
        assert!(cache.get("example.com", IpVersion::V4).is_none());
    }

    #[test]
    fn refresh_overwrites_not_merges() {
        let cache = DnsCache::new(CacheConfig::default());
        cache.put("example.com", one(1), Duration::from_secs(300));
        cache.put("example.com", one(2), Duration::from_secs(300));
        assert_eq!(cache.get("example.com", IpVersion::V4).unwrap(), one(2));
    }

    #[test]
    fn version_filter_misses() {
        let cache = DnsCache::new(CacheConfig::default());
        cache.put("example.com", one(1), Duration::from_secs(300));
        assert!(cache.get("example.com", IpVersion::V6).is_none());
    }

    #[test]
    fn short_ttl_expires() {
        let config = CacheConfig {
            min_ttl: Duration::from_millis(1),
            ..CacheConfig::default()
        };
        let cache = DnsCache::new(config);
        cache.put("example.com", one(1), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("example.com", IpVersion::V4).is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let config = CacheConfig {
            max_entries: 2,
            ..CacheConfig::default()
        };
        let cache = DnsCache::new(config);
        cache.put("a.example", one(1), Duration::from_secs(300));
        std::thread::sleep(Duration::from_millis(2));
        cache.put("b.example", one(2), Duration::from_secs(300));
        std::thread::sleep(Duration::from_millis(2));
        cache.put("c.example", one(3), Duration::from_secs(300));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a.example", IpVersion::V4).is_none());
        assert!(cache.get("c.example", IpVersion::V4).is_some());
    }

    #[test]
    fn stores_full_result_set() {
        let cache = DnsCache::new(CacheConfig::default());
        let set = vec![
            SocketAddress::v4(192, 0, 2, 1, 0),
            SocketAddress::v4(192, 0, 2, 2, 0),
            SocketAddress::v4(192, 0, 2, 3, 0),
        ];
        cache.put("multi.example", set.clone(), Duration::from_secs(60));
        assert_eq!(cache.get("multi.example", IpVersion::V4).unwrap(), set);
    }
}
