//! Per-run result cache.
//!
//! Each unique IP is looked up once per run; the cache maps it to its record
//! so results can be fanned back out to every row that mentioned the IP.
//! Nothing outlives the run.

use crate::normalize::ResultRecord;
use std::collections::HashMap;

/// Results of the current run, keyed by IP.
#[derive(Debug, Default, Clone)]
pub struct RunCache {
    results: HashMap<String, ResultRecord>,
}

impl RunCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for `ip`, if it was looked up.
    pub fn get(&self, ip: &str) -> Option<&ResultRecord> {
        self.results.get(ip)
    }

    /// Store the record for its IP.
    pub fn insert(&mut self, record: ResultRecord) {
        self.results.insert(record.ip.clone(), record);
    }

    /// Record for `ip`, or an unavailable record if it was never looked up.
    pub fn record_for(&self, ip: &str) -> ResultRecord {
        self.get(ip)
            .cloned()
            .unwrap_or_else(|| ResultRecord::unavailable(ip))
    }

    /// Number of IPs that produced no usable reply.
    pub fn unavailable_count(&self) -> usize {
        self.results.values().filter(|r| r.is_unavailable()).count()
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(ip: &str) -> ResultRecord {
        ResultRecord {
            ip: ip.to_string(),
            raw: "{}".to_string(),
            risks: "VPN".to_string(),
            ip_type: "DATACENTER".to_string(),
            geolocation: "NL".to_string(),
        }
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = RunCache::new();
        cache.insert(found("192.168.1.1"));

        let result = cache.get("192.168.1.1").unwrap();
        assert_eq!(result.risks, "VPN");
        assert!(cache.get("10.0.0.1").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache = RunCache::new();
        assert!(cache.get("192.168.1.1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_for_missing_is_unavailable() {
        let cache = RunCache::new();
        assert_eq!(cache.record_for(""), ResultRecord::unavailable(""));
        assert_eq!(cache.record_for("1.1.1.1").raw, "N/A");
    }

    #[test]
    fn test_insert_replaces() {
        let mut cache = RunCache::new();
        cache.insert(ResultRecord::unavailable("1.1.1.1"));
        cache.insert(found("1.1.1.1"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.record_for("1.1.1.1"), found("1.1.1.1"));
    }

    #[test]
    fn test_unavailable_count() {
        let mut cache = RunCache::new();
        cache.insert(found("1.1.1.1"));
        cache.insert(ResultRecord::unavailable("2.2.2.2"));
        cache.insert(ResultRecord::unavailable("3.3.3.3"));
        assert_eq!(cache.unavailable_count(), 2);
    }
}
