//! Response cache with per-request eviction
//!
//! Entries are keyed by a digest of the full request body; a secondary index
//! groups keys by request id so a failed public call can drop exactly its own
//! entries.

use dashmap::DashMap;

use crate::recorder::sha256_hex;

#[derive(Default)]
pub struct LlmCache {
    entries: DashMap<String, serde_json::Value>,
    by_request: DashMap<String, Vec<String>>,
}

impl LlmCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a request body.
    pub fn digest(request: &serde_json::Value) -> String {
        sha256_hex(&request.to_string())
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, request_id: &str, key: String, value: serde_json::Value) {
        self.by_request
            .entry(request_id.to_string())
            .or_default()
            .push(key.clone());
        self.entries.insert(key, value);
    }

    /// Remove every entry stored under `request_id`.
    pub fn evict_request(&self, request_id: &str) {
        if let Some((_, keys)) = self.by_request.remove(request_id) {
            for key in keys {
                self.entries.remove(&key);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eviction_is_scoped_to_one_request() {
        let cache = LlmCache::new();
        cache.put("req-a", "key-1".into(), json!("a1"));
        cache.put("req-a", "key-2".into(), json!("a2"));
        cache.put("req-b", "key-3".into(), json!("b1"));

        cache.evict_request("req-a");

        assert!(cache.get("key-1").is_none());
        assert!(cache.get("key-2").is_none());
        assert_eq!(cache.get("key-3"), Some(json!("b1")));
    }

    #[test]
    fn digest_is_stable_for_equal_bodies() {
        let a = json!({"model": "m", "messages": ["x"]});
        let b = json!({"model": "m", "messages": ["x"]});
        assert_eq!(LlmCache::digest(&a), LlmCache::digest(&b));
    }

    #[test]
    fn evicting_unknown_request_is_a_noop() {
        let cache = LlmCache::new();
        cache.put("req-a", "key-1".into(), json!(1));
        cache.evict_request("req-z");
        assert!(!cache.is_empty());
    }
}
