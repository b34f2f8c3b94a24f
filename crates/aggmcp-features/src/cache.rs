//! Result Cache (spec §4.7). Keyed by tool name plus canonical-JSON
//! arguments; size-bounded with insertion-order eviction; lazy expiration
//! on get plus a periodic sweep. Wired into the Router's `tools/call`
//! path per SPEC_FULL.md §9 ("the cache *is* wired in").

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

/// Tool-name prefixes that make a tool eligible for caching — read-only
/// shapes only (spec §4.7).
const CACHEABLE_PREFIXES: &[&str] = &["read_", "list_", "get_", "search_", "find_", "fetch_"];

/// Side-effecting tools that must never be cached even if they happen to
/// match a cacheable prefix.
const DENY_LIST: &[&str] = &["git_commit", "deploy", "deploy_now"];

/// Whether `tool_name` (the unnamespaced original name) is eligible for
/// caching: must match a read-only prefix and must not be on the deny
/// list.
#[must_use]
pub fn is_cacheable(tool_name: &str) -> bool {
    if DENY_LIST.iter().any(|deny| tool_name == *deny) {
        return false;
    }
    if tool_name.starts_with("write_") || tool_name.starts_with("delete_") {
        return false;
    }
    CACHEABLE_PREFIXES.iter().any(|prefix| tool_name.starts_with(prefix))
}

struct Entry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

/// Build the cache key: tool name plus a canonical (key-sorted) JSON
/// rendering of its arguments, so argument-order differences don't
/// fragment the cache.
#[must_use]
pub fn cache_key(tool_name: &str, arguments: &Value) -> String {
    format!("{tool_name}:{}", canonicalize(arguments))
}

fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// Bounded, TTL-expiring cache of tool-call results.
pub struct ResultCache {
    max_size: usize,
    default_ttl: Duration,
    entries: Mutex<IndexMap<String, Entry>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl ResultCache {
    #[must_use]
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            entries: Mutex::new(IndexMap::new()),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Look up a cached result. Lazily evicts the entry first if it has
    /// expired (spec §4.7: "expiration both lazy (on get)").
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.shift_remove(key);
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            }
            Some(entry) => {
                entry.hits += 1;
                self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a value with this cache's default TTL, evicting the oldest
    /// entry first if the cache is at capacity (insertion-order eviction).
    pub fn put(&self, key: String, value: Value) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    pub fn put_with_ttl(&self, key: String, value: Value, ttl: Duration) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            entries.shift_remove_index(0);
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
                hits: 0,
            },
        );
    }

    /// Periodic sweep: remove every entry that has expired, regardless of
    /// whether it's been read since (spec §4.7: "periodic (sweep)").
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(std::sync::atomic::Ordering::Relaxed);
        let misses = self.misses.load(std::sync::atomic::Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.entries.lock().len(),
            max_size: self.max_size,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }
}

/// Compiled patterns re-exported for callers that want to reason about
/// cacheability without constructing a cache (e.g. the security sandbox
/// shares the notion of "is this a read-only tool").
#[must_use]
pub fn cacheable_prefix_pattern() -> &'static Regex {
    static PATTERN: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"^(read_|list_|get_|search_|find_|fetch_)").unwrap());
    &PATTERN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case::read("read_file", true)]
    #[case::list("list_projects", true)]
    #[case::get("get_status", true)]
    #[case::search("search_code", true)]
    #[case::find("find_references", true)]
    #[case::fetch("fetch_url", true)]
    #[case::write("write_file", false)]
    #[case::delete("delete_branch", false)]
    #[case::deny_listed_git_commit("git_commit", false)]
    #[case::deny_listed_deploy("deploy", false)]
    #[case::unrelated_prefix("run_command", false)]
    fn is_cacheable_matches_the_allow_and_deny_rules(#[case] tool_name: &str, #[case] expected: bool) {
        assert_eq!(is_cacheable(tool_name), expected);
    }

    #[test]
    fn canonical_key_is_argument_order_independent() {
        let a = cache_key("read_file", &serde_json::json!({"path": "x", "encoding": "utf8"}));
        let b = cache_key("read_file", &serde_json::json!({"encoding": "utf8", "path": "x"}));
        assert_eq!(a, b);
    }

    #[test]
    fn get_returns_none_for_missing_key() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        assert!(cache.get("missing").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn put_then_get_hits() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        cache.put("k".to_owned(), serde_json::json!({"v": 1}));
        assert_eq!(cache.get("k"), Some(serde_json::json!({"v": 1})));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_is_evicted_lazily_on_get() {
        let cache = ResultCache::new(10, Duration::from_millis(1));
        cache.put("k".to_owned(), serde_json::json!(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn oldest_entry_evicted_when_over_capacity() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.put("a".to_owned(), serde_json::json!(1));
        cache.put("b".to_owned(), serde_json::json!(2));
        cache.put("c".to_owned(), serde_json::json!(3));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn sweep_removes_expired_entries_without_a_get() {
        let cache = ResultCache::new(10, Duration::from_millis(1));
        cache.put("k".to_owned(), serde_json::json!(1));
        std::thread::sleep(Duration::from_millis(20));
        cache.sweep();
        assert_eq!(cache.stats().size, 0);
    }
}
