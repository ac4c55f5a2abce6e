// Resolution cache with per-entry TTL
// Sits in front of MineSkin and Mojang so repeated lookups stay local

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Longest timer handed out, larger durations are clamped to it
const MAX_DEADLINE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + duration`, clamped so huge configured values cannot overflow
pub(crate) fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration.min(MAX_DEADLINE))
        .unwrap_or(now)
}

/// Cache entry with data and expiry
#[derive(Clone)]
struct CacheEntry<V: Clone> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline_after(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe key/value cache. Expired entries are dropped when read.
///
/// Store `Option<T>` to remember negative lookups.
pub struct ResolutionCache<V: Clone> {
    name: &'static str,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ResolutionCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get a value if it exists and is not expired
    pub async fn get(&self, key: &str) -> Option<V> {
        {
            let cache = self.entries.read().await;
            match cache.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired() => {
                    tracing::debug!("[CACHE] {} hit: {}", self.name, key);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Expired, remove unless someone refreshed it meanwhile
        let mut cache = self.entries.write().await;
        if cache.get(key).is_some_and(|entry| entry.is_expired()) {
            cache.remove(key);
            tracing::debug!("[CACHE] {} expired: {}", self.name, key);
        }
        None
    }

    /// Store a value, replacing any previous one
    pub async fn put(&self, key: &str, value: V, ttl: Duration) {
        let mut cache = self.entries.write().await;
        cache.insert(key.to_string(), CacheEntry::new(value, ttl));
        tracing::debug!("[CACHE] {} stored: {}", self.name, key);
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Clear all expired entries, returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let mut cache = self.entries.write().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_expired());
        let removed = before - cache.len();
        if removed > 0 {
            tracing::debug!("[CACHE] Cleaned up {} expired {} entries", removed, self.name);
        }
        removed
    }

    pub async fn clear_all(&self) {
        self.entries.write().await.clear();
        tracing::debug!("[CACHE] Cleared {}", self.name);
    }

    pub async fn stats(&self) -> CacheStats {
        let cache = self.entries.read().await;
        CacheStats {
            name: self.name,
            entries: cache.len(),
            expired: cache.values().filter(|e| e.is_expired()).count(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub name: &'static str,
    pub entries: usize,
    pub expired: usize,
}
