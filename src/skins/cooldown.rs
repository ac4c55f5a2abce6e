//! Per-player skin change cooldowns
//!
//! Kept in memory only, a restart clears every cooldown.

use crate::skins::cache::deadline_after;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

fn ceil_seconds(left: Duration) -> u64 {
    if left.subsec_nanos() > 0 {
        left.as_secs() + 1
    } else {
        left.as_secs()
    }
}

#[derive(Default)]
pub struct CooldownTracker {
    entries: RwLock<HashMap<Uuid, Instant>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_cooldown(&self, identity: Uuid) -> bool {
        self.remaining(identity).is_some()
    }

    /// Whole seconds left, rounded up. 0 when there is no cooldown.
    pub fn remaining_seconds(&self, identity: Uuid) -> u64 {
        self.remaining(identity).map(ceil_seconds).unwrap_or(0)
    }

    fn remaining(&self, identity: Uuid) -> Option<Duration> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let expires_at = entries.get(&identity)?;
        let now = Instant::now();
        (*expires_at > now).then(|| *expires_at - now)
    }

    /// Block further changes for `seconds`, replacing any running cooldown.
    /// 0 lifts the cooldown.
    pub fn mark_used(&self, identity: Uuid, seconds: u64) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if seconds == 0 {
            entries.remove(&identity);
        } else {
            entries.insert(identity, deadline_after(Duration::from_secs(seconds)));
        }
    }

    /// Check and start a cooldown in one step. Fails with the remaining
    /// seconds when one is already running.
    pub fn try_acquire(&self, identity: Uuid, seconds: u64) -> Result<(), u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(expires_at) = entries.get(&identity) {
            if *expires_at > now {
                return Err(ceil_seconds(*expires_at - now));
            }
        }
        if seconds == 0 {
            entries.remove(&identity);
        } else {
            entries.insert(identity, deadline_after(Duration::from_secs(seconds)));
        }
        Ok(())
    }

    pub fn clear(&self, identity: Uuid) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&identity);
    }

    /// Drop expired entries, returns how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("[COOLDOWN] Removed {} expired cooldowns", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expires() {
        let tracker = CooldownTracker::new();
        let id = Uuid::new_v4();

        assert!(!tracker.has_cooldown(id));
        assert_eq!(tracker.remaining_seconds(id), 0);

        tracker.mark_used(id, 30);
        assert!(tracker.has_cooldown(id));
        assert_eq!(tracker.remaining_seconds(id), 30);

        tokio::time::advance(Duration::from_millis(29_500)).await;
        assert!(tracker.has_cooldown(id));
        assert_eq!(tracker.remaining_seconds(id), 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!tracker.has_cooldown(id));
        assert_eq!(tracker.remaining_seconds(id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_keeps_running_cooldowns() {
        let tracker = CooldownTracker::new();
        let short = Uuid::new_v4();
        let long = Uuid::new_v4();

        tracker.mark_used(short, 5);
        tracker.mark_used(long, 60);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(tracker.cleanup(), 1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.has_cooldown(long));
        assert!(!tracker.has_cooldown(short));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_and_zero_duration() {
        let tracker = CooldownTracker::new();
        let id = Uuid::new_v4();

        tracker.mark_used(id, 0);
        assert!(tracker.is_empty());

        tracker.mark_used(id, 30);
        tracker.clear(id);
        assert!(!tracker.has_cooldown(id));

        tracker.mark_used(id, 30);
        tracker.mark_used(id, 0);
        assert!(!tracker.has_cooldown(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_is_exclusive() {
        let tracker = CooldownTracker::new();
        let id = Uuid::new_v4();

        assert_eq!(tracker.try_acquire(id, 30), Ok(()));
        assert_eq!(tracker.try_acquire(id, 30), Err(30));

        tokio::time::advance(Duration::from_millis(10_500)).await;
        assert_eq!(tracker.try_acquire(id, 30), Err(20));

        tokio::time::advance(Duration::from_millis(19_500)).await;
        assert_eq!(tracker.try_acquire(id, 5), Ok(()));
        assert_eq!(tracker.remaining_seconds(id), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_duration_does_not_overflow() {
        let tracker = CooldownTracker::new();
        let id = Uuid::new_v4();

        tracker.mark_used(id, u64::MAX);
        assert!(tracker.has_cooldown(id));
        assert!(tracker.remaining_seconds(id) > 365 * 24 * 60 * 60);
        assert_eq!(tracker.cleanup(), 0);

        let other = Uuid::new_v4();
        assert_eq!(tracker.try_acquire(other, u64::MAX), Ok(()));
        assert!(tracker.has_cooldown(other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_used_replaces() {
        let tracker = CooldownTracker::new();
        let id = Uuid::new_v4();

        tracker.mark_used(id, 30);
        tracker.mark_used(id, 5);
        assert_eq!(tracker.remaining_seconds(id), 5);
    }
}
