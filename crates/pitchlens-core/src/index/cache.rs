// Time-bounded memo for aggregate computations.
//
// Entries are stored with the instant they were computed. A read inside the
// TTL returns the stored value; a read after it recomputes and replaces the
// entry whole. Time comes from a `Clock` so tests can move it by hand.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// Lock, recovering the guard if the mutex was poisoned.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// TTL cache
// ---------------------------------------------------------------------------

/// Upper bound on a configured TTL, well inside chrono's range.
const MAX_TTL_SECS: u64 = 1 << 40;

struct Entry<V> {
    value: V,
    computed_at: DateTime<Utc>,
}

/// Key -> (value, timestamp) map with a fixed time-to-live.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("entries", &lock(&self.entries).len())
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl_secs(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let secs = ttl_secs.min(MAX_TTL_SECS) as i64;
        Self::new(Duration::seconds(secs), clock)
    }

    /// Stored value for `key` if it is still fresh.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = lock(&self.entries);
        entries
            .get(key)
            .filter(|e| now - e.computed_at < self.ttl)
            .map(|e| e.value.clone())
    }

    /// Return the fresh value for `key`, or run `compute` and store its
    /// result. The lock is not held while computing. Storing a new value
    /// also drops every other entry past its TTL.
    pub fn get_or_compute(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.get(&key) {
            trace!("cache hit");
            return hit;
        }
        trace!("cache miss");
        let value = compute();
        let computed_at = self.clock.now();
        let mut entries = lock(&self.entries);
        let purged = purge_expired(&mut entries, computed_at, self.ttl);
        if purged > 0 {
            trace!("purged {} expired entries", purged);
        }
        entries.insert(
            key,
            Entry {
                value: value.clone(),
                computed_at,
            },
        );
        value
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop every entry past its TTL; returns how many went.
fn purge_expired<K, V>(entries: &mut HashMap<K, Entry<V>>, now: DateTime<Utc>, ttl: Duration) -> usize {
    let before = entries.len();
    entries.retain(|_, e| now - e.computed_at < ttl);
    before - entries.len()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn cache(clock: &Arc<ManualClock>, ttl_secs: u64) -> TtlCache<&'static str, u32> {
        TtlCache::with_ttl_secs(ttl_secs, clock.clone())
    }

    #[test]
    fn hit_within_ttl_returns_stored_value() {
        let clock = Arc::new(ManualClock::default());
        let c = cache(&clock, 300);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            calls.get()
        };

        assert_eq!(c.get_or_compute("team", compute), 1);
        clock.advance(Duration::seconds(299));
        assert_eq!(c.get_or_compute("team", compute), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn expired_entry_is_recomputed_and_replaced() {
        let clock = Arc::new(ManualClock::default());
        let c = cache(&clock, 300);
        c.get_or_compute("team", || 1);
        clock.advance(Duration::seconds(300));
        assert_eq!(c.get(&"team"), None);
        assert_eq!(c.get_or_compute("team", || 2), 2);
        assert_eq!(c.len(), 1);

        // The replacement carries a fresh timestamp.
        clock.advance(Duration::seconds(10));
        assert_eq!(c.get_or_compute("team", || 3), 2);
    }

    #[test]
    fn keys_are_independent() {
        let clock = Arc::new(ManualClock::default());
        let c = cache(&clock, 60);
        c.get_or_compute("a", || 1);
        c.get_or_compute("b", || 2);
        assert_eq!(c.get(&"a"), Some(1));
        assert_eq!(c.get(&"b"), Some(2));
    }

    #[test]
    fn storing_a_value_purges_only_stale_entries() {
        let clock = Arc::new(ManualClock::default());
        let c = cache(&clock, 60);
        c.get_or_compute("old", || 1);
        clock.advance(Duration::seconds(45));
        c.get_or_compute("mid", || 2);
        clock.advance(Duration::seconds(30));
        // "old" is 75s old, "mid" 30s.
        assert_eq!(c.len(), 2);
        c.get_or_compute("new", || 3);
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&"old"), None);
        assert_eq!(c.get(&"mid"), Some(2));
        assert_eq!(c.get(&"new"), Some(3));
    }

    #[test]
    fn a_hit_leaves_stale_entries_alone() {
        let clock = Arc::new(ManualClock::default());
        let c = cache(&clock, 60);
        c.get_or_compute("old", || 1);
        clock.advance(Duration::seconds(50));
        c.get_or_compute("fresh", || 2);
        clock.advance(Duration::seconds(20));
        assert_eq!(c.get_or_compute("fresh", || 9), 2);
        assert_eq!(c.len(), 2);
        assert!(!c.is_empty());
    }
}
