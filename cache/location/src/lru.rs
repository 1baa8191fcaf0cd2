//! Least recently inserted cache with batch eviction and a record lifetime.

use crate::clock::{Clock, SystemClock};
use crate::{CacheError, LocationCache};
use ahash::AHashMap;
use parking_lot::Mutex;
use protocol_craq::{CraqEntry, ObjectId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_SIZE: usize = 5000;
const DEFAULT_CLEAN_GROUP_SIZE: usize = 100;
const DEFAULT_ENTRY_LIFETIME: Duration = Duration::from_secs(8);

struct Record {
    entry: CraqEntry,
    touched: Instant,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    by_id: AHashMap<ObjectId, Record>,
    // (touched, seq) makes equal timestamps distinct and keeps insertion order
    by_age: BTreeMap<(Instant, u64), ObjectId>,
    next_seq: u64,
}

/// A cache that evicts the oldest inserted records.
///
/// Inserting (or re-inserting) a record refreshes its age. Lookups do not.
/// Once the cache holds more than `max_size` records, the
/// `clean_group_size` oldest are evicted together. A record older than
/// `entry_lifetime` is reported as a miss but stays resident until evicted
/// or replaced.
pub struct LruCache {
    max_size: usize,
    clean_group_size: usize,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl LruCache {
    pub fn builder() -> LruCacheBuilder {
        LruCacheBuilder::default()
    }

    pub fn entry_lifetime(&self) -> Duration {
        self.lifetime
    }

    fn evict_oldest(&self, inner: &mut Inner) {
        for _ in 0..self.clean_group_size {
            let Some((_, id)) = inner.by_age.pop_first() else {
                break;
            };
            inner.by_id.remove(&id);
        }
    }
}

impl LocationCache for LruCache {
    fn insert(&self, id: ObjectId, entry: CraqEntry) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        if let Some(old) = inner.by_id.insert(
            id,
            Record {
                entry,
                touched: now,
                seq,
            },
        ) {
            inner.by_age.remove(&(old.touched, old.seq));
        }
        inner.by_age.insert((now, seq), id);

        if inner.by_id.len() > self.max_size {
            self.evict_oldest(&mut inner);
        }
    }

    fn lookup(&self, id: &ObjectId) -> Option<CraqEntry> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let record = inner.by_id.get(id)?;
        if now.saturating_duration_since(record.touched) > self.lifetime {
            return None;
        }
        Some(record.entry)
    }

    fn remove(&self, id: &ObjectId) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.by_id.remove(id) {
            inner.by_age.remove(&(old.touched, old.seq));
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn name(&self) -> &str {
        "lru"
    }
}

/// Builder for [`LruCache`].
pub struct LruCacheBuilder {
    max_size: usize,
    clean_group_size: usize,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for LruCacheBuilder {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            clean_group_size: DEFAULT_CLEAN_GROUP_SIZE,
            lifetime: DEFAULT_ENTRY_LIFETIME,
            clock: Arc::new(SystemClock),
        }
    }
}

impl LruCacheBuilder {
    /// Maximum number of records before eviction.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Number of records evicted together once over capacity.
    pub fn clean_group_size(mut self, size: usize) -> Self {
        self.clean_group_size = size;
        self
    }

    /// Age after which a record is reported as a miss.
    pub fn entry_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<LruCache, CacheError> {
        if self.max_size == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        if self.clean_group_size == 0 {
            return Err(CacheError::ZeroParameter {
                name: "clean_group_size",
            });
        }
        Ok(LruCache {
            max_size: self.max_size,
            clean_group_size: self.clean_group_size,
            lifetime: self.lifetime,
            clock: self.clock,
            inner: Mutex::new(Inner::default()),
        })
    }
}
