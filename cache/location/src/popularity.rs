//! Fixed capacity cache with sampled popularity eviction.
//!
//! Records live in a slab allocated once at construction and are addressed
//! by slot index. A dense list of occupied slots lets eviction draw uniform
//! samples in constant time.
//!
//! Popularity is an exponentially weighted average of requests per
//! millisecond. Requests are counted against the current millisecond and
//! folded into the average the next time the record is touched in a later
//! millisecond; every further elapsed millisecond only decays it.

use crate::clock::{Clock, SystemClock};
use crate::{CacheError, LocationCache};
use ahash::AHashMap;
use parking_lot::Mutex;
use protocol_craq::{CraqEntry, ObjectId};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_MAX_SIZE: usize = 5000;
const DEFAULT_EWMA_WEIGHT: f64 = 0.3;
const DEFAULT_SAMPLE_SIZE: usize = 3;
const DEFAULT_SEED: u64 = 0x6c6f_6361_7469_6f6e;

/// Which of several equally scored samples is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// The earliest drawn of the tied samples.
    FirstSampled,
    /// The latest drawn of the tied samples.
    #[default]
    LastSampled,
}

/// Per-record state visible to score functions.
#[derive(Debug, Clone)]
pub struct PopularityRecord {
    pub id: ObjectId,
    pub entry: CraqEntry,
    /// Weighted requests per millisecond.
    pub popularity: f64,
    /// Requests counted in the millisecond `last_tick_ms`.
    pub requests: u32,
    pub last_tick_ms: u64,
    pub last_access_ms: u64,
    pub inserted_ms: u64,
}

type ScoreFn = Box<dyn Fn(&PopularityRecord) -> f64 + Send + Sync>;

struct Inner {
    slab: Vec<Option<PopularityRecord>>,
    index: AHashMap<ObjectId, usize>,
    free: Vec<usize>,
    // occupied slots, and each occupied slot's position in `live`
    live: Vec<usize>,
    live_pos: Vec<usize>,
    rng: Xoshiro256PlusPlus,
}

impl Inner {
    fn occupy(&mut self, record: PopularityRecord) -> Option<usize> {
        let slot = self.free.pop()?;
        self.index.insert(record.id, slot);
        self.slab[slot] = Some(record);
        self.live_pos[slot] = self.live.len();
        self.live.push(slot);
        Some(slot)
    }

    fn vacate(&mut self, slot: usize) -> Option<PopularityRecord> {
        let record = self.slab[slot].take()?;
        self.index.remove(&record.id);
        let pos = self.live_pos[slot];
        self.live.swap_remove(pos);
        if let Some(&moved) = self.live.get(pos) {
            self.live_pos[moved] = pos;
        }
        self.free.push(slot);
        Some(record)
    }
}

/// A cache evicting the least popular of a random sample of records.
pub struct PopularityCache {
    max_size: usize,
    weight: f64,
    sample_size: usize,
    tie_break: TieBreak,
    score: ScoreFn,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    inner: Mutex<Inner>,
}

impl PopularityCache {
    pub fn builder() -> PopularityCacheBuilder {
        PopularityCacheBuilder::default()
    }

    fn now_ms(&self) -> u64 {
        self.clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_millis() as u64
    }

    /// Bring `record`'s average up to `now_ms` and optionally count a request.
    fn refresh(&self, record: &mut PopularityRecord, now_ms: u64, request: bool) {
        if now_ms > record.last_tick_ms {
            let elapsed = now_ms - record.last_tick_ms;
            let keep = 1.0 - self.weight;
            let folded = self.weight * record.requests as f64 + keep * record.popularity;
            let idle = (elapsed - 1).min(i32::MAX as u64) as i32;
            record.popularity = folded * keep.powi(idle);
            record.requests = 0;
            record.last_tick_ms = now_ms;
        }
        if request {
            record.requests = record.requests.saturating_add(1);
            record.last_access_ms = now_ms;
        }
    }

    /// Sample live records with replacement and evict the lowest scored.
    fn evict_one(&self, inner: &mut Inner, now_ms: u64) {
        if inner.live.is_empty() {
            return;
        }
        let mut victim: Option<(usize, f64)> = None;
        for _ in 0..self.sample_size {
            let slot = inner.live[inner.rng.random_range(0..inner.live.len())];
            let Some(record) = inner.slab[slot].as_mut() else {
                continue;
            };
            self.refresh(record, now_ms, false);
            let score = (self.score)(record);
            let replace = match victim {
                None => true,
                Some((_, best)) => match self.tie_break {
                    TieBreak::FirstSampled => score < best,
                    TieBreak::LastSampled => score <= best,
                },
            };
            if replace {
                victim = Some((slot, score));
            }
        }
        if let Some((slot, _)) = victim {
            inner.vacate(slot);
        }
    }

    /// Current popularity of `id`, brought up to date without counting a
    /// request.
    pub fn popularity(&self, id: &ObjectId) -> Option<f64> {
        let now_ms = self.now_ms();
        let mut inner = self.inner.lock();
        let slot = *inner.index.get(id)?;
        let record = inner.slab[slot].as_mut()?;
        self.refresh(record, now_ms, false);
        Some(record.popularity)
    }
}

impl LocationCache for PopularityCache {
    fn insert(&self, id: ObjectId, entry: CraqEntry) {
        let now_ms = self.now_ms();
        let mut inner = self.inner.lock();

        if let Some(&slot) = inner.index.get(&id) {
            if let Some(record) = inner.slab[slot].as_mut() {
                record.entry = entry;
            }
            return;
        }

        if inner.free.is_empty() {
            self.evict_one(&mut inner, now_ms);
        }
        inner.occupy(PopularityRecord {
            id,
            entry,
            popularity: 0.0,
            requests: 0,
            last_tick_ms: now_ms,
            last_access_ms: now_ms,
            inserted_ms: now_ms,
        });
    }

    fn lookup(&self, id: &ObjectId) -> Option<CraqEntry> {
        let now_ms = self.now_ms();
        let mut inner = self.inner.lock();
        let slot = *inner.index.get(id)?;
        let record = inner.slab[slot].as_mut()?;
        self.refresh(record, now_ms, true);
        Some(record.entry)
    }

    fn remove(&self, id: &ObjectId) {
        let mut inner = self.inner.lock();
        if let Some(&slot) = inner.index.get(id) {
            inner.vacate(slot);
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().live.len()
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn name(&self) -> &str {
        "popularity"
    }
}

/// Builder for [`PopularityCache`].
pub struct PopularityCacheBuilder {
    max_size: usize,
    weight: f64,
    sample_size: usize,
    tie_break: TieBreak,
    seed: u64,
    score: ScoreFn,
    clock: Arc<dyn Clock>,
}

impl Default for PopularityCacheBuilder {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            weight: DEFAULT_EWMA_WEIGHT,
            sample_size: DEFAULT_SAMPLE_SIZE,
            tie_break: TieBreak::default(),
            seed: DEFAULT_SEED,
            score: Box::new(|record| record.popularity),
            clock: Arc::new(SystemClock),
        }
    }
}

impl PopularityCacheBuilder {
    /// Number of slots allocated up front.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Weight of the newest millisecond in the moving average.
    pub fn ewma_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Number of records drawn per eviction.
    pub fn sample_size(mut self, n: usize) -> Self {
        self.sample_size = n;
        self
    }

    pub fn tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Seed for the sampling generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Replace the default score (the popularity itself). Lower scores are
    /// evicted first.
    pub fn score<F>(mut self, score: F) -> Self
    where
        F: Fn(&PopularityRecord) -> f64 + Send + Sync + 'static,
    {
        self.score = Box::new(score);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<PopularityCache, CacheError> {
        if self.max_size == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        if self.sample_size == 0 {
            return Err(CacheError::ZeroParameter {
                name: "sample_size",
            });
        }
        if !(self.weight > 0.0 && self.weight <= 1.0) {
            return Err(CacheError::InvalidWeight(self.weight));
        }

        // slots are handed out lowest index first
        let free = (0..self.max_size).rev().collect();
        let inner = Inner {
            slab: (0..self.max_size).map(|_| None).collect(),
            index: AHashMap::with_capacity(self.max_size),
            free,
            live: Vec::with_capacity(self.max_size),
            live_pos: vec![0; self.max_size],
            rng: Xoshiro256PlusPlus::seed_from_u64(self.seed),
        };
        let epoch = self.clock.now();
        Ok(PopularityCache {
            max_size: self.max_size,
            weight: self.weight,
            sample_size: self.sample_size,
            tie_break: self.tie_break,
            score: self.score,
            clock: self.clock,
            epoch,
            inner: Mutex::new(inner),
        })
    }
}
