//! Cache ranked by a caller supplied score.

use crate::{CacheError, LocationCache};
use ahash::AHashMap;
use parking_lot::Mutex;
use protocol_craq::{CraqEntry, ObjectId, ServerId};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Ranks cached records. Lower scores are evicted first.
pub trait Scorer: Send + Sync {
    /// Distance from the local server to `server`. Records farther than the
    /// cache's interest radius are not admitted.
    fn distance(&self, server: ServerId) -> f64;

    fn score(&self, record: &ScoredRecord) -> f64;
}

/// A record as seen by a [`Scorer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRecord {
    pub id: ObjectId,
    pub entry: CraqEntry,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

// equal scores rank by admission order, oldest first
type Rank = (Score, u64);

#[derive(Default)]
struct Inner {
    by_id: AHashMap<ObjectId, (ScoredRecord, Rank)>,
    ranked: BTreeMap<Rank, ObjectId>,
    next_seq: u64,
}

/// A cache that keeps the highest scored records within an interest
/// radius of the local server.
///
/// Inserting an id that is already cached re-scores it. Once the cache
/// holds more than `max_size` records the single lowest ranked one is
/// evicted. Lookups do not change a record's rank.
pub struct ScoredCache<S> {
    name: String,
    max_size: usize,
    interest_radius: f64,
    scorer: S,
    inner: Mutex<Inner>,
}

impl<S: Scorer> ScoredCache<S> {
    pub fn new(
        name: impl Into<String>,
        scorer: S,
        interest_radius: f64,
        max_size: usize,
    ) -> Result<Self, CacheError> {
        if max_size == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(Self {
            name: name.into(),
            max_size,
            interest_radius,
            scorer,
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn interest_radius(&self) -> f64 {
        self.interest_radius
    }

    /// The record for `id` including its distance, if cached.
    pub fn record(&self, id: &ObjectId) -> Option<ScoredRecord> {
        self.inner.lock().by_id.get(id).map(|(record, _)| *record)
    }
}

impl<S: Scorer> LocationCache for ScoredCache<S> {
    fn insert(&self, id: ObjectId, entry: CraqEntry) {
        // the scorer may consult external state, so run it unlocked
        let distance = self.scorer.distance(entry.server());
        // NaN compares false and is rejected along with out of range
        if !(distance <= self.interest_radius) {
            // a record for the old location must not outlive the move
            self.remove(&id);
            return;
        }
        let record = ScoredRecord {
            id,
            entry,
            distance,
        };
        let score = Score(self.scorer.score(&record));

        let mut inner = self.inner.lock();
        let rank = (score, inner.next_seq);
        inner.next_seq += 1;

        if let Some((_, old)) = inner.by_id.insert(id, (record, rank)) {
            inner.ranked.remove(&old);
        }
        inner.ranked.insert(rank, id);

        if inner.by_id.len() > self.max_size {
            if let Some((_, victim)) = inner.ranked.pop_first() {
                inner.by_id.remove(&victim);
            }
        }
    }

    fn lookup(&self, id: &ObjectId) -> Option<CraqEntry> {
        self.inner.lock().by_id.get(id).map(|(record, _)| record.entry)
    }

    fn remove(&self, id: &ObjectId) {
        let mut inner = self.inner.lock();
        if let Some((_, rank)) = inner.by_id.remove(id) {
            inner.ranked.remove(&rank);
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // distance is the server id, score is the radius
    struct ByRadius;

    impl Scorer for ByRadius {
        fn distance(&self, server: ServerId) -> f64 {
            server as f64
        }

        fn score(&self, record: &ScoredRecord) -> f64 {
            record.entry.radius() as f64
        }
    }

    fn id(n: u128) -> ObjectId {
        ObjectId::from_u128(n)
    }

    #[test]
    fn test_admission_by_interest_radius() {
        let cache = ScoredCache::new("scored", ByRadius, 10.0, 8).unwrap();
        cache.insert(id(1), CraqEntry::new(10, 1.0));
        cache.insert(id(2), CraqEntry::new(11, 1.0));
        assert!(cache.lookup(&id(1)).is_some());
        assert_eq!(cache.lookup(&id(2)), None);
        assert_eq!(cache.record(&id(1)).unwrap().distance, 10.0);
    }

    #[test]
    fn test_move_out_of_range_drops_record() {
        let cache = ScoredCache::new("scored", ByRadius, 10.0, 8).unwrap();
        cache.insert(id(1), CraqEntry::new(2, 1.0));
        assert_eq!(cache.lookup(&id(1)), Some(CraqEntry::new(2, 1.0)));

        cache.insert(id(1), CraqEntry::new(40, 1.0));
        assert_eq!(cache.lookup(&id(1)), None);
        assert!(cache.is_empty());
        assert!(cache.inner.lock().ranked.is_empty());
    }

    #[test]
    fn test_evicts_lowest_score() {
        let cache = ScoredCache::new("scored", ByRadius, 100.0, 3).unwrap();
        cache.insert(id(1), CraqEntry::new(1, 5.0));
        cache.insert(id(2), CraqEntry::new(1, 1.0));
        cache.insert(id(3), CraqEntry::new(1, 9.0));
        cache.insert(id(4), CraqEntry::new(1, 3.0));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.lookup(&id(2)), None);
        for n in [1, 3, 4] {
            assert!(cache.lookup(&id(n)).is_some());
        }
    }

    #[test]
    fn test_newcomer_can_be_evicted() {
        let cache = ScoredCache::new("scored", ByRadius, 100.0, 2).unwrap();
        cache.insert(id(1), CraqEntry::new(1, 5.0));
        cache.insert(id(2), CraqEntry::new(1, 6.0));
        cache.insert(id(3), CraqEntry::new(1, 0.5));
        assert_eq!(cache.lookup(&id(3)), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_equal_scores_evict_oldest() {
        let cache = ScoredCache::new("scored", ByRadius, 100.0, 2).unwrap();
        cache.insert(id(1), CraqEntry::new(1, 2.0));
        cache.insert(id(2), CraqEntry::new(1, 2.0));
        cache.insert(id(3), CraqEntry::new(1, 2.0));
        assert_eq!(cache.lookup(&id(1)), None);
        assert!(cache.lookup(&id(2)).is_some());
    }

    #[test]
    fn test_reinsert_rescores() {
        let cache = ScoredCache::new("scored", ByRadius, 100.0, 2).unwrap();
        cache.insert(id(1), CraqEntry::new(1, 1.0));
        cache.insert(id(2), CraqEntry::new(1, 2.0));
        // id 1 moves to a larger radius and outranks id 2
        cache.insert(id(1), CraqEntry::new(2, 8.0));
        assert_eq!(cache.len(), 2);
        cache.insert(id(3), CraqEntry::new(1, 4.0));

        assert_eq!(cache.lookup(&id(1)), Some(CraqEntry::new(2, 8.0)));
        assert_eq!(cache.lookup(&id(2)), None);
    }

    #[test]
    fn test_remove() {
        let cache = ScoredCache::new("scored", ByRadius, 100.0, 2).unwrap();
        cache.insert(id(1), CraqEntry::new(1, 1.0));
        cache.remove(&id(1));
        cache.remove(&id(1));
        assert!(cache.is_empty());
        assert_eq!(cache.name(), "scored");
    }

    #[test]
    fn test_score_order_is_total() {
        let mut scores = [Score(1.0), Score(f64::NAN), Score(-0.0), Score(0.0)];
        scores.sort();
        assert_eq!(scores[0].0.to_bits(), (-0.0f64).to_bits());
        assert!(scores[3].0.is_nan());
    }
}
