//! Caches mapping object ids to their last known location.
//!
//! Every cache implements [`LocationCache`] and is safe to share between
//! threads. Each one guards its state with a single internal mutex, so a
//! cache never calls back into its owner while locked.
//!
//! # Policies
//!
//! - [`LruCache`]: evicts the oldest inserted records in groups; records
//!   older than a configured lifetime are treated as misses.
//! - [`PopularityCache`]: tracks an exponentially weighted request rate per
//!   record and evicts the least popular of a random sample.
//! - [`ScoredCache`]: ranks records with a pluggable [`Scorer`] and evicts
//!   the lowest ranked one. [`DistanceScorer`] ranks by radius over the
//!   distance to the hosting server's region.
//!
//! # Example
//!
//! ```
//! use location_cache::{LocationCache, LruCache};
//! use protocol_craq::{CraqEntry, ObjectId};
//! use std::time::Duration;
//!
//! let cache = LruCache::builder()
//!     .max_size(1024)
//!     .clean_group_size(16)
//!     .entry_lifetime(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//!
//! let id = ObjectId::from_u128(1);
//! cache.insert(id, CraqEntry::new(4, 2.0));
//! assert_eq!(cache.lookup(&id).map(|e| e.server()), Some(4));
//! ```

mod clock;
mod distance;
mod lru;
mod popularity;
mod region;
mod scored;

pub use clock::{Clock, ManualClock, SystemClock};
pub use distance::{DistanceScorer, distance_weighted};
pub use lru::{LruCache, LruCacheBuilder};
pub use popularity::{PopularityCache, PopularityCacheBuilder, PopularityRecord, TieBreak};
pub use region::{BoundingBox, CoordinateSegmentation, region_centroid};
pub use scored::{ScoredCache, ScoredRecord, Scorer};

use protocol_craq::{CraqEntry, ObjectId};

/// Common interface of the location caches.
pub trait LocationCache: Send + Sync {
    /// Insert or replace the record for `id`. May evict other records.
    fn insert(&self, id: ObjectId, entry: CraqEntry);

    /// Returns the cached record for `id`, if present and still valid.
    fn lookup(&self, id: &ObjectId) -> Option<CraqEntry>;

    /// Drop the record for `id`. A no-op if absent.
    fn remove(&self, id: &ObjectId);

    /// Number of records currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    fn max_size(&self) -> usize;

    /// Short policy name for logging.
    fn name(&self) -> &str;
}

/// Error building a cache from invalid parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("max_size must be greater than zero")]
    ZeroCapacity,
    #[error("{name} must be greater than zero")]
    ZeroParameter { name: &'static str },
    #[error("ewma_weight must be within (0, 1], got {0}")]
    InvalidWeight(f64),
}
