//! Distance weighted scoring.
//!
//! A record hosted on server `s` scores `radius / (d² · ln(d)²)` where `d`
//! is the distance between the centroids of the local server's region and
//! `s`'s region. Large objects on nearby servers are kept longest. `d` is
//! clamped below at `e` so the score stays finite and decreasing for
//! co-located servers.

use crate::region::{CoordinateSegmentation, region_centroid};
use crate::scored::{ScoredCache, ScoredRecord, Scorer};
use crate::CacheError;
use protocol_craq::ServerId;
use std::f64::consts::E;
use std::sync::Arc;

/// Scores records by radius over squared (log) distance to their server.
pub struct DistanceScorer {
    cseg: Arc<dyn CoordinateSegmentation>,
    local: ServerId,
}

impl DistanceScorer {
    pub fn new(cseg: Arc<dyn CoordinateSegmentation>, local: ServerId) -> Self {
        Self { cseg, local }
    }

    pub fn weight(radius: f32, distance: f64) -> f64 {
        let d = if distance.is_nan() { E } else { distance.max(E) };
        let ln = d.ln();
        radius as f64 / (d * d * ln * ln)
    }
}

impl Scorer for DistanceScorer {
    /// Unknown regions are infinitely far away.
    fn distance(&self, server: ServerId) -> f64 {
        let Some(local) = region_centroid(&self.cseg.server_region(self.local)) else {
            return f64::INFINITY;
        };
        let Some(remote) = region_centroid(&self.cseg.server_region(server)) else {
            return f64::INFINITY;
        };
        local
            .iter()
            .zip(remote.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    fn score(&self, record: &ScoredRecord) -> f64 {
        Self::weight(record.entry.radius(), record.distance)
    }
}

/// A [`ScoredCache`] keeping records close to `local` with the largest radii.
pub fn distance_weighted(
    cseg: Arc<dyn CoordinateSegmentation>,
    local: ServerId,
    interest_radius: f64,
    max_size: usize,
) -> Result<ScoredCache<DistanceScorer>, CacheError> {
    ScoredCache::new(
        "distance",
        DistanceScorer::new(cseg, local),
        interest_radius,
        max_size,
    )
}
