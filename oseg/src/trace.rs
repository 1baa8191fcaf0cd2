//! Lookup trace sampling.

use std::sync::atomic::{AtomicU64, Ordering};

use craq_client::{TraceStage, TraceToken};
use protocol_craq::ObjectId;

use crate::metrics::SAMPLED_LOOKUP_LATENCY;

/// Marks one in every `every` lookups as sampled.
pub(crate) struct TraceSampler {
    every: u64,
    count: AtomicU64,
}

impl TraceSampler {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: AtomicU64::new(0),
        }
    }

    /// A token for a new lookup, stamped with its start.
    pub fn start(&self, id: ObjectId) -> TraceToken {
        let n = self.count.fetch_add(1, Ordering::Relaxed);
        let mut token = TraceToken::new(id, n % self.every == 0);
        token.stamp(TraceStage::InitialLookup);
        token
    }
}

/// Close out a finished lookup's token and report it if sampled.
pub(crate) fn finish(token: &mut TraceToken) {
    token.stamp(TraceStage::LookupReturnEnd);
    if !token.is_sampled() {
        return;
    }
    if let Some(total) = token.total() {
        let _ = SAMPLED_LOOKUP_LATENCY.increment(total.as_nanos() as u64);
    }
    tracing::debug!(
        object = %token.object(),
        queue_len = token.queue_len(),
        trace = %token,
        "sampled lookup"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_rate() {
        let sampler = TraceSampler::new(3);
        let sampled: Vec<bool> = (0..7)
            .map(|n| sampler.start(ObjectId::from_u128(n)).is_sampled())
            .collect();
        assert_eq!(sampled, [true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_finish_stamps_end() {
        let sampler = TraceSampler::new(1);
        let mut token = sampler.start(ObjectId::from_u128(1));
        assert!(token.stamped(TraceStage::InitialLookup).is_some());
        finish(&mut token);
        assert!(token.total().is_some());
    }
}
