//! Per-lookup timing tokens.
//!
//! A [`TraceToken`] rides along with a lookup from the first call until the
//! result is returned, collecting a timestamp at each stage. Unsampled
//! tokens are carried but never reported.

use protocol_craq::ObjectId;
use std::fmt;
use std::time::{Duration, Instant};

/// Points in a lookup's life at which a timestamp is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStage {
    InitialLookup,
    CacheCheckBegin,
    CacheCheckEnd,
    Enqueued,
    Dequeued,
    NetworkSend,
    NetworkReceive,
    LookupReturnBegin,
    LookupReturnEnd,
}

impl TraceStage {
    pub const ALL: [TraceStage; 9] = [
        TraceStage::InitialLookup,
        TraceStage::CacheCheckBegin,
        TraceStage::CacheCheckEnd,
        TraceStage::Enqueued,
        TraceStage::Dequeued,
        TraceStage::NetworkSend,
        TraceStage::NetworkReceive,
        TraceStage::LookupReturnBegin,
        TraceStage::LookupReturnEnd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TraceStage::InitialLookup => "initial_lookup",
            TraceStage::CacheCheckBegin => "cache_check_begin",
            TraceStage::CacheCheckEnd => "cache_check_end",
            TraceStage::Enqueued => "enqueued",
            TraceStage::Dequeued => "dequeued",
            TraceStage::NetworkSend => "network_send",
            TraceStage::NetworkReceive => "network_receive",
            TraceStage::LookupReturnBegin => "lookup_return_begin",
            TraceStage::LookupReturnEnd => "lookup_return_end",
        }
    }
}

/// Timestamps collected for one lookup.
#[derive(Debug, Clone)]
pub struct TraceToken {
    object: ObjectId,
    sampled: bool,
    started: Instant,
    stamps: [Option<Instant>; TraceStage::ALL.len()],
    queue_len: Option<usize>,
}

impl TraceToken {
    pub fn new(object: ObjectId, sampled: bool) -> Self {
        Self {
            object,
            sampled,
            started: Instant::now(),
            stamps: [None; TraceStage::ALL.len()],
            queue_len: None,
        }
    }

    pub fn object(&self) -> &ObjectId {
        &self.object
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Record `stage` as reached now. A later stamp of the same stage
    /// replaces the earlier one.
    pub fn stamp(&mut self, stage: TraceStage) {
        self.stamp_at(stage, Instant::now());
    }

    pub fn stamp_at(&mut self, stage: TraceStage, at: Instant) {
        self.stamps[stage as usize] = Some(at);
    }

    pub fn stamped(&self, stage: TraceStage) -> Option<Instant> {
        self.stamps[stage as usize]
    }

    /// Time from token creation to `stage`, if reached.
    pub fn offset(&self, stage: TraceStage) -> Option<Duration> {
        self.stamped(stage)
            .map(|at| at.saturating_duration_since(self.started))
    }

    /// Time from creation to the end of the lookup, if it has ended.
    pub fn total(&self) -> Option<Duration> {
        self.offset(TraceStage::LookupReturnEnd)
    }

    /// Backend queue depth observed when the lookup was enqueued.
    pub fn queue_len(&self) -> Option<usize> {
        self.queue_len
    }

    pub fn set_queue_len(&mut self, len: usize) {
        self.queue_len = Some(len);
    }
}

impl fmt::Display for TraceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for stage in TraceStage::ALL {
            if let Some(offset) = self.offset(stage) {
                if !first {
                    f.write_str(" ")?;
                }
                first = false;
                write!(f, "{}={}us", stage.name(), offset.as_micros())?;
            }
        }
        Ok(())
    }
}
