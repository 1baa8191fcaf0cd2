use metriken::AtomicHistogram;

/// Wire latency histograms (nanoseconds). Not globally registered.
///
/// One histogram per operation type, plus a combined `request` histogram
/// that records every answered operation. Values are recorded by the pool
/// from the moment a request is written until its response is matched.
pub struct ClientLatency {
    request: AtomicHistogram,
    get: AtomicHistogram,
    set: AtomicHistogram,
}

impl ClientLatency {
    pub(crate) fn new() -> Self {
        Self {
            request: AtomicHistogram::new(7, 64),
            get: AtomicHistogram::new(7, 64),
            set: AtomicHistogram::new(7, 64),
        }
    }

    /// All operations combined.
    pub fn request(&self) -> &AtomicHistogram {
        &self.request
    }

    /// GET latency.
    pub fn get(&self) -> &AtomicHistogram {
        &self.get
    }

    /// SET latency.
    pub fn set(&self) -> &AtomicHistogram {
        &self.set
    }
}
