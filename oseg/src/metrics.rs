//! Object segmentation metrics.

use metriken::{AtomicHistogram, Counter, Gauge, metric};

/// Calls to `lookup`.
#[metric(name = "oseg_lookups")]
pub static LOOKUPS: Counter = Counter::new();

/// Lookups answered because the object is hosted here.
#[metric(name = "oseg_lookups_local")]
pub static LOOKUPS_LOCAL: Counter = Counter::new();

/// Lookups answered from the location cache.
#[metric(name = "oseg_cache_hits")]
pub static CACHE_HITS: Counter = Counter::new();

/// Lookups the location cache could not answer.
#[metric(name = "oseg_cache_misses")]
pub static CACHE_MISSES: Counter = Counter::new();

/// Lookups attached to one already in progress.
#[metric(name = "oseg_lookups_deduplicated")]
pub static LOOKUPS_DEDUPLICATED: Counter = Counter::new();

/// GETs issued to the store.
#[metric(name = "oseg_backend_gets")]
pub static BACKEND_GETS: Counter = Counter::new();

/// SETs issued to the store.
#[metric(name = "oseg_backend_sets")]
pub static BACKEND_SETS: Counter = Counter::new();

/// GETs answered NOT_FOUND.
#[metric(name = "oseg_not_found")]
pub static NOT_FOUND: Counter = Counter::new();

/// Lookups given up after repeated NOT_FOUND answers.
#[metric(name = "oseg_unresolved")]
pub static UNRESOLVED: Counter = Counter::new();

/// Migrations started away from this server.
#[metric(name = "oseg_migrations_out")]
pub static MIGRATIONS_OUT: Counter = Counter::new();

/// Migrations received and durably published.
#[metric(name = "oseg_migrations_in")]
pub static MIGRATIONS_IN: Counter = Counter::new();

/// Migrations waiting on an acknowledgment past the stall threshold.
#[metric(name = "oseg_migration_stalls")]
pub static MIGRATION_STALLS: Counter = Counter::new();

/// Acknowledgments the router refused, held for retry.
#[metric(name = "oseg_acks_parked")]
pub static ACKS_PARKED: Counter = Counter::new();

/// Lookups waiting on the store.
#[metric(name = "oseg_lookups_in_flight")]
pub static LOOKUPS_IN_FLIGHT: Gauge = Gauge::new();

/// End to end latency of sampled lookups in nanoseconds.
#[metric(name = "oseg_sampled_lookup_latency")]
pub static SAMPLED_LOOKUP_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);
