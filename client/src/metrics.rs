//! Connection pool metrics.

use metriken::{Counter, Gauge, metric};

/// Requests written to the store.
#[metric(name = "craq_requests")]
pub static REQUESTS: Counter = Counter::new();

/// Responses matched to a pending request.
#[metric(name = "craq_responses")]
pub static RESPONSES: Counter = Counter::new();

/// Requests that exceeded the request timeout.
#[metric(name = "craq_timeouts")]
pub static TIMEOUTS: Counter = Counter::new();

/// Failed operations put back on the queue.
#[metric(name = "craq_requeues")]
pub static REQUEUES: Counter = Counter::new();

/// Operations handed back failed after exhausting their attempts.
#[metric(name = "craq_abandoned")]
pub static ABANDONED: Counter = Counter::new();

/// Malformed response streams.
#[metric(name = "craq_parse_errors")]
pub static PARSE_ERRORS: Counter = Counter::new();

/// Socket connect attempts.
#[metric(name = "craq_connects")]
pub static CONNECTS: Counter = Counter::new();

/// Socket connect attempts that failed.
#[metric(name = "craq_connect_failures")]
pub static CONNECT_FAILURES: Counter = Counter::new();

/// Established connections lost to an error or close.
#[metric(name = "craq_connection_failures")]
pub static CONNECTION_FAILURES: Counter = Counter::new();

/// Connections currently established.
#[metric(name = "craq_connections_active")]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

/// Operations queued and not yet written.
#[metric(name = "craq_queue_depth")]
pub static QUEUE_DEPTH: Gauge = Gauge::new();
