//! Pooled asynchronous client for the CRAQ object location store.
//!
//! A [`CraqClient`] owns a fixed pool of TCP connections driven by a single
//! tokio task. GETs and SETs are queued without waiting and their results
//! are delivered, in completion order, on a channel supplied at connect
//! time. Every submitted operation produces exactly one result unless the
//! client is stopped first: failures are retried on another connection
//! until they succeed or run out of attempts.
//!
//! # Example
//!
//! ```no_run
//! use craq_client::{ClientConfig, Completion, CraqClient};
//! use protocol_craq::{CraqEntry, DataKey, ObjectId};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), craq_client::ClientError> {
//! let (tx, mut results) = mpsc::unbounded_channel();
//! let client = CraqClient::connect(
//!     ClientConfig {
//!         endpoints: vec!["127.0.0.1:10498".to_string()],
//!         connections: 4,
//!         ..Default::default()
//!     },
//!     tx,
//! )?;
//!
//! let key = DataKey::new(b'o', &ObjectId::from_u128(7));
//! client.set(key, CraqEntry::new(3, 1.0), None)?;
//! client.get(key, None)?;
//!
//! while let Some(result) = results.recv().await {
//!     if let Completion::Found(entry) = result.completion {
//!         assert_eq!(entry.server(), 3);
//!         break;
//!     }
//! }
//! client.stop();
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod latency;
pub mod metrics;
mod operation;
mod pool;
mod socket;
mod trace;

pub use config::{ClientConfig, endpoint_for};
pub use connection::{Connection, ConnectionState};
pub use error::ClientError;
pub use latency::ClientLatency;
pub use operation::{
    Completion, FailureReason, Operation, OperationKind, OperationResult, TrackId,
};
pub use trace::{TraceStage, TraceToken};

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use protocol_craq::{CraqEntry, DataKey};
use tokio::sync::{mpsc, watch};

use pool::Pool;

/// Handle to a running connection pool.
///
/// Clone-able, Send + Sync. All clones share the same pool.
#[derive(Clone)]
pub struct CraqClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    submissions: mpsc::UnboundedSender<Operation>,
    queue_len: Arc<AtomicUsize>,
    stop: watch::Sender<bool>,
    latency: Arc<ClientLatency>,
}

impl CraqClient {
    /// Start a pool against `config.endpoints`, delivering results to
    /// `results`. Must be called within a tokio runtime.
    ///
    /// Returns immediately; connections are opened by the pool task.
    pub fn connect(
        config: ClientConfig,
        results: mpsc::UnboundedSender<OperationResult>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let addr = endpoint
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| ClientError::Resolve(endpoint.clone()))?;
            endpoints.push(addr);
        }

        let queue_len = Arc::new(AtomicUsize::new(0));
        let latency = Arc::new(ClientLatency::new());
        let (submissions, submission_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);

        let pool = Pool::new(
            &config,
            endpoints,
            queue_len.clone(),
            results,
            events,
            latency.clone(),
        );
        runtime.spawn(pool.run(submission_rx, event_rx, stop_rx));

        Ok(CraqClient {
            inner: Arc::new(ClientInner {
                submissions,
                queue_len,
                stop,
                latency,
            }),
        })
    }

    /// Queue a GET for `key`. The optional trace token is returned with
    /// the result.
    pub fn get(&self, key: DataKey, trace: Option<Box<TraceToken>>) -> Result<(), ClientError> {
        self.submit(Operation::get(key, trace))
    }

    /// Queue a SET of `entry` under `key`. `track` is returned with the
    /// result.
    pub fn set(
        &self,
        key: DataKey,
        entry: CraqEntry,
        track: Option<TrackId>,
    ) -> Result<(), ClientError> {
        self.submit(Operation::set(key, entry, track))
    }

    fn submit(&self, op: Operation) -> Result<(), ClientError> {
        if *self.inner.stop.borrow() {
            return Err(ClientError::Stopped);
        }
        self.inner.queue_len.fetch_add(1, Ordering::Relaxed);
        if self.inner.submissions.send(op).is_err() {
            self.inner.queue_len.fetch_sub(1, Ordering::Relaxed);
            return Err(ClientError::Stopped);
        }
        Ok(())
    }

    /// Operations queued and not yet written to a connection.
    pub fn queue_len(&self) -> usize {
        self.inner.queue_len.load(Ordering::Relaxed)
    }

    /// Stop the pool. Queued and outstanding operations are dropped without
    /// results and later submissions are refused.
    pub fn stop(&self) {
        self.inner.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stop.borrow()
    }

    pub fn latency(&self) -> &ClientLatency {
        &self.inner.latency
    }
}
