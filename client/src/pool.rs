//! The pool task.
//!
//! A single task owns the submission queue and every [`Connection`]. It
//! reacts to submissions, socket events and a periodic tick, and after each
//! one hands queued operations to ready connections. Failed operations go
//! to the back of the queue until they succeed or exhaust their attempts.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::{ClientConfig, endpoint_for};
use crate::connection::{Connection, ConnectionState};
use crate::latency::ClientLatency;
use crate::metrics::*;
use crate::operation::{Completion, FailureReason, Operation, OperationKind, OperationResult};
use crate::socket::{SocketEvent, SocketEventKind, SocketHandle};
use crate::trace::TraceStage;

const RECONNECT_BASE_MS: u64 = 1000;
const RECONNECT_MAX_MS: u64 = 32_000;

struct Slot {
    connection: Connection,
    socket: Option<SocketHandle>,
    generation: u64,
    connect_failures: u32,
    reconnect_at: Option<Instant>,
}

impl Slot {
    fn is_established(&self) -> bool {
        matches!(
            self.connection.state(),
            ConnectionState::Ready | ConnectionState::Processing
        )
    }
}

pub(crate) struct Pool {
    endpoints: Vec<SocketAddr>,
    slots: Vec<Slot>,
    queue: VecDeque<Operation>,
    queue_len: Arc<AtomicUsize>,
    next_slot: usize,
    connect_timeout: Duration,
    tcp_nodelay: bool,
    tick_interval: Duration,
    max_attempts: Option<u32>,
    results: mpsc::UnboundedSender<OperationResult>,
    events: mpsc::UnboundedSender<SocketEvent>,
    latency: Arc<ClientLatency>,
    completed: Vec<OperationResult>,
}

impl Pool {
    pub fn new(
        config: &ClientConfig,
        endpoints: Vec<SocketAddr>,
        queue_len: Arc<AtomicUsize>,
        results: mpsc::UnboundedSender<OperationResult>,
        events: mpsc::UnboundedSender<SocketEvent>,
        latency: Arc<ClientLatency>,
    ) -> Self {
        let slots = (0..config.connections)
            .map(|slot| Slot {
                connection: Connection::new(
                    endpoint_for(slot, config.connections, endpoints.len()),
                    config.request_timeout(),
                ),
                socket: None,
                generation: 0,
                connect_failures: 0,
                reconnect_at: None,
            })
            .collect();

        Self {
            endpoints,
            slots,
            queue: VecDeque::new(),
            queue_len,
            next_slot: 0,
            connect_timeout: config.connect_timeout(),
            tcp_nodelay: config.tcp_nodelay,
            tick_interval: config.tick_interval(),
            max_attempts: config.max_attempts,
            results,
            events,
            latency,
            completed: Vec::new(),
        }
    }

    pub async fn run(
        mut self,
        mut submissions: mpsc::UnboundedReceiver<Operation>,
        mut events: mpsc::UnboundedReceiver<SocketEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        for index in 0..self.slots.len() {
            self.connect(index);
        }
        tracing::info!(
            connections = self.slots.len(),
            endpoints = self.endpoints.len(),
            "craq pool started"
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                op = submissions.recv() => match op {
                    Some(op) => self.on_submit(op),
                    // every handle is gone
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event, Instant::now()),
                _ = tick.tick() => self.on_tick(Instant::now()),
            }
            self.dispatch(Instant::now());
        }

        self.shutdown();
    }

    fn on_submit(&mut self, op: Operation) {
        self.queue.push_back(op);
        QUEUE_DEPTH.set(self.queue.len() as i64);
    }

    /// Hand queued operations to ready connections, round robin.
    fn dispatch(&mut self, now: Instant) {
        let count = self.slots.len();
        let mut skipped = 0;
        while !self.queue.is_empty() && skipped < count {
            let index = self.next_slot;
            self.next_slot = (self.next_slot + 1) % count;
            if self.slots[index].connection.state() != ConnectionState::Ready {
                skipped += 1;
                continue;
            }

            let Some(mut op) = self.queue.pop_front() else {
                break;
            };
            self.queue_len.fetch_sub(1, Ordering::Relaxed);
            if let Some(trace) = op.trace.as_mut() {
                trace.stamp_at(TraceStage::Dequeued, now);
            }

            let slot = &mut self.slots[index];
            match slot.connection.submit(op, now) {
                Ok(bytes) => {
                    REQUESTS.increment();
                    skipped = 0;
                    let written = slot.socket.as_ref().is_some_and(|s| s.write(bytes));
                    if !written {
                        self.on_failure(index, &"socket task exited");
                    }
                }
                Err(op) => {
                    self.queue.push_front(op);
                    self.queue_len.fetch_add(1, Ordering::Relaxed);
                    skipped += 1;
                }
            }
        }
        QUEUE_DEPTH.set(self.queue.len() as i64);
    }

    fn on_event(&mut self, event: SocketEvent, now: Instant) {
        let SocketEvent {
            slot: index,
            generation,
            kind,
        } = event;
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.generation != generation {
            tracing::trace!(slot = index, generation, "event from replaced socket");
            return;
        }

        match kind {
            SocketEventKind::Connected => self.on_connect(index),
            SocketEventKind::ConnectFailed(e) => self.on_connect_failed(index, &e, now),
            SocketEventKind::Data(bytes) => self.on_data(index, &bytes, now),
            SocketEventKind::SendComplete => slot.connection.on_send_complete(),
            SocketEventKind::Closed => self.on_failure(index, &"closed by peer"),
            SocketEventKind::Failed(e) => self.on_failure(index, &e),
        }
    }

    fn on_connect(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.connection.on_connected();
        slot.connect_failures = 0;
        CONNECTIONS_ACTIVE.increment();
        tracing::debug!(
            slot = index,
            endpoint = %self.endpoints[slot.connection.endpoint()],
            "connected"
        );
    }

    fn on_connect_failed(&mut self, index: usize, error: &std::io::Error, now: Instant) {
        CONNECT_FAILURES.increment();
        let slot = &mut self.slots[index];
        slot.socket = None;
        let stranded = slot.connection.fail();

        let backoff_ms = std::cmp::min(
            RECONNECT_BASE_MS.saturating_mul(2u64.saturating_pow(slot.connect_failures)),
            RECONNECT_MAX_MS,
        );
        slot.connect_failures = slot.connect_failures.saturating_add(1);
        slot.reconnect_at = Some(now + Duration::from_millis(backoff_ms));
        tracing::warn!(
            slot = index,
            endpoint = %self.endpoints[slot.connection.endpoint()],
            error = %error,
            backoff_ms,
            "connect failed"
        );

        for op in stranded {
            self.retry(op, FailureReason::ConnectionLost);
        }
    }

    fn on_data(&mut self, index: usize, data: &[u8], now: Instant) {
        let parsed = self.slots[index]
            .connection
            .on_data(data, now, &mut self.completed);
        self.finish_completed(now);

        if let Err(e) = parsed {
            PARSE_ERRORS.increment();
            self.on_failure(index, &e);
        }
    }

    /// Tear down a failed connection, requeue its work and reconnect at once.
    fn on_failure(&mut self, index: usize, reason: &dyn std::fmt::Display) {
        let slot = &mut self.slots[index];
        if slot.is_established() {
            CONNECTIONS_ACTIVE.decrement();
            CONNECTION_FAILURES.increment();
        }
        slot.socket = None;
        let stranded = slot.connection.fail();
        tracing::warn!(
            slot = index,
            endpoint = %self.endpoints[slot.connection.endpoint()],
            pending = stranded.len(),
            %reason,
            "connection failed"
        );

        for op in stranded {
            self.retry(op, FailureReason::ConnectionLost);
        }
        self.connect(index);
    }

    fn on_tick(&mut self, now: Instant) {
        for index in 0..self.slots.len() {
            self.slots[index]
                .connection
                .on_tick(now, &mut self.completed);
            if self.slots[index].reconnect_at.is_some_and(|at| at <= now) {
                self.connect(index);
            }
        }
        self.finish_completed(now);
    }

    fn connect(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        let addr = self.endpoints[slot.connection.endpoint()];
        slot.generation += 1;
        slot.reconnect_at = None;
        slot.connection.on_connecting();
        slot.socket = Some(SocketHandle::spawn(
            index,
            slot.generation,
            addr,
            self.connect_timeout,
            self.tcp_nodelay,
            self.events.clone(),
        ));
        CONNECTS.increment();
    }

    fn finish_completed(&mut self, now: Instant) {
        let completed = std::mem::take(&mut self.completed);
        for result in completed {
            self.finish(result, now);
        }
    }

    fn finish(&mut self, result: OperationResult, now: Instant) {
        if let Completion::Failed(reason) = result.completion {
            if reason == FailureReason::TimedOut {
                TIMEOUTS.increment();
            }
            tracing::debug!(
                key = %result.key(),
                %reason,
                attempts = result.operation.attempts(),
                "operation failed"
            );
            self.retry(result.operation, reason);
            return;
        }

        RESPONSES.increment();
        if let Some(sent_at) = result.operation.sent_at {
            let ns = now.saturating_duration_since(sent_at).as_nanos() as u64;
            let _ = self.latency.request().increment(ns);
            let _ = match result.kind() {
                OperationKind::Get => self.latency.get().increment(ns),
                OperationKind::Set => self.latency.set().increment(ns),
            };
        }
        self.deliver(result);
    }

    /// Requeue a failed operation, or hand it back once out of attempts.
    fn retry(&mut self, mut op: Operation, reason: FailureReason) {
        op.attempts += 1;
        op.sent_at = None;
        if self.max_attempts.is_some_and(|max| op.attempts >= max) {
            ABANDONED.increment();
            tracing::warn!(key = %op.key, attempts = op.attempts, %reason, "giving up on operation");
            self.deliver(OperationResult {
                operation: op,
                completion: Completion::Failed(reason),
            });
            return;
        }
        REQUEUES.increment();
        self.queue.push_back(op);
        self.queue_len.fetch_add(1, Ordering::Relaxed);
    }

    fn deliver(&self, result: OperationResult) {
        if self.results.send(result).is_err() {
            tracing::trace!("result receiver dropped");
        }
    }

    fn shutdown(&mut self) {
        for slot in &mut self.slots {
            if slot.is_established() {
                CONNECTIONS_ACTIVE.decrement();
            }
            slot.connection.stop();
            slot.socket = None;
        }
        self.queue.clear();
        self.queue_len.store(0, Ordering::Relaxed);
        QUEUE_DEPTH.set(0);
        tracing::info!("craq pool stopped");
    }
}
