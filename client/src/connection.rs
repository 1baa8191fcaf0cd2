//! One pooled connection's protocol state.
//!
//! The connection does no I/O itself. The pool feeds it socket events and
//! writes the bytes it produces, which keeps every state transition on the
//! pool task.
//!
//! ```text
//!  NeedSocket --connect--> Connecting --connected--> Ready
//!      ^                       |                    |   ^
//!      |                  connect failed      submit|   |write complete
//!      +-----------------------+                    v   |
//!      +------------- failure -------------------- Processing
//! ```
//!
//! Requests are matched to responses per key in FIFO order. A connection
//! may have many requests outstanding across keys and for the same key.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use bytes::{Bytes, BytesMut};
use protocol_craq::{CraqEntry, DataKey, ParseError, Response, append_stripped};

use crate::operation::{Completion, FailureReason, Operation, OperationKind, OperationResult};
use crate::trace::TraceStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; the pool must open one.
    NeedSocket,
    /// A socket is being opened.
    Connecting,
    /// Idle and accepting a request.
    Ready,
    /// A request write is in progress.
    Processing,
}

struct Pending {
    op: Operation,
    deadline: Instant,
}

pub struct Connection {
    endpoint: usize,
    state: ConnectionState,
    timeout: Duration,
    pending: AHashMap<DataKey, VecDeque<Pending>>,
    outstanding: usize,
    recv_buf: BytesMut,
    send_buf: BytesMut,
}

impl Connection {
    pub fn new(endpoint: usize, timeout: Duration) -> Self {
        Self {
            endpoint,
            state: ConnectionState::NeedSocket,
            timeout,
            pending: AHashMap::new(),
            outstanding: 0,
            recv_buf: BytesMut::with_capacity(4096),
            send_buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn endpoint(&self) -> usize {
        self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of requests awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn on_connected(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Ready;
        }
    }

    /// Accept `op` for sending and return its encoded bytes. The operation
    /// is handed back unchanged if the connection is not ready.
    pub fn submit(&mut self, mut op: Operation, now: Instant) -> Result<Bytes, Operation> {
        if self.state != ConnectionState::Ready {
            return Err(op);
        }

        let request = op.request();
        let len = request.encoded_len();
        self.send_buf.resize(len, 0);
        let written = request.encode(&mut self.send_buf[..]);
        self.send_buf.truncate(written);
        let bytes = self.send_buf.split().freeze();

        op.sent_at = Some(now);
        if let Some(trace) = op.trace.as_mut() {
            trace.stamp_at(TraceStage::NetworkSend, now);
        }
        self.pending
            .entry(op.key)
            .or_default()
            .push_back(Pending {
                op,
                deadline: now + self.timeout,
            });
        self.outstanding += 1;
        self.state = ConnectionState::Processing;
        Ok(bytes)
    }

    /// Issue a GET for `key`.
    pub fn get(&mut self, key: DataKey, now: Instant) -> Result<Bytes, Operation> {
        self.submit(Operation::get(key, None), now)
    }

    /// Issue a SET of `entry` under `key`.
    pub fn set(
        &mut self,
        key: DataKey,
        entry: CraqEntry,
        now: Instant,
    ) -> Result<Bytes, Operation> {
        self.submit(Operation::set(key, entry, None), now)
    }

    pub fn on_send_complete(&mut self) {
        if self.state == ConnectionState::Processing {
            self.state = ConnectionState::Ready;
        }
    }

    /// Consume received bytes and return the operations they complete.
    ///
    /// A partial response stays buffered for the next call. On a malformed
    /// stream the error is returned and the caller must [`fail`] the
    /// connection; results parsed before the malformed bytes are kept in
    /// `completed`.
    ///
    /// [`fail`]: Connection::fail
    pub fn on_data(
        &mut self,
        data: &[u8],
        now: Instant,
        completed: &mut Vec<OperationResult>,
    ) -> Result<(), ParseError> {
        append_stripped(&mut self.recv_buf, data);
        loop {
            match Response::parse(&self.recv_buf) {
                Ok((response, consumed)) => {
                    let _ = self.recv_buf.split_to(consumed);
                    if let Some(result) = self.complete(response, now) {
                        completed.push(result);
                    }
                }
                Err(ParseError::Incomplete) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn complete(&mut self, response: Response, now: Instant) -> Option<OperationResult> {
        let wanted = match response {
            Response::Stored { .. } => Some(OperationKind::Set),
            Response::Value { .. } | Response::NotFound { .. } => Some(OperationKind::Get),
            Response::Error { .. } => None,
        };
        let key = *response.key();

        let Some(queue) = self.pending.get_mut(&key) else {
            tracing::trace!(%key, "response with nothing pending");
            return None;
        };
        let Some(pos) = queue
            .iter()
            .position(|p| wanted.is_none_or(|kind| p.op.kind == kind))
        else {
            tracing::trace!(%key, "response matches no pending request kind");
            return None;
        };
        let mut op = queue.remove(pos)?.op;
        if queue.is_empty() {
            self.pending.remove(&key);
        }
        self.outstanding -= 1;

        if let Some(trace) = op.trace.as_mut() {
            trace.stamp_at(TraceStage::NetworkReceive, now);
        }
        let completion = match response {
            Response::Stored { .. } => Completion::Stored,
            Response::Value { entry, .. } => Completion::Found(entry),
            Response::NotFound { .. } => Completion::NotFound,
            Response::Error { .. } => Completion::Failed(FailureReason::Rejected),
        };
        Some(OperationResult {
            operation: op,
            completion,
        })
    }

    /// Fail every request whose deadline has passed.
    pub fn on_tick(&mut self, now: Instant, expired: &mut Vec<OperationResult>) {
        let before = expired.len();
        self.pending.retain(|_, queue| {
            while let Some(pos) = queue.iter().position(|p| p.deadline <= now) {
                if let Some(p) = queue.remove(pos) {
                    expired.push(OperationResult {
                        operation: p.op,
                        completion: Completion::Failed(FailureReason::TimedOut),
                    });
                }
            }
            !queue.is_empty()
        });
        self.outstanding -= expired.len() - before;
    }

    /// Tear down after a socket or protocol failure. Returns every
    /// outstanding operation, oldest first per key, and leaves the
    /// connection needing a new socket.
    pub fn fail(&mut self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self
            .pending
            .drain()
            .flat_map(|(_, queue)| queue.into_iter().map(|p| p.op))
            .collect();
        ops.sort_by_key(|op| op.sent_at);
        self.outstanding = 0;
        self.recv_buf.clear();
        self.send_buf.clear();
        self.state = ConnectionState::NeedSocket;
        ops
    }

    /// Drop all outstanding work without producing results.
    pub fn stop(&mut self) {
        self.pending.clear();
        self.outstanding = 0;
        self.recv_buf.clear();
        self.send_buf.clear();
        self.state = ConnectionState::NeedSocket;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_craq::ObjectId;

    fn key(n: u128) -> DataKey {
        DataKey::new(b'o', &ObjectId::from_u128(n))
    }

    fn ready() -> Connection {
        let mut conn = Connection::new(0, Duration::from_millis(100));
        conn.on_connecting();
        conn.on_connected();
        conn
    }

    fn wire(response: Response) -> Vec<u8> {
        let mut buf = [0u8; 128];
        let len = response.encode(&mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn test_state_transitions() {
        let mut conn = Connection::new(3, Duration::from_millis(100));
        assert_eq!(conn.endpoint(), 3);
        assert_eq!(conn.state(), ConnectionState::NeedSocket);

        // not accepting until connected
        assert!(conn.get(key(1), Instant::now()).is_err());

        conn.on_connecting();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        conn.on_connected();
        assert_eq!(conn.state(), ConnectionState::Ready);

        let bytes = conn.get(key(1), Instant::now()).unwrap();
        assert_eq!(&bytes[..], b"get o00000000000000000000000000000001\r\n");
        assert_eq!(conn.state(), ConnectionState::Processing);
        assert!(conn.get(key(2), Instant::now()).is_err());

        conn.on_send_complete();
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(conn.outstanding(), 1);
    }

    #[test]
    fn test_response_split_across_reads() {
        let mut conn = ready();
        let now = Instant::now();
        conn.get(key(1), now).unwrap();
        conn.on_send_complete();

        let data = wire(Response::Value {
            key: key(1),
            entry: CraqEntry::new(5, 2.0),
        });
        let mut done = Vec::new();
        for chunk in data.chunks(7) {
            conn.on_data(chunk, now, &mut done).unwrap();
        }
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].completion, Completion::Found(CraqEntry::new(5, 2.0)));
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn test_per_key_fifo() {
        let mut conn = ready();
        let now = Instant::now();
        let first = CraqEntry::new(1, 1.0);
        let second = CraqEntry::new(2, 1.0);
        conn.set(key(1), first, now).unwrap();
        conn.on_send_complete();
        conn.set(key(1), second, now).unwrap();
        conn.on_send_complete();

        let mut data = wire(Response::Stored { key: key(1) });
        data.extend(wire(Response::Stored { key: key(1) }));
        let mut done = Vec::new();
        conn.on_data(&data, now, &mut done).unwrap();

        assert_eq!(done.len(), 2);
        assert_eq!(done[0].operation.entry, first);
        assert_eq!(done[1].operation.entry, second);
    }

    #[test]
    fn test_results_follow_request_order_across_keys() {
        let mut conn = ready();
        let now = Instant::now();
        conn.get(key(1), now).unwrap();
        conn.on_send_complete();
        conn.get(key(2), now).unwrap();
        conn.on_send_complete();

        let mut data = wire(Response::Value {
            key: key(1),
            entry: CraqEntry::new(4, 1.0),
        });
        data.extend(wire(Response::NotFound { key: key(2) }));
        let mut done = Vec::new();
        conn.on_data(&data, now, &mut done).unwrap();

        assert_eq!(done.len(), 2);
        assert_eq!(done[0].operation.key, key(1));
        assert_eq!(done[0].completion, Completion::Found(CraqEntry::new(4, 1.0)));
        assert_eq!(done[1].operation.key, key(2));
        assert_eq!(done[1].completion, Completion::NotFound);
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn test_kind_matching() {
        let mut conn = ready();
        let now = Instant::now();
        conn.set(key(1), CraqEntry::new(4, 1.0), now).unwrap();
        conn.on_send_complete();
        conn.get(key(1), now).unwrap();
        conn.on_send_complete();

        // NOT_FOUND skips the older SET and completes the GET
        let mut done = Vec::new();
        conn.on_data(&wire(Response::NotFound { key: key(1) }), now, &mut done)
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].kind(), OperationKind::Get);
        assert_eq!(done[0].completion, Completion::NotFound);

        // ERROR completes the oldest request of either kind
        conn.on_data(&wire(Response::Error { key: key(1) }), now, &mut done)
            .unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(done[1].kind(), OperationKind::Set);
        assert_eq!(done[1].failure(), Some(FailureReason::Rejected));
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn test_unknown_key_is_ignored() {
        let mut conn = ready();
        let mut done = Vec::new();
        conn.on_data(&wire(Response::Stored { key: key(9) }), Instant::now(), &mut done)
            .unwrap();
        assert!(done.is_empty());
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_malformed_stream() {
        let mut conn = ready();
        let now = Instant::now();
        conn.get(key(1), now).unwrap();
        conn.on_send_complete();
        conn.get(key(2), now).unwrap();
        conn.on_send_complete();

        let mut data = wire(Response::NotFound { key: key(1) });
        data.extend_from_slice(b"garbage\r\n");
        let mut done = Vec::new();
        assert!(conn.on_data(&data, now, &mut done).is_err());
        // the response before the garbage still completed
        assert_eq!(done.len(), 1);

        let requeue = conn.fail();
        assert_eq!(requeue.len(), 1);
        assert_eq!(requeue[0].key, key(2));
        assert_eq!(conn.state(), ConnectionState::NeedSocket);
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn test_timeouts() {
        let mut conn = ready();
        let start = Instant::now();
        conn.get(key(1), start).unwrap();
        conn.on_send_complete();
        conn.get(key(2), start + Duration::from_millis(50)).unwrap();
        conn.on_send_complete();

        let mut expired = Vec::new();
        conn.on_tick(start + Duration::from_millis(99), &mut expired);
        assert!(expired.is_empty());

        conn.on_tick(start + Duration::from_millis(100), &mut expired);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key(), &key(1));
        assert_eq!(expired[0].failure(), Some(FailureReason::TimedOut));
        assert_eq!(conn.outstanding(), 1);

        // a late answer for the expired request is dropped
        let mut done = Vec::new();
        conn.on_data(
            &wire(Response::NotFound { key: key(1) }),
            start + Duration::from_millis(120),
            &mut done,
        )
        .unwrap();
        assert!(done.is_empty());

        conn.on_tick(start + Duration::from_millis(150), &mut expired);
        assert_eq!(expired.len(), 2);
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn test_fail_orders_by_send_time() {
        let mut conn = ready();
        let start = Instant::now();
        for (n, at) in [(3, 0), (1, 10), (3, 20), (2, 30)] {
            conn.get(key(n), start + Duration::from_millis(at)).unwrap();
            conn.on_send_complete();
        }
        let keys: Vec<_> = conn.fail().into_iter().map(|op| op.key).collect();
        assert_eq!(keys, vec![key(3), key(1), key(3), key(2)]);
    }
}
