//! Operations submitted to the pool and the results it delivers.

use std::fmt;
use std::num::NonZeroU32;
use std::time::Instant;

use protocol_craq::{CraqEntry, DataKey, Request};

use crate::trace::TraceToken;

/// Caller-chosen id attached to a SET so its result can be matched to the
/// state that issued it.
pub type TrackId = NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Get,
    Set,
}

/// A GET or SET on its way to, or back from, the store.
#[derive(Debug)]
pub struct Operation {
    pub key: DataKey,
    pub kind: OperationKind,
    /// The record written by a SET. Null for a GET.
    pub entry: CraqEntry,
    pub track: Option<TrackId>,
    pub trace: Option<Box<TraceToken>>,
    pub(crate) attempts: u32,
    pub(crate) sent_at: Option<Instant>,
}

impl Operation {
    pub fn get(key: DataKey, trace: Option<Box<TraceToken>>) -> Self {
        Self {
            key,
            kind: OperationKind::Get,
            entry: CraqEntry::null(),
            track: None,
            trace,
            attempts: 0,
            sent_at: None,
        }
    }

    pub fn set(key: DataKey, entry: CraqEntry, track: Option<TrackId>) -> Self {
        Self {
            key,
            kind: OperationKind::Set,
            entry,
            track,
            trace: None,
            attempts: 0,
            sent_at: None,
        }
    }

    /// Number of times this operation has failed and been requeued.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn request(&self) -> Request<'_> {
        match self.kind {
            OperationKind::Get => Request::get(&self.key),
            OperationKind::Set => Request::set(&self.key, self.entry),
        }
    }
}

/// Why an operation produced no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No response arrived within the request timeout.
    TimedOut,
    /// The connection failed with the request outstanding.
    ConnectionLost,
    /// The store answered `ERROR`.
    Rejected,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TimedOut => f.write_str("timed out"),
            FailureReason::ConnectionLost => f.write_str("connection lost"),
            FailureReason::Rejected => f.write_str("rejected by store"),
        }
    }
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    /// A GET found a record.
    Found(CraqEntry),
    /// A GET found nothing.
    NotFound,
    /// A SET was applied.
    Stored,
    Failed(FailureReason),
}

/// A finished operation handed back to the owner of the pool.
#[derive(Debug)]
pub struct OperationResult {
    pub operation: Operation,
    pub completion: Completion,
}

impl OperationResult {
    pub fn kind(&self) -> OperationKind {
        self.operation.kind
    }

    pub fn key(&self) -> &DataKey {
        &self.operation.key
    }

    pub fn track(&self) -> Option<TrackId> {
        self.operation.track
    }

    /// The record found by a GET, or written by a stored SET.
    pub fn entry(&self) -> Option<CraqEntry> {
        match self.completion {
            Completion::Found(entry) => Some(entry),
            Completion::Stored => Some(self.operation.entry),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.completion, Completion::Found(_) | Completion::Stored)
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self.completion {
            Completion::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
