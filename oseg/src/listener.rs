//! Collaborators notified by the segmentation.

use protocol_craq::{CraqEntry, ObjectId, ServerId};

/// Receives the outcome of lookups and publishes.
///
/// Called from the task driving the segmentation, never with internal
/// locks held. Every method defaults to doing nothing.
pub trait Listener: Send + Sync {
    /// A lookup that could not be answered at once has finished. `entry`
    /// is null when the location could not be resolved.
    fn lookup_completed(&self, id: &ObjectId, entry: CraqEntry) {
        let _ = (id, entry);
    }

    /// The first publish of an object added with `new_object_add` is
    /// durable.
    fn write_finished(&self, id: &ObjectId, server: ServerId) {
        let _ = (id, server);
    }

    /// A migration from `from` to `to` completed. Fires on the receiving
    /// server once its publish is durable and on the origin once the
    /// acknowledgment arrives.
    fn migration_acknowledged(&self, id: &ObjectId, from: ServerId, to: ServerId) {
        let _ = (id, from, to);
    }
}

/// A listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl Listener for NoopListener {}

/// Sent by a migration target to the origin once it has published the
/// object's new location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MigrateAck {
    pub object: ObjectId,
    /// The server the object left, and the recipient of this message.
    pub origin: ServerId,
    /// The server now hosting the object.
    pub target: ServerId,
    pub radius: f32,
}

/// A location pushed by a peer, inserted straight into the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationUpdate {
    pub object: ObjectId,
    pub entry: CraqEntry,
}

/// Delivers acknowledgments to peer servers.
pub trait AckSender: Send + Sync {
    /// Queue `ack` for delivery to `ack.origin`. A router applying
    /// backpressure hands the message back; it is retried on the next tick.
    fn send_ack(&self, ack: MigrateAck) -> Result<(), MigrateAck>;
}
