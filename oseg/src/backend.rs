use std::sync::Arc;

use craq_client::{ClientError, CraqClient, TraceToken, TrackId};
use protocol_craq::{CraqEntry, DataKey};

/// The asynchronous store behind the segmentation.
///
/// Results of accepted operations are delivered out of band to the channel
/// passed to [`ObjectSegmentation::run`](crate::ObjectSegmentation::run).
pub trait Backend: Send + Sync {
    fn get(&self, key: DataKey, trace: Option<Box<TraceToken>>) -> Result<(), ClientError>;

    fn set(&self, key: DataKey, entry: CraqEntry, track: Option<TrackId>)
    -> Result<(), ClientError>;

    /// Operations accepted and not yet sent.
    fn queue_len(&self) -> usize;

    fn stop(&self);
}

impl Backend for CraqClient {
    fn get(&self, key: DataKey, trace: Option<Box<TraceToken>>) -> Result<(), ClientError> {
        CraqClient::get(self, key, trace)
    }

    fn set(
        &self,
        key: DataKey,
        entry: CraqEntry,
        track: Option<TrackId>,
    ) -> Result<(), ClientError> {
        CraqClient::set(self, key, entry, track)
    }

    fn queue_len(&self) -> usize {
        CraqClient::queue_len(self)
    }

    fn stop(&self) {
        CraqClient::stop(self)
    }
}

impl<T: Backend + ?Sized> Backend for Arc<T> {
    fn get(&self, key: DataKey, trace: Option<Box<TraceToken>>) -> Result<(), ClientError> {
        (**self).get(key, trace)
    }

    fn set(
        &self,
        key: DataKey,
        entry: CraqEntry,
        track: Option<TrackId>,
    ) -> Result<(), ClientError> {
        (**self).set(key, entry, track)
    }

    fn queue_len(&self) -> usize {
        (**self).queue_len()
    }

    fn stop(&self) {
        (**self).stop()
    }
}
