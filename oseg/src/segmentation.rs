//! The object segmentation.
//!
//! [`ObjectSegmentation`] answers "which server hosts this object" for the
//! rest of the space server. Objects hosted here are answered at once,
//! others from the location cache, and the rest with a GET against the
//! store. At most one GET per object is outstanding; later lookups attach
//! to it.
//!
//! Migrations are a handshake between two segmentations. The origin calls
//! [`migrate_object`](ObjectSegmentation::migrate_object) and holds lookups
//! for the object. The target calls
//! [`add_object`](ObjectSegmentation::add_object) with `is_migration` set,
//! publishes the new location and only once the store has applied it sends
//! a [`MigrateAck`] back. The origin's
//! [`process_migrate_ack`](ObjectSegmentation::process_migrate_ack) then
//! releases the held lookups.
//!
//! All bookkeeping sits behind one mutex. The cache, backend and listeners
//! are never called with it held.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use craq_client::{
    Completion, CraqClient, OperationKind, OperationResult, TraceStage, TraceToken, TrackId,
};
use location_cache::{CoordinateSegmentation, LocationCache};
use parking_lot::Mutex;
use protocol_craq::{CraqEntry, DataKey, ObjectId, ServerId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::backend::Backend;
use crate::cache::build_cache;
use crate::config::{Config, SegmentationConfig};
use crate::error::OsegError;
use crate::listener::{AckSender, Listener, LocationUpdate, MigrateAck};
use crate::metrics::*;
use crate::trace::{self, TraceSampler};

type Waiter = oneshot::Sender<Result<CraqEntry, OsegError>>;

/// Immediate answer to a lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    /// The location is known.
    Resolved(CraqEntry),
    /// The answer follows through [`Listener::lookup_completed`].
    Pending,
    /// The segmentation is stopped.
    Stopped,
}

enum Transit {
    LookingUp {
        since: Instant,
        not_found: u32,
        retry_at: Option<Instant>,
    },
    MigratingOut {
        to: ServerId,
        since: Instant,
        stall_logged: bool,
    },
}

/// A publish that must become durable before the object counts as local.
#[derive(Clone, Copy)]
struct Publish {
    id: ObjectId,
    radius: f32,
    /// Origin to acknowledge, for a migration.
    ack_to: Option<ServerId>,
}

#[derive(Default)]
struct State {
    /// Objects hosted here, with their radius.
    objects: AHashMap<ObjectId, f32>,
    in_transit: AHashMap<ObjectId, Transit>,
    /// Objects waiting on their publish, by tracking id of that publish.
    receiving: AHashMap<ObjectId, TrackId>,
    publishes: AHashMap<TrackId, Publish>,
    waiters: AHashMap<ObjectId, Vec<Waiter>>,
    /// GETs sent to the store and not yet answered.
    gets: AHashMap<ObjectId, u32>,
    /// Lookups sitting out a NOT_FOUND, oldest first.
    sit_out: VecDeque<(ObjectId, Instant)>,
    parked_acks: Vec<MigrateAck>,
    next_track: u32,
    stopped: bool,
}

impl State {
    fn next_track(&mut self) -> TrackId {
        loop {
            self.next_track = self.next_track.wrapping_add(1);
            if let Some(track) = NonZeroU32::new(self.next_track)
                && !self.publishes.contains_key(&track)
            {
                return track;
            }
        }
    }

    /// Drop the outstanding lookup for `id`, if any.
    fn take_lookup(&mut self, id: &ObjectId) -> bool {
        if matches!(self.in_transit.get(id), Some(Transit::LookingUp { .. })) {
            self.in_transit.remove(id);
            LOOKUPS_IN_FLIGHT.decrement();
            true
        } else {
            false
        }
    }

    /// Callers held on `id`, if any lookup for it was held at all.
    fn take_waiters(&mut self, id: &ObjectId) -> Option<Vec<Waiter>> {
        self.waiters.remove(id)
    }

    fn start_get(&mut self, id: ObjectId) {
        *self.gets.entry(id).or_default() += 1;
    }

    fn finish_get(&mut self, id: &ObjectId) {
        if let Some(count) = self.gets.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.gets.remove(id);
            }
        }
    }

    fn clear_to_migrate(&self, id: &ObjectId) -> bool {
        !self.stopped
            && !self.in_transit.contains_key(id)
            && !self.gets.contains_key(id)
            && !self.receiving.contains_key(id)
            && !self.publishes.values().any(|p| p.id == *id)
    }
}

/// Resolves, caches and hands off object locations for one server.
pub struct ObjectSegmentation<B> {
    local: ServerId,
    prefix: u8,
    sit_out: Duration,
    migration_stall: Duration,
    max_not_found_retries: Option<u32>,
    tick_interval: Duration,
    backend: B,
    cache: Arc<dyn LocationCache>,
    listener: Arc<dyn Listener>,
    acks: Arc<dyn AckSender>,
    sampler: TraceSampler,
    state: Mutex<State>,
}

impl ObjectSegmentation<CraqClient> {
    /// Connect to the store, build the configured cache and spawn the task
    /// that drives the segmentation. Must be called within a tokio runtime.
    pub fn start(
        config: &Config,
        cseg: Arc<dyn CoordinateSegmentation>,
        listener: Arc<dyn Listener>,
        acks: Arc<dyn AckSender>,
    ) -> Result<Arc<Self>, OsegError> {
        config.validate()?;
        let local = config.segmentation.server_id;
        let cache = build_cache(&config.cache, local, cseg)?;

        let (tx, results) = mpsc::unbounded_channel();
        let client = CraqClient::connect(config.backend.clone(), tx)?;
        let oseg = Arc::new(Self::new(
            &config.segmentation,
            client,
            cache,
            listener,
            acks,
        )?);
        tokio::spawn(oseg.clone().run(results));

        tracing::info!(
            server = local,
            endpoints = config.backend.endpoints.len(),
            cache = oseg.cache.name(),
            "object segmentation started"
        );
        Ok(oseg)
    }
}

impl<B: Backend> ObjectSegmentation<B> {
    pub fn new(
        config: &SegmentationConfig,
        backend: B,
        cache: Arc<dyn LocationCache>,
        listener: Arc<dyn Listener>,
        acks: Arc<dyn AckSender>,
    ) -> Result<Self, OsegError> {
        config.validate()?;
        Ok(Self {
            local: config.server_id,
            prefix: config.prefix_byte(),
            sit_out: config.not_found_sit_out(),
            migration_stall: config.migration_stall(),
            max_not_found_retries: config.max_not_found_retries,
            tick_interval: config.tick_interval(),
            backend,
            cache,
            listener,
            acks,
            sampler: TraceSampler::new(config.trace_sample_every),
            state: Mutex::new(State::default()),
        })
    }

    pub fn local_server(&self) -> ServerId {
        self.local
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn key(&self, id: &ObjectId) -> DataKey {
        DataKey::new(self.prefix, id)
    }

    fn local_entry(&self, radius: f32) -> CraqEntry {
        CraqEntry::new(self.local, radius)
    }

    /// Whether `id` is hosted here.
    pub fn is_local(&self, id: &ObjectId) -> bool {
        self.state.lock().objects.contains_key(id)
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    /// Where `id` lives. Anything not answered at once is reported to the
    /// listener when it completes.
    pub fn lookup(&self, id: ObjectId) -> Lookup {
        self.lookup_with(id, None)
    }

    /// Where `id` lives, waiting for the store if needed.
    pub async fn resolve(&self, id: ObjectId) -> Result<CraqEntry, OsegError> {
        let (tx, rx) = oneshot::channel();
        match self.lookup_with(id, Some(tx)) {
            Lookup::Resolved(entry) => Ok(entry),
            Lookup::Stopped => Err(OsegError::Stopped),
            Lookup::Pending => rx.await.unwrap_or(Err(OsegError::Stopped)),
        }
    }

    /// The cached location of `id`, without consulting the store.
    pub fn cache_lookup(&self, id: &ObjectId) -> Option<CraqEntry> {
        self.cache
            .lookup(id)
            .filter(|entry| !entry.is_null() && entry.server() != self.local)
    }

    fn lookup_with(&self, id: ObjectId, mut waiter: Option<Waiter>) -> Lookup {
        LOOKUPS.increment();
        let mut token = self.sampler.start(id);

        let held = self.check_held(&mut self.state.lock(), &id, &mut waiter);
        if let Some(answer) = held {
            return Self::answered(answer, token);
        }

        token.stamp(TraceStage::CacheCheckBegin);
        let cached = self.cache_lookup(&id);
        token.stamp(TraceStage::CacheCheckEnd);
        if let Some(entry) = cached {
            CACHE_HITS.increment();
            return Self::answered(Lookup::Resolved(entry), token);
        }
        CACHE_MISSES.increment();

        let held = {
            let mut state = self.state.lock();
            // state may have changed while the cache was consulted
            let held = self.check_held(&mut state, &id, &mut waiter);
            if held.is_none() {
                state.in_transit.insert(
                    id,
                    Transit::LookingUp {
                        since: Instant::now(),
                        not_found: 0,
                        retry_at: None,
                    },
                );
                state.waiters.entry(id).or_default().extend(waiter);
                state.start_get(id);
                LOOKUPS_IN_FLIGHT.increment();
            }
            held
        };
        if let Some(answer) = held {
            return Self::answered(answer, token);
        }

        self.issue_get(id, token);
        Lookup::Pending
    }

    /// Answer from local state, or attach to work already under way.
    fn check_held(
        &self,
        state: &mut State,
        id: &ObjectId,
        waiter: &mut Option<Waiter>,
    ) -> Option<Lookup> {
        if state.stopped {
            return Some(Lookup::Stopped);
        }
        if let Some(&radius) = state.objects.get(id) {
            LOOKUPS_LOCAL.increment();
            return Some(Lookup::Resolved(self.local_entry(radius)));
        }
        let held = match state.in_transit.get(id) {
            Some(Transit::LookingUp { .. }) => {
                LOOKUPS_DEDUPLICATED.increment();
                true
            }
            Some(Transit::MigratingOut { .. }) => true,
            None => state.receiving.contains_key(id),
        };
        if !held {
            return None;
        }
        state.waiters.entry(*id).or_default().extend(waiter.take());
        Some(Lookup::Pending)
    }

    fn answered(answer: Lookup, mut token: TraceToken) -> Lookup {
        if let Lookup::Resolved(_) = answer {
            token.stamp(TraceStage::LookupReturnBegin);
            trace::finish(&mut token);
        }
        answer
    }

    fn issue_get(&self, id: ObjectId, mut token: TraceToken) {
        token.set_queue_len(self.backend.queue_len());
        token.stamp(TraceStage::Enqueued);
        BACKEND_GETS.increment();
        if let Err(e) = self.backend.get(self.key(&id), Some(Box::new(token))) {
            tracing::debug!(object = %id, error = %e, "lookup not issued");
            self.state.lock().finish_get(&id);
            self.fail_lookup(id, || OsegError::Stopped, false);
        }
    }

    /// End the outstanding lookup for `id` without a location.
    fn fail_lookup(&self, id: ObjectId, error: impl Fn() -> OsegError, notify: bool) {
        let waiters = {
            let mut state = self.state.lock();
            if !state.take_lookup(&id) {
                return;
            }
            state.take_waiters(&id)
        };
        for waiter in waiters.into_iter().flatten() {
            let _ = waiter.send(Err(error()));
        }
        if notify {
            self.listener.lookup_completed(&id, CraqEntry::null());
        }
    }

    fn complete(&self, id: ObjectId, entry: CraqEntry, waiters: Vec<Waiter>) {
        for waiter in waiters {
            let _ = waiter.send(Ok(entry));
        }
        self.listener.lookup_completed(&id, entry);
    }

    // ── Store results ───────────────────────────────────────────────────

    /// Feed a result from the backend into the segmentation.
    pub fn handle_result(&self, result: OperationResult) {
        match result.kind() {
            OperationKind::Get => self.on_get_result(result),
            OperationKind::Set => self.on_set_result(result),
        }
    }

    pub fn on_get_result(&self, mut result: OperationResult) {
        let id = result.key().object_id();
        let mut token = result.operation.trace.take();
        if let Some(token) = token.as_mut() {
            token.stamp(TraceStage::LookupReturnBegin);
        }

        self.state.lock().finish_get(&id);
        if !self.settled_locally(&id) {
            match result.completion {
                Completion::Found(entry) => self.on_found(id, entry),
                Completion::NotFound => self.on_not_found(id),
                Completion::Failed(reason) => {
                    tracing::warn!(object = %id, %reason, "lookup failed");
                    self.fail_lookup(id, move || OsegError::Backend(reason), true);
                }
                Completion::Stored => {
                    tracing::trace!(object = %id, "stored completion for a get");
                }
            }
        }

        if let Some(token) = token.as_mut() {
            trace::finish(token);
        }
    }

    /// Settle a finished GET for an object this server has taken over
    /// since. Returns false when the result still needs handling.
    fn settled_locally(&self, id: &ObjectId) -> bool {
        let (entry, waiters) = {
            let mut state = self.state.lock();
            if state.stopped {
                return true;
            }
            if state.receiving.contains_key(id) {
                // held until the publish is durable
                state.take_lookup(id);
                return true;
            }
            let Some(&radius) = state.objects.get(id) else {
                return false;
            };
            let was_looking = state.take_lookup(id);
            let waiters = state.take_waiters(id);
            if !was_looking && waiters.is_none() {
                return true;
            }
            (self.local_entry(radius), waiters.unwrap_or_default())
        };
        self.complete(*id, entry, waiters);
        true
    }

    fn on_found(&self, id: ObjectId, entry: CraqEntry) {
        let waiters = {
            let mut state = self.state.lock();
            // late answers never release callers held by a migration
            if !state.take_lookup(&id) {
                return;
            }
            state.take_waiters(&id)
        };
        if !entry.is_null() && entry.server() != self.local {
            self.cache.insert(id, entry);
        }
        self.complete(id, entry, waiters.unwrap_or_default());
    }

    fn on_not_found(&self, id: ObjectId) {
        NOT_FOUND.increment();
        let now = Instant::now();
        let gave_up = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(Transit::LookingUp {
                since,
                not_found,
                retry_at,
            }) = state.in_transit.get_mut(&id)
            else {
                return;
            };
            *not_found += 1;
            if self
                .max_not_found_retries
                .is_some_and(|max| *not_found >= max)
            {
                Some((*not_found, now.saturating_duration_since(*since)))
            } else {
                let at = now + self.sit_out;
                *retry_at = Some(at);
                state.sit_out.push_back((id, at));
                None
            }
        };

        if let Some((attempts, waited)) = gave_up {
            UNRESOLVED.increment();
            tracing::warn!(
                object = %id,
                attempts,
                waited_ms = waited.as_millis() as u64,
                "giving up on lookup"
            );
            self.fail_lookup(id, || OsegError::Unresolved, true);
        } else {
            tracing::debug!(object = %id, sit_out_ms = self.sit_out.as_millis() as u64, "not found");
        }
    }

    pub fn on_set_result(&self, result: OperationResult) {
        let id = result.key().object_id();
        let Some(track) = result.track() else {
            if let Some(reason) = result.failure() {
                tracing::warn!(object = %id, %reason, "publish failed");
            }
            return;
        };
        let publish = self.state.lock().publishes.remove(&track);
        let Some(publish) = publish else {
            tracing::trace!(object = %id, track = track.get(), "result for unknown publish");
            return;
        };

        if let Some(reason) = result.failure() {
            // the object only becomes local once its location is durable
            tracing::warn!(object = %id, %reason, "publish failed, reissuing");
            self.state.lock().publishes.insert(track, publish);
            if let Err(e) = self.issue_set(id, self.local_entry(publish.radius), Some(track)) {
                tracing::debug!(object = %id, error = %e, "publish not reissued");
            }
            return;
        }

        let waiters = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            if state.receiving.get(&id) != Some(&track) {
                tracing::debug!(object = %id, track = track.get(), "superseded publish");
                return;
            }
            state.receiving.remove(&id);
            state.objects.insert(id, publish.radius);
            state.take_lookup(&id);
            state.take_waiters(&id)
        };
        self.cache.remove(&id);

        match publish.ack_to {
            Some(origin) => {
                MIGRATIONS_IN.increment();
                self.send_ack(MigrateAck {
                    object: id,
                    origin,
                    target: self.local,
                    radius: publish.radius,
                });
                tracing::debug!(object = %id, origin, "migration published");
                self.listener.migration_acknowledged(&id, origin, self.local);
            }
            None => self.listener.write_finished(&id, self.local),
        }

        if let Some(waiters) = waiters {
            self.complete(id, self.local_entry(publish.radius), waiters);
        }
    }

    fn send_ack(&self, ack: MigrateAck) {
        if let Err(ack) = self.acks.send_ack(ack) {
            ACKS_PARKED.increment();
            tracing::debug!(object = %ack.object, origin = ack.origin, "ack refused, parked");
            self.state.lock().parked_acks.push(ack);
        }
    }

    fn issue_set(
        &self,
        id: ObjectId,
        entry: CraqEntry,
        track: Option<TrackId>,
    ) -> Result<(), OsegError> {
        BACKEND_SETS.increment();
        self.backend.set(self.key(&id), entry, track).map_err(|e| {
            if let Some(track) = track {
                self.state.lock().publishes.remove(&track);
            }
            OsegError::from(e)
        })
    }

    // ── Ownership and migration ─────────────────────────────────────────

    /// Host `id` here and publish its location.
    ///
    /// A migrated object is held until the publish is durable; then
    /// `ack_to` is acknowledged. Otherwise the object is local at once and
    /// the publish is not tracked.
    pub fn add_object(
        &self,
        id: ObjectId,
        radius: f32,
        ack_to: ServerId,
        is_migration: bool,
    ) -> Result<(), OsegError> {
        if is_migration {
            tracing::debug!(object = %id, origin = ack_to, "receiving object");
            return self.publish_tracked(Publish {
                id,
                radius,
                ack_to: Some(ack_to),
            });
        }

        let waiters = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(OsegError::Stopped);
            }
            state.objects.insert(id, radius);
            state.take_lookup(&id);
            state.take_waiters(&id)
        };
        self.cache.remove(&id);
        if let Some(waiters) = waiters {
            self.complete(id, self.local_entry(radius), waiters);
        }
        self.issue_set(id, self.local_entry(radius), None)
    }

    /// Place a new object here. It is local once its first publish is
    /// durable, at which point the listener's `write_finished` fires.
    pub fn new_object_add(&self, id: ObjectId, radius: f32) -> Result<(), OsegError> {
        self.publish_tracked(Publish {
            id,
            radius,
            ack_to: None,
        })
    }

    fn publish_tracked(&self, publish: Publish) -> Result<(), OsegError> {
        let track = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(OsegError::Stopped);
            }
            let track = state.next_track();
            state.receiving.insert(publish.id, track);
            state.publishes.insert(track, publish);
            track
        };
        self.cache.remove(&publish.id);
        self.issue_set(publish.id, self.local_entry(publish.radius), Some(track))
    }

    /// Stop hosting `id`. Returns whether it was hosted here.
    pub fn remove_object(&self, id: &ObjectId) -> bool {
        let removed = self.state.lock().objects.remove(id).is_some();
        self.cache.remove(id);
        removed
    }

    /// Whether `id` may start migrating: nothing else is under way for it.
    pub fn clear_to_migrate(&self, id: &ObjectId) -> bool {
        self.state.lock().clear_to_migrate(id)
    }

    /// Begin handing `id` to `destination.server()`. Lookups are held until
    /// the target acknowledges. Refused, returning false, when `id` is not
    /// hosted here or another operation for it is under way.
    pub fn migrate_object(&self, id: ObjectId, destination: CraqEntry) -> bool {
        let mut state = self.state.lock();
        if !state.objects.contains_key(&id) {
            tracing::warn!(
                object = %id,
                target = destination.server(),
                "migrating an object not hosted here"
            );
            return false;
        }
        if !state.clear_to_migrate(&id) {
            tracing::warn!(object = %id, target = destination.server(), "migration refused");
            return false;
        }
        state.objects.remove(&id);
        state.in_transit.insert(
            id,
            Transit::MigratingOut {
                to: destination.server(),
                since: Instant::now(),
                stall_logged: false,
            },
        );
        MIGRATIONS_OUT.increment();
        tracing::debug!(object = %id, target = destination.server(), "migrating object");
        true
    }

    /// A migration target has published the object's new location.
    pub fn process_migrate_ack(&self, ack: MigrateAck) {
        let entry = CraqEntry::new(ack.target, ack.radius);
        let (was_migrating, waiters) = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            let was_migrating = matches!(
                state.in_transit.get(&ack.object),
                Some(Transit::MigratingOut { .. })
            );
            if was_migrating {
                state.in_transit.remove(&ack.object);
            }
            (was_migrating, state.take_waiters(&ack.object))
        };

        if ack.target != self.local {
            self.cache.insert(ack.object, entry);
        }
        if let Some(waiters) = waiters {
            self.complete(ack.object, entry, waiters);
        }
        if was_migrating {
            self.listener
                .migration_acknowledged(&ack.object, self.local, ack.target);
        } else {
            tracing::debug!(object = %ack.object, target = ack.target, "ack for unknown migration");
        }
    }

    /// A peer announced where an object lives.
    pub fn process_update(&self, update: LocationUpdate) {
        if self.is_stopped() || update.entry.is_null() || update.entry.server() == self.local {
            return;
        }
        self.cache.insert(update.object, update.entry);
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    /// Reissue lookups whose sit-out elapsed, retry parked acknowledgments
    /// and report stalled migrations.
    pub fn tick(&self, now: Instant) {
        let (retry, acks) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.stopped {
                return;
            }

            let mut retry = Vec::new();
            while let Some(&(id, at)) = state.sit_out.front() {
                if at > now {
                    break;
                }
                state.sit_out.pop_front();
                if let Some(Transit::LookingUp { retry_at, .. }) = state.in_transit.get_mut(&id)
                    && *retry_at == Some(at)
                {
                    *retry_at = None;
                    retry.push(id);
                }
            }
            for id in &retry {
                state.start_get(*id);
            }

            for (id, transit) in state.in_transit.iter_mut() {
                if let Transit::MigratingOut {
                    to,
                    since,
                    stall_logged,
                } = transit
                {
                    let waited = now.saturating_duration_since(*since);
                    if !*stall_logged && waited >= self.migration_stall {
                        *stall_logged = true;
                        MIGRATION_STALLS.increment();
                        tracing::warn!(
                            object = %id,
                            target = *to,
                            waited_ms = waited.as_millis() as u64,
                            "migration not acknowledged"
                        );
                    }
                }
            }

            (retry, std::mem::take(&mut state.parked_acks))
        };

        for id in retry {
            self.issue_get(id, self.sampler.start(id));
        }
        for ack in acks {
            self.send_ack(ack);
        }
    }

    /// Lookups queued for the store or sitting out a NOT_FOUND.
    pub fn pushback(&self) -> usize {
        self.backend.queue_len() + self.state.lock().sit_out.len()
    }

    /// Stop the backend and fail every held lookup. Later operations are
    /// refused.
    pub fn stop(&self) {
        let waiters = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.sit_out.clear();
            state.parked_acks.clear();
            state.in_transit.retain(|_, transit| {
                let looking = matches!(transit, Transit::LookingUp { .. });
                if looking {
                    LOOKUPS_IN_FLIGHT.decrement();
                }
                !looking
            });
            std::mem::take(&mut state.waiters)
        };
        self.backend.stop();
        for waiter in waiters.into_iter().flat_map(|(_, waiters)| waiters) {
            let _ = waiter.send(Err(OsegError::Stopped));
        }
        tracing::info!(server = self.local, "object segmentation stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Drive the segmentation: apply backend results as they arrive and
    /// tick. Returns once stopped or the result channel closes.
    pub async fn run(self: Arc<Self>, mut results: mpsc::UnboundedReceiver<OperationResult>) {
        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = results.recv() => match result {
                    Some(result) => self.handle_result(result),
                    None => break,
                },
                _ = tick.tick() => {
                    if self.is_stopped() {
                        break;
                    }
                    self.tick(Instant::now());
                }
            }
        }
        tracing::debug!(server = self.local, "segmentation task exited");
    }
}
