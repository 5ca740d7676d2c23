#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Time-to-live cache of the creatures and observers around each encounter.
//!
//! Readers go through [`CacheManager::creatures_for`] and
//! [`CacheManager::observers_for`]. A fresh entry is served as is; an expired
//! one is answered with a live host lookup and queued for refresh. Refresh
//! jobs run through an [`Offload`] strategy and report back over a channel;
//! [`CacheManager::apply_completed`] is the only place cache fields are
//! written, and it runs on the stepping context.

use std::{
    borrow::Cow,
    collections::{BTreeSet, HashSet},
    fmt,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
};

use raid_helper_core::{
    BatchQueue, CreatureId, DrainStatus, ObserverId, RaidKey, RefreshMode, Settings, Step,
    StepScheduler, Task, TaskHandle, WorldView,
};
use raid_helper_registry::{RaidRecord, RaidRegistry};
use tracing::{debug, warn};

/// Unit of refresh work handed to an [`Offload`] strategy.
pub type RefreshJob = Box<dyn FnOnce() + Send + 'static>;

/// Strategy deciding where refresh jobs execute.
pub trait Offload: Send + Sync + fmt::Debug {
    /// Runs or schedules `job`.
    fn spawn(&self, job: RefreshJob);
}

/// Runs refresh jobs synchronously on the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl Offload for Inline {
    fn spawn(&self, job: RefreshJob) {
        job();
    }
}

/// Runs refresh jobs on the global rayon pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct Background;

impl Offload for Background {
    fn spawn(&self, job: RefreshJob) {
        rayon::spawn(job);
    }
}

/// Builds the offload strategy selected by `mode`.
#[must_use]
pub fn offload_for(mode: RefreshMode) -> Box<dyn Offload> {
    match mode {
        RefreshMode::Inline => Box::new(Inline),
        RefreshMode::Background => Box::new(Background),
    }
}

/// Configuration parameters required to construct the cache manager.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    ttl: u64,
    radius: f64,
    batch_limit: usize,
}

impl Config {
    /// Creates a configuration from explicit values.
    #[must_use]
    pub fn new(ttl: u64, radius: f64, batch_limit: usize) -> Self {
        Self {
            ttl,
            radius,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Derives the cache configuration from engine settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.cache_expire_time,
            settings.radius,
            settings.batch_limit(),
        )
    }
}

#[derive(Debug)]
struct CacheRefresh {
    key: RaidKey,
    creatures: Option<BTreeSet<CreatureId>>,
    observers: BTreeSet<ObserverId>,
    captured_at: Step,
}

/// Owner of the cache refresh pipeline.
pub struct CacheManager {
    config: Config,
    world: Arc<dyn WorldView>,
    offload: Box<dyn Offload>,
    queue: BatchQueue<RaidKey>,
    in_flight: HashSet<RaidKey>,
    sender: Sender<CacheRefresh>,
    receiver: Receiver<CacheRefresh>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("offload", &self.offload)
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a cache manager reading from `world`.
    #[must_use]
    pub fn new(config: Config, world: Arc<dyn WorldView>, offload: Box<dyn Offload>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            config,
            world,
            offload,
            queue: BatchQueue::new("cache refresh"),
            in_flight: HashSet::new(),
            sender,
            receiver,
        }
    }

    /// Creatures of the encounter, or `None` if its host handle went stale.
    ///
    /// Serves the cached set while fresh, including an empty one. Otherwise
    /// the host is asked directly and a refresh is requested.
    pub fn creatures_for<'r>(
        &mut self,
        record: &'r RaidRecord,
        now: Step,
        scheduler: &mut StepScheduler<Task>,
    ) -> Option<Cow<'r, BTreeSet<CreatureId>>> {
        if record.cache().is_fresh(now, self.config.ttl) {
            return Some(Cow::Borrowed(record.cache().creatures()));
        }
        let _ = self.request_refresh(record.key(), scheduler);
        self.world.living_creatures(record.key()).map(Cow::Owned)
    }

    /// Observers near the encounter anchor.
    ///
    /// Serves the cached set while fresh; otherwise answers with a live
    /// lookup. Expired entries are refreshed by the creature path.
    pub fn observers_for<'r>(&self, record: &'r RaidRecord, now: Step) -> Cow<'r, BTreeSet<ObserverId>> {
        if record.cache().is_fresh(now, self.config.ttl) {
            return Cow::Borrowed(record.cache().observers());
        }
        Cow::Owned(
            self.world
                .nearby_observers(record.zone(), record.anchor(), self.config.radius),
        )
    }

    /// Queues a refresh for `key` and arms the refresh drain if idle.
    ///
    /// Returns whether the request was accepted; keys already queued or
    /// being computed are ignored. A non-empty queue without a drain, as left
    /// behind by [`CacheManager::stop`], is re-armed either way.
    pub fn request_refresh(&mut self, key: &RaidKey, scheduler: &mut StepScheduler<Task>) -> bool {
        let accepted = !self.in_flight.contains(key) && self.queue.push(key.clone());
        if !self.queue.is_empty() && self.queue.drain_handle().is_none() {
            if let Err(error) = self.queue.start_drain(scheduler, Task::DrainCacheRefreshes) {
                warn!(%error, "cache refresh drain not restarted");
            }
        }
        accepted
    }

    /// Starts up to one batch of refresh jobs for continuation `handle`.
    ///
    /// Returns the number of jobs handed to the offload strategy, or `None`
    /// if the continuation was rejected.
    pub fn drain(
        &mut self,
        handle: TaskHandle,
        registry: &RaidRegistry,
        scheduler: &mut StepScheduler<Task>,
    ) -> Option<usize> {
        let batch = match self.queue.take_batch(handle, self.config.batch_limit) {
            Ok(batch) => batch,
            Err(error) => {
                warn!(%error, "rejected cache refresh continuation");
                return None;
            }
        };

        let now = scheduler.now();
        let mut started = 0;
        for key in batch {
            let Some(record) = registry.get(&key) else {
                debug!(raid = %key, "refresh requested for unregistered encounter");
                continue;
            };
            let anchor = record.anchor();
            let world = Arc::clone(&self.world);
            let sender = self.sender.clone();
            let radius = self.config.radius;
            let _ = self.in_flight.insert(key.clone());
            started += 1;
            self.offload.spawn(Box::new(move || {
                let creatures = world.living_creatures(&key);
                let observers = world.nearby_observers(key.zone(), anchor, radius);
                let _ = sender.send(CacheRefresh {
                    key,
                    creatures,
                    observers,
                    captured_at: now,
                });
            }));
        }

        if let DrainStatus::Rearmed { remaining } =
            self.queue.finish_pass(scheduler, Task::DrainCacheRefreshes)
        {
            debug!(remaining, "cache refresh drain continues next step");
        }
        Some(started)
    }

    /// Writes every completed refresh into the registry.
    ///
    /// Results for encounters unregistered in the meantime, or whose host
    /// handle went stale, are dropped. Returns the number of entries stored.
    pub fn apply_completed(&mut self, registry: &mut RaidRegistry) -> usize {
        let mut stored = 0;
        while let Ok(refresh) = self.receiver.try_recv() {
            let _ = self.in_flight.remove(&refresh.key);
            let Some(record) = registry.get_mut(&refresh.key) else {
                debug!(raid = %refresh.key, "dropped refresh for unregistered encounter");
                continue;
            };
            let Some(creatures) = refresh.creatures else {
                debug!(raid = %refresh.key, "dropped refresh for stale encounter");
                continue;
            };
            if record.store_cache(creatures, refresh.observers, refresh.captured_at) {
                stored += 1;
            }
        }
        stored
    }

    /// Drops any queued refresh for `key`.
    pub fn forget(&mut self, key: &RaidKey) -> bool {
        let _ = self.in_flight.remove(key);
        self.queue.purge(key)
    }

    /// Cancels the refresh drain, leaving queued requests in place.
    pub fn stop(&mut self, scheduler: &mut StepScheduler<Task>) {
        let _ = self.queue.cancel(scheduler);
    }

    /// Number of refresh requests waiting for a job slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of refresh jobs started but not yet applied.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
