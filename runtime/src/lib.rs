#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Composition root that owns every Raid Helper component.
//!
//! The host builds one [`RaidHelper`], forwards lifecycle [`Signal`]s to
//! [`RaidHelper::handle_signal`] and calls [`RaidHelper::step`] once per
//! simulation step. Both append the commands the host must execute to the
//! caller's output buffer.

use std::sync::Arc;

use raid_helper_core::{
    Activator, HostCommand, RaidKey, Settings, Signal, Step, StepScheduler, Task, WorldView,
};
use raid_helper_registry::{query, RaidRegistry};
use raid_helper_system_cache::{self as cache, CacheManager, Offload};
use raid_helper_system_scanner::{self as scanner, Scanner};
use raid_helper_system_state_updater::{self as state_updater, PassReport, StateUpdater};
use raid_helper_system_teleport::{self as teleport, CoordinatorPool};
use tracing::{debug, info};

/// Counters describing the work done by one [`RaidHelper::step`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Step that was executed.
    pub step: Step,
    /// Encounters queued for registration by sweeps.
    pub discovered: usize,
    /// Encounters registered by discovery drains.
    pub registered: usize,
    /// Counters from evaluation passes and slices.
    pub evaluation: PassReport,
    /// Cache refresh jobs started.
    pub refreshes_started: usize,
    /// Completed cache refreshes written back.
    pub refreshes_applied: usize,
    /// Creatures teleported by recalls.
    pub teleported: usize,
    /// Cooldowns that expired.
    pub cooldowns_expired: usize,
}

/// Raid tracking engine bound to one host.
pub struct RaidHelper {
    settings: Settings,
    world: Arc<dyn WorldView>,
    registry: RaidRegistry,
    scheduler: StepScheduler<Task>,
    scanner: Scanner,
    cache: CacheManager,
    updater: StateUpdater,
    pool: CoordinatorPool,
}

impl std::fmt::Debug for RaidHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaidHelper")
            .field("now", &self.scheduler.now())
            .field("registry", &self.registry)
            .field("scanner", &self.scanner)
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl RaidHelper {
    /// Creates an engine whose cache refresh placement follows the settings.
    #[must_use]
    pub fn new(settings: Settings, world: Arc<dyn WorldView>) -> Self {
        let offload = cache::offload_for(settings.cache_refresh);
        Self::with_offload(settings, world, offload)
    }

    /// Creates an engine with an explicit refresh offload strategy.
    #[must_use]
    pub fn with_offload(
        settings: Settings,
        world: Arc<dyn WorldView>,
        offload: Box<dyn Offload>,
    ) -> Self {
        let cache = CacheManager::new(
            cache::Config::from_settings(&settings),
            Arc::clone(&world),
            offload,
        );
        Self {
            scanner: Scanner::new(scanner::Config::from_settings(&settings)),
            updater: StateUpdater::new(state_updater::Config::from_settings(&settings)),
            pool: CoordinatorPool::new(
                teleport::Config::from_settings(&settings),
                settings.max_pool_size,
            ),
            cache,
            world,
            registry: RaidRegistry::new(),
            scheduler: StepScheduler::new(),
            settings,
        }
    }

    /// Arms the periodic discovery sweep and evaluation pass.
    pub fn start(&mut self) {
        let sweep = self.scanner.start(&mut self.scheduler);
        let pass = self.updater.start(&mut self.scheduler);
        info!(
            zones = self.settings.zones.len(),
            sweep = sweep.is_some(),
            pass = pass.is_some(),
            "raid helper started"
        );
    }

    /// Cancels every loop and pending task. Registered records are kept, but
    /// their cooldowns end with the expiry tasks that owned them.
    pub fn shutdown(&mut self) {
        self.scanner.stop(&mut self.scheduler);
        self.updater.stop(&mut self.scheduler);
        self.cache.stop(&mut self.scheduler);
        self.scheduler.clear();
        let cooldowns = self
            .registry
            .iter_mut()
            .filter_map(|record| record.clear_cooldown())
            .count();
        info!(
            records = self.registry.len(),
            cooldowns, "raid helper stopped"
        );
    }

    /// Reacts to a lifecycle signal from the host.
    pub fn handle_signal(&mut self, signal: &Signal, out: &mut Vec<HostCommand>) {
        let _ = self.scanner.handle_signal(
            signal,
            &self.registry,
            &*self.world,
            &mut self.scheduler,
        );

        match signal {
            Signal::EncounterTriggered { .. } | Signal::WaveSpawned { .. } => {}
            Signal::EncounterFinished { handle } | Signal::EncounterStopped { handle } => {
                self.unregister(handle.key());
            }
            Signal::BeaconActivated {
                actor,
                zone,
                coordinate,
            } => {
                if !self.settings.monitors(zone) {
                    debug!(%zone, "ignoring beacon in unmonitored zone");
                    return;
                }
                let Activator::Observer(observer) = *actor else {
                    debug!(%zone, "ignoring beacon rung by non-observer");
                    return;
                };
                let _ = self.pool.on_beacon_activated(
                    observer,
                    zone,
                    *coordinate,
                    &mut self.registry,
                    &mut self.scheduler,
                    out,
                );
            }
        }
    }

    /// Executes one simulation step.
    ///
    /// Completed cache refreshes are written back first, then every task due
    /// on the new step runs in the order it was queued.
    pub fn step(&mut self, out: &mut Vec<HostCommand>) -> StepReport {
        let mut report = StepReport {
            refreshes_applied: self.cache.apply_completed(&mut self.registry),
            ..StepReport::default()
        };

        for (handle, task) in self.scheduler.advance() {
            match task {
                Task::ScanZones => {
                    report.discovered += self.scanner.scan_all(
                        &self.registry,
                        &*self.world,
                        &mut self.scheduler,
                    );
                }
                Task::DrainDiscoveries => {
                    report.registered += self
                        .scanner
                        .drain(handle, &mut self.registry, &*self.world, &mut self.scheduler)
                        .registered;
                }
                Task::EvaluateRaids => {
                    let pass = self.updater.run_pass(
                        &mut self.registry,
                        &mut self.cache,
                        &mut self.scheduler,
                        out,
                    );
                    report.evaluation.absorb(pass);
                }
                Task::DrainEvaluations => {
                    let slice = self.updater.drain(
                        handle,
                        &mut self.registry,
                        &mut self.cache,
                        &mut self.scheduler,
                        out,
                    );
                    report.evaluation.absorb(slice);
                }
                Task::DrainCacheRefreshes => {
                    report.refreshes_started += self
                        .cache
                        .drain(handle, &self.registry, &mut self.scheduler)
                        .unwrap_or_default();
                }
                Task::Recall { key, destination } => {
                    report.teleported += teleport::recall(
                        &key,
                        destination,
                        &self.registry,
                        &mut self.cache,
                        &mut self.scheduler,
                        out,
                    );
                }
                Task::ExpireCooldown { key } => {
                    if teleport::expire_cooldown(handle, &key, &mut self.registry) {
                        debug!(raid = %key, "cooldown expired");
                        report.cooldowns_expired += 1;
                    }
                }
            }
        }

        report.step = self.scheduler.now();
        report
    }

    /// Authoritative registry.
    #[must_use]
    pub const fn registry(&self) -> &RaidRegistry {
        &self.registry
    }

    /// Read-only snapshot of every record.
    #[must_use]
    pub fn raid_view(&self) -> query::RaidView {
        query::raid_view(&self.registry)
    }

    /// Last executed step.
    #[must_use]
    pub const fn now(&self) -> Step {
        self.scheduler.now()
    }

    /// Settings the engine was built with.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Teleport coordinator pool.
    #[must_use]
    pub const fn pool(&self) -> &CoordinatorPool {
        &self.pool
    }

    /// Number of tasks waiting on the scheduler.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    fn unregister(&mut self, key: &RaidKey) {
        let _ = self.cache.forget(key);
        let _ = self.updater.forget(key);
        let Some(record) = self.registry.unregister(key) else {
            debug!(raid = %key, "end signal for unregistered encounter");
            return;
        };
        if let Some(expiry) = record.cooldown_task() {
            let _ = self.scheduler.cancel(expiry);
        }
        info!(raid = %key, "unregistered encounter");
    }
}
