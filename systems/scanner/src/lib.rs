#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Discovery system that registers encounters the registry does not know yet.
//!
//! Scans enumerate the live encounters of monitored zones and queue unknown
//! ones. Registration itself is spread across steps: a drain loop registers
//! at most a fixed number of queued encounters per step and re-arms itself
//! until the queue is empty.

use raid_helper_core::{
    BatchQueue, DiscoveryError, DrainStatus, RaidKey, ScanMode, ScheduleError, Settings, Signal,
    StepScheduler, Task, TaskHandle, WorldView, ZoneId,
};
use raid_helper_registry::RaidRegistry;
use tracing::{debug, info, warn};

/// Configuration parameters required to construct the scanner.
#[derive(Clone, Debug)]
pub struct Config {
    zones: Vec<ZoneId>,
    mode: ScanMode,
    frequency: u64,
    batch_limit: usize,
}

impl Config {
    /// Creates a configuration from explicit values.
    #[must_use]
    pub fn new(zones: Vec<ZoneId>, mode: ScanMode, frequency: u64, batch_limit: usize) -> Self {
        Self {
            zones,
            mode,
            frequency,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Derives the scanner configuration from engine settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.zones.clone(),
            settings.scan_mode,
            settings.world_check_frequency,
            settings.batch_limit(),
        )
    }
}

/// Counters describing one drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Encounters newly registered.
    pub registered: usize,
    /// Entries dropped because the encounter ended or was already known.
    pub skipped: usize,
    /// Loop state after the pass; `None` if the continuation was rejected.
    pub status: Option<DrainStatus>,
}

/// Batched encounter discovery.
#[derive(Debug)]
pub struct Scanner {
    config: Config,
    pending: BatchQueue<RaidKey>,
    sweep: Option<TaskHandle>,
}

impl Scanner {
    /// Creates a scanner with an empty discovery queue.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pending: BatchQueue::new("discovery"),
            sweep: None,
        }
    }

    /// Arms the periodic sweep when the scan mode asks for one.
    ///
    /// Returns the sweep handle, or `None` when sweeps are disabled or
    /// already armed.
    pub fn start(&mut self, scheduler: &mut StepScheduler<Task>) -> Option<TaskHandle> {
        if !self.config.mode.periodic() {
            return None;
        }
        if let Some(handle) = self.sweep {
            warn!(task = handle.get(), "periodic zone sweep already armed");
            return None;
        }
        let handle = scheduler.schedule_repeating(1, self.config.frequency, Task::ScanZones);
        self.sweep = Some(handle);
        Some(handle)
    }

    /// Cancels the periodic sweep and any in-flight drain.
    pub fn stop(&mut self, scheduler: &mut StepScheduler<Task>) {
        if let Some(handle) = self.sweep.take() {
            let _ = scheduler.cancel(handle);
        }
        let _ = self.pending.cancel(scheduler);
    }

    /// Number of discoveries waiting for registration.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Reports whether a drain continuation is armed.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.pending.drain_handle().is_some()
    }

    /// Reacts to a host lifecycle signal.
    ///
    /// Encounter activity rescans the zone when event scanning is enabled.
    /// A finished or stopped encounter is purged from the queue so a stale
    /// discovery cannot register it again.
    pub fn handle_signal(
        &mut self,
        signal: &Signal,
        registry: &RaidRegistry,
        world: &dyn WorldView,
        scheduler: &mut StepScheduler<Task>,
    ) -> usize {
        match signal {
            Signal::EncounterTriggered { zone } | Signal::WaveSpawned { zone } => {
                if self.config.mode.on_events() {
                    self.scan_zone(zone, registry, world, scheduler)
                } else {
                    0
                }
            }
            Signal::EncounterFinished { handle } | Signal::EncounterStopped { handle } => {
                let _ = self.forget(handle.key());
                0
            }
            Signal::BeaconActivated { .. } => 0,
        }
    }

    /// Drops a queued discovery. Returns whether it was queued.
    pub fn forget(&mut self, key: &RaidKey) -> bool {
        let purged = self.pending.purge(key);
        if purged {
            debug!(raid = %key, "dropped queued discovery for ended encounter");
        }
        purged
    }

    /// Scans every monitored zone. Returns the number of newly queued encounters.
    pub fn scan_all(
        &mut self,
        registry: &RaidRegistry,
        world: &dyn WorldView,
        scheduler: &mut StepScheduler<Task>,
    ) -> usize {
        let mut queued = 0;
        for zone in &self.config.zones {
            queued += enqueue_unregistered(&mut self.pending, zone, registry, world);
        }
        self.ensure_draining(scheduler);
        queued
    }

    /// Scans one zone. Unmonitored zones are ignored.
    pub fn scan_zone(
        &mut self,
        zone: &ZoneId,
        registry: &RaidRegistry,
        world: &dyn WorldView,
        scheduler: &mut StepScheduler<Task>,
    ) -> usize {
        if !self.config.zones.contains(zone) {
            debug!(%zone, "ignoring scan request for unmonitored zone");
            return 0;
        }
        let queued = enqueue_unregistered(&mut self.pending, zone, registry, world);
        self.ensure_draining(scheduler);
        queued
    }

    /// Runs one drain pass for continuation `handle`.
    pub fn drain(
        &mut self,
        handle: TaskHandle,
        registry: &mut RaidRegistry,
        world: &dyn WorldView,
        scheduler: &mut StepScheduler<Task>,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        let batch = match self.pending.take_batch(handle, self.config.batch_limit) {
            Ok(batch) => batch,
            Err(error) => {
                warn!(%error, "rejected discovery drain continuation");
                return report;
            }
        };

        for key in batch {
            let Some(encounter) = world.encounter(&key) else {
                debug!(raid = %key, "encounter ended before registration");
                report.skipped += 1;
                continue;
            };
            match registry.register_if_absent(encounter, scheduler.now()) {
                Ok(true) => {
                    info!(raid = %key, "registered encounter");
                    report.registered += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(error) => {
                    warn!(%error, "dropped malformed discovery");
                    report.skipped += 1;
                }
            }
        }

        let status = self.pending.finish_pass(scheduler, Task::DrainDiscoveries);
        if let DrainStatus::Rearmed { remaining } = status {
            debug!(remaining, "discovery drain continues next step");
        }
        report.status = Some(status);
        report
    }

    fn ensure_draining(&mut self, scheduler: &mut StepScheduler<Task>) {
        if self.pending.is_empty() {
            return;
        }
        if let Err(error @ ScheduleError::DrainInFlight { .. }) =
            self.pending.start_drain(scheduler, Task::DrainDiscoveries)
        {
            warn!(%error, "discovery drain not restarted");
        }
    }
}

fn enqueue_unregistered(
    pending: &mut BatchQueue<RaidKey>,
    zone: &ZoneId,
    registry: &RaidRegistry,
    world: &dyn WorldView,
) -> usize {
    let mut queued = 0;
    for encounter in world.active_encounters(zone) {
        if encounter.zone() != zone {
            let error = DiscoveryError::ZoneMismatch {
                key: encounter.key().clone(),
                listed: zone.clone(),
            };
            warn!(%error, "dropped malformed discovery");
            continue;
        }
        if let Err(error) = encounter.validate() {
            warn!(%error, "dropped malformed discovery");
            continue;
        }
        if registry.is_registered(encounter.key()) {
            continue;
        }
        if pending.push(encounter.key().clone()) {
            queued += 1;
        }
    }
    queued
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_clamps_zero_batch_limit() {
        let config = Config::new(Vec::new(), ScanMode::Periodic, 100, 0);
        assert_eq!(config.batch_limit, 1);
    }

    #[test]
    fn event_mode_does_not_arm_sweep() {
        let mut scheduler = StepScheduler::new();
        let mut scanner = Scanner::new(Config::new(Vec::new(), ScanMode::Events, 100, 5));
        assert!(scanner.start(&mut scheduler).is_none());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn second_start_keeps_single_sweep() {
        let mut scheduler = StepScheduler::new();
        let mut scanner = Scanner::new(Config::new(Vec::new(), ScanMode::Both, 100, 5));
        assert!(scanner.start(&mut scheduler).is_some());
        assert!(scanner.start(&mut scheduler).is_none());
        assert_eq!(scheduler.pending(), 1);
    }
}
