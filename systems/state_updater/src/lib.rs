#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Periodic re-evaluation of every registered encounter.
//!
//! Each evaluation feeds the current creature presence into
//! [`RaidRecord::evaluate`](raid_helper_registry::RaidRecord::evaluate) and
//! nudges nearby observers with a status-bar hint while recall is unlocked.

use raid_helper_core::{
    BatchQueue, DrainStatus, HostCommand, RaidKey, Settings, StepScheduler, Task, TaskHandle,
    UpdateMode,
};
use raid_helper_registry::{RaidRegistry, Transition};
use raid_helper_system_cache::CacheManager;
use tracing::{debug, info, warn};

/// Configuration parameters required to construct the state updater.
#[derive(Clone, Debug)]
pub struct Config {
    mode: UpdateMode,
    frequency: u64,
    threshold: u32,
    batch_limit: usize,
    ring_message: String,
}

impl Config {
    /// Creates a configuration from explicit values.
    #[must_use]
    pub fn new(
        mode: UpdateMode,
        frequency: u64,
        threshold: u32,
        batch_limit: usize,
        ring_message: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            frequency,
            threshold,
            batch_limit: batch_limit.max(1),
            ring_message: ring_message.into(),
        }
    }

    /// Derives the updater configuration from engine settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.update_mode,
            settings.raid_check_frequency,
            settings.bell_work_delay,
            settings.batch_limit(),
            settings.messages.ring.clone(),
        )
    }
}

/// Counters describing one evaluation pass or drain slice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records evaluated.
    pub evaluated: usize,
    /// Records that unlocked recall for the first time.
    pub unlocked: usize,
    /// Records whose wave-clear reset ran.
    pub cleared: usize,
    /// Records skipped because their host handle went stale.
    pub stale: usize,
    /// Status-bar notifications emitted.
    pub notified: usize,
}

impl PassReport {
    /// Adds the counters of `other` to this report.
    pub fn absorb(&mut self, other: PassReport) {
        self.evaluated += other.evaluated;
        self.unlocked += other.unlocked;
        self.cleared += other.cleared;
        self.stale += other.stale;
        self.notified += other.notified;
    }
}

/// Recall eligibility state machine driver.
#[derive(Debug)]
pub struct StateUpdater {
    config: Config,
    working: BatchQueue<RaidKey>,
    pass: Option<TaskHandle>,
}

impl StateUpdater {
    /// Creates an idle updater.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            working: BatchQueue::new("state update"),
            pass: None,
        }
    }

    /// Arms the periodic evaluation pass. Returns `None` if already armed.
    pub fn start(&mut self, scheduler: &mut StepScheduler<Task>) -> Option<TaskHandle> {
        if let Some(handle) = self.pass {
            warn!(task = handle.get(), "state update pass already armed");
            return None;
        }
        let frequency = self.config.frequency;
        let handle = scheduler.schedule_repeating(frequency, frequency, Task::EvaluateRaids);
        self.pass = Some(handle);
        Some(handle)
    }

    /// Cancels the periodic pass and any batched drain.
    pub fn stop(&mut self, scheduler: &mut StepScheduler<Task>) {
        if let Some(handle) = self.pass.take() {
            let _ = scheduler.cancel(handle);
        }
        let _ = self.working.cancel(scheduler);
    }

    /// Drops `key` from the batched working set.
    pub fn forget(&mut self, key: &RaidKey) -> bool {
        self.working.purge(key)
    }

    /// Number of keys waiting in the batched working set.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.working.len()
    }

    /// Runs one periodic pass.
    ///
    /// In full mode every record is evaluated now. In batched mode the
    /// registry keys are queued and evaluated by the drain loop over the
    /// following steps.
    pub fn run_pass(
        &mut self,
        registry: &mut RaidRegistry,
        cache: &mut CacheManager,
        scheduler: &mut StepScheduler<Task>,
        out: &mut Vec<HostCommand>,
    ) -> PassReport {
        match self.config.mode {
            UpdateMode::Full => {
                let mut report = PassReport::default();
                for key in registry.keys() {
                    report.absorb(self.evaluate(&key, registry, cache, scheduler, out));
                }
                report
            }
            UpdateMode::Batched => {
                for key in registry.keys() {
                    let _ = self.working.push(key);
                }
                if self.working.is_empty() {
                    return PassReport::default();
                }
                if let Err(error) = self.working.start_drain(scheduler, Task::DrainEvaluations) {
                    warn!(%error, "state update drain not restarted");
                }
                PassReport::default()
            }
        }
    }

    /// Evaluates one bounded slice of the working set for continuation `handle`.
    pub fn drain(
        &mut self,
        handle: TaskHandle,
        registry: &mut RaidRegistry,
        cache: &mut CacheManager,
        scheduler: &mut StepScheduler<Task>,
        out: &mut Vec<HostCommand>,
    ) -> PassReport {
        let batch = match self.working.take_batch(handle, self.config.batch_limit) {
            Ok(batch) => batch,
            Err(error) => {
                warn!(%error, "rejected state update continuation");
                return PassReport::default();
            }
        };

        let mut report = PassReport::default();
        for key in batch {
            report.absorb(self.evaluate(&key, registry, cache, scheduler, out));
        }

        if let DrainStatus::Rearmed { remaining } =
            self.working.finish_pass(scheduler, Task::DrainEvaluations)
        {
            debug!(remaining, "state update drain continues next step");
        }
        report
    }

    /// Evaluates a single record.
    pub fn evaluate(
        &self,
        key: &RaidKey,
        registry: &mut RaidRegistry,
        cache: &mut CacheManager,
        scheduler: &mut StepScheduler<Task>,
        out: &mut Vec<HostCommand>,
    ) -> PassReport {
        let mut report = PassReport::default();
        let now = scheduler.now();

        let Some(record) = registry.get(key) else {
            debug!(raid = %key, "skipping evaluation of unregistered encounter");
            return report;
        };
        let Some(present) = cache
            .creatures_for(record, now, scheduler)
            .map(|creatures| !creatures.is_empty())
        else {
            warn!(raid = %key, "encounter handle went stale; skipping evaluation");
            report.stale = 1;
            return report;
        };

        let Some(record) = registry.get_mut(key) else {
            return report;
        };
        report.evaluated = 1;

        match record.evaluate(present, self.config.threshold) {
            Transition::Locked | Transition::Idle => {}
            Transition::Cleared => {
                debug!(raid = %key, "wave cleared; recall locked");
                report.cleared = 1;
            }
            Transition::Unlocked { first } => {
                if first {
                    info!(raid = %key, ticks = record.tick_counter(), "beacon recall unlocked");
                    report.unlocked = 1;
                }
                let record = &*record;
                for observer in cache.observers_for(record, now).iter() {
                    out.push(HostCommand::SendStatusBar {
                        observer: *observer,
                        text: self.config.ring_message.clone(),
                    });
                    report.notified += 1;
                }
            }
        }
        report
    }
}
