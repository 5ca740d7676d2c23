#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Beacon activation handling: range and cooldown checks, delayed recalls and
//! the single aggregate feedback message per activation.

use std::sync::Arc;

use raid_helper_core::{
    Coordinate, HostCommand, Messages, ObserverId, RaidKey, Settings, StepScheduler, Task,
    TaskHandle, ZoneId,
};
use raid_helper_registry::RaidRegistry;
use raid_helper_system_cache::CacheManager;
use tracing::{debug, info, warn};

/// Configuration shared by every pooled coordinator.
#[derive(Clone, Debug)]
pub struct Config {
    radius_squared: f64,
    height_offset: f64,
    teleport_delay: u64,
    bell_cooldown: u64,
    messages: Messages,
}

impl Config {
    /// Creates a configuration from explicit values.
    #[must_use]
    pub fn new(
        radius: f64,
        height_offset: f64,
        teleport_delay: u64,
        bell_cooldown: u64,
        messages: Messages,
    ) -> Self {
        Self {
            radius_squared: radius * radius,
            height_offset,
            teleport_delay,
            bell_cooldown,
            messages,
        }
    }

    /// Derives the coordinator configuration from engine settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.radius,
            settings.height_offset,
            settings.teleport_delay,
            settings.bell_cooldown,
            settings.messages.clone(),
        )
    }

    /// Point above `beacon` where recalled creatures appear.
    #[must_use]
    pub fn recall_destination(&self, beacon: Coordinate) -> Coordinate {
        beacon.offset(0.0, self.height_offset, 0.0)
    }
}

/// Aggregate result of one beacon activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// No unlocked encounter within range.
    NoneInRange,
    /// Every unlocked encounter within range is cooling down.
    AllCoolingDown {
        /// Encounters skipped because of their cooldown.
        skipped: usize,
    },
    /// Some encounters were recalled, others were cooling down.
    PartialCooldown {
        /// Encounters whose recall was scheduled.
        recalled: usize,
        /// Encounters skipped because of their cooldown.
        skipped: usize,
    },
    /// Every unlocked encounter within range was recalled.
    Recalled {
        /// Encounters whose recall was scheduled.
        recalled: usize,
    },
}

impl ActivationOutcome {
    fn classify(recalled: usize, skipped: usize) -> Self {
        match (recalled, skipped) {
            (0, 0) => Self::NoneInRange,
            (0, skipped) => Self::AllCoolingDown { skipped },
            (recalled, 0) => Self::Recalled { recalled },
            (recalled, skipped) => Self::PartialCooldown { recalled, skipped },
        }
    }

    /// Number of recalls scheduled by the activation.
    #[must_use]
    pub const fn recalled(&self) -> usize {
        match self {
            Self::NoneInRange | Self::AllCoolingDown { .. } => 0,
            Self::PartialCooldown { recalled, .. } | Self::Recalled { recalled } => *recalled,
        }
    }

    /// Feedback text sent to the activating observer, if any.
    #[must_use]
    pub fn message<'m>(&self, messages: &'m Messages) -> Option<&'m str> {
        match self {
            Self::NoneInRange => None,
            Self::AllCoolingDown { .. } => Some(messages.cooldown.as_str()),
            Self::PartialCooldown { .. } => Some(messages.partial_cooldown.as_str()),
            Self::Recalled { .. } => Some(messages.success.as_str()),
        }
    }
}

/// Handles one beacon activation at a time, reusing its scratch buffers.
#[derive(Debug)]
pub struct TeleportCoordinator {
    config: Arc<Config>,
    eligible: Vec<RaidKey>,
    cooling: Vec<RaidKey>,
}

impl TeleportCoordinator {
    /// Creates a coordinator with empty scratch buffers.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            eligible: Vec::new(),
            cooling: Vec::new(),
        }
    }

    /// Schedules recalls for every unlocked, in-range encounter of `zone`
    /// that is not cooling down, and reports back to `observer`.
    ///
    /// Each recall runs `teleport_delay` steps later. The cooldown starts
    /// immediately and expires `bell_cooldown` steps later.
    pub fn activate(
        &mut self,
        observer: ObserverId,
        zone: &ZoneId,
        beacon: Coordinate,
        registry: &mut RaidRegistry,
        scheduler: &mut StepScheduler<Task>,
        out: &mut Vec<HostCommand>,
    ) -> ActivationOutcome {
        self.eligible.clear();
        self.cooling.clear();

        for record in registry.records_in_zone(zone) {
            if !record.teleport_enabled() {
                continue;
            }
            if record.anchor().distance_squared(beacon) > self.config.radius_squared {
                continue;
            }
            if record.cooldown_active() {
                self.cooling.push(record.key().clone());
            } else {
                self.eligible.push(record.key().clone());
            }
        }

        let destination = self.config.recall_destination(beacon);
        for key in &self.eligible {
            let Some(record) = registry.get_mut(key) else {
                continue;
            };
            let _ = scheduler.schedule_once(
                self.config.teleport_delay,
                Task::Recall {
                    key: key.clone(),
                    destination,
                },
            );
            let expiry = scheduler.schedule_once(
                self.config.bell_cooldown,
                Task::ExpireCooldown { key: key.clone() },
            );
            if let Some(previous) = record.begin_cooldown(expiry) {
                let _ = scheduler.cancel(previous);
            }
            debug!(raid = %key, "recall scheduled");
        }

        let outcome = ActivationOutcome::classify(self.eligible.len(), self.cooling.len());
        if let Some(text) = outcome.message(&self.config.messages) {
            out.push(HostCommand::SendMessage {
                observer,
                text: text.to_owned(),
            });
        }
        info!(
            %zone,
            observer = observer.get(),
            recalled = self.eligible.len(),
            cooling = self.cooling.len(),
            "beacon activated"
        );
        outcome
    }
}

/// Bounded pool of idle coordinators.
#[derive(Debug)]
pub struct CoordinatorPool {
    config: Arc<Config>,
    idle: Vec<TeleportCoordinator>,
    max_size: usize,
    constructed: usize,
}

impl CoordinatorPool {
    /// Creates an empty pool keeping at most `max_size` idle coordinators.
    #[must_use]
    pub fn new(config: Config, max_size: usize) -> Self {
        Self {
            config: Arc::new(config),
            idle: Vec::with_capacity(max_size),
            max_size,
            constructed: 0,
        }
    }

    /// Hands out an idle coordinator, constructing one if none is free.
    pub fn acquire(&mut self) -> TeleportCoordinator {
        if let Some(coordinator) = self.idle.pop() {
            return coordinator;
        }
        self.constructed += 1;
        TeleportCoordinator::new(Arc::clone(&self.config))
    }

    /// Returns a coordinator. Returns `false` if the pool was full and the
    /// coordinator was discarded.
    pub fn release(&mut self, coordinator: TeleportCoordinator) -> bool {
        if self.idle.len() >= self.max_size {
            return false;
        }
        self.idle.push(coordinator);
        true
    }

    /// Handles a beacon activation with a pooled coordinator.
    pub fn on_beacon_activated(
        &mut self,
        observer: ObserverId,
        zone: &ZoneId,
        beacon: Coordinate,
        registry: &mut RaidRegistry,
        scheduler: &mut StepScheduler<Task>,
        out: &mut Vec<HostCommand>,
    ) -> ActivationOutcome {
        let mut coordinator = self.acquire();
        let outcome = coordinator.activate(observer, zone, beacon, registry, scheduler, out);
        let _ = self.release(coordinator);
        outcome
    }

    /// Number of idle coordinators.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Number of coordinators constructed over the pool's lifetime.
    #[must_use]
    pub const fn constructed(&self) -> usize {
        self.constructed
    }

    /// Maximum number of idle coordinators kept.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Moves every current creature of the encounter to `destination`.
///
/// Returns the number of teleports emitted. Encounters unregistered or gone
/// stale since the recall was scheduled are skipped.
pub fn recall(
    key: &RaidKey,
    destination: Coordinate,
    registry: &RaidRegistry,
    cache: &mut CacheManager,
    scheduler: &mut StepScheduler<Task>,
    out: &mut Vec<HostCommand>,
) -> usize {
    let Some(record) = registry.get(key) else {
        debug!(raid = %key, "recall target no longer registered");
        return 0;
    };
    let now = scheduler.now();
    let Some(creatures) = cache.creatures_for(record, now, scheduler) else {
        warn!(raid = %key, "recall target went stale");
        return 0;
    };

    for creature in creatures.iter() {
        out.push(HostCommand::Teleport {
            creature: *creature,
            zone: key.zone().clone(),
            destination,
        });
    }
    info!(raid = %key, creatures = creatures.len(), "creatures recalled");
    creatures.len()
}

/// Ends the cooldown owned by expiry task `handle`.
///
/// Returns `false` if the record is gone or a newer cooldown owns it.
pub fn expire_cooldown(handle: TaskHandle, key: &RaidKey, registry: &mut RaidRegistry) -> bool {
    let Some(record) = registry.get_mut(key) else {
        debug!(raid = %key, "cooldown expired for unregistered encounter");
        return false;
    };
    record.end_cooldown(handle)
}
