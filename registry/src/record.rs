//! Per-encounter record and its recall eligibility state machine.

use std::collections::BTreeSet;

use raid_helper_core::{
    Coordinate, CreatureId, EncounterHandle, EncounterId, ObserverId, RaidKey, Step, TaskHandle,
    ZoneId,
};

/// Recall eligibility of an encounter.
///
/// `Locked` and `Unlocked` count the evaluations that observed living
/// creatures since the last wave clear. `Cleared` is entered once when the
/// creature set empties and stays put until creatures reappear, which makes
/// the wave-clear reset idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaidPhase {
    /// Creatures present, counter at or below the unlock threshold.
    Locked {
        /// Evaluations with creatures present.
        ticks: u32,
    },
    /// Counter above the threshold; beacon recall permitted.
    Unlocked {
        /// Evaluations with creatures present.
        ticks: u32,
    },
    /// Wave cleared; counter reset and recall disabled.
    Cleared,
}

impl Default for RaidPhase {
    fn default() -> Self {
        Self::Locked { ticks: 0 }
    }
}

/// Observable result of one [`RaidRecord::evaluate`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Creatures present, still below the threshold.
    Locked,
    /// Creatures present above the threshold. `first` marks the evaluation
    /// that unlocked recall.
    Unlocked {
        /// Whether this evaluation moved the record into `Unlocked`.
        first: bool,
    },
    /// The creature set emptied and the wave-clear reset ran.
    Cleared,
    /// The record was already cleared and stayed empty; nothing changed.
    Idle,
}

/// Cached creature and observer sets for one encounter.
///
/// The sets are always present: before the first refresh they are empty and
/// [`CacheEntry::last_refresh`] is `None`, which counts as expired.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheEntry {
    creatures: BTreeSet<CreatureId>,
    observers: BTreeSet<ObserverId>,
    refreshed_at: Option<Step>,
}

impl CacheEntry {
    /// Creatures captured by the last refresh.
    #[must_use]
    pub const fn creatures(&self) -> &BTreeSet<CreatureId> {
        &self.creatures
    }

    /// Observers captured by the last refresh.
    #[must_use]
    pub const fn observers(&self) -> &BTreeSet<ObserverId> {
        &self.observers
    }

    /// Step at which the sets were captured, if ever.
    #[must_use]
    pub const fn last_refresh(&self) -> Option<Step> {
        self.refreshed_at
    }

    /// Reports whether the entry is still within `ttl` steps of its refresh.
    #[must_use]
    pub fn is_fresh(&self, now: Step, ttl: u64) -> bool {
        self.refreshed_at
            .is_some_and(|refreshed| now.steps_since(refreshed) <= ttl)
    }
}

/// Authoritative state of one live encounter.
#[derive(Clone, Debug)]
pub struct RaidRecord {
    handle: EncounterHandle,
    registered_at: Step,
    phase: RaidPhase,
    cooldown: Option<TaskHandle>,
    cache: CacheEntry,
}

impl RaidRecord {
    pub(crate) fn new(handle: EncounterHandle, registered_at: Step) -> Self {
        Self {
            handle,
            registered_at,
            phase: RaidPhase::default(),
            cooldown: None,
            cache: CacheEntry::default(),
        }
    }

    /// Host reference to the encounter.
    #[must_use]
    pub const fn handle(&self) -> &EncounterHandle {
        &self.handle
    }

    /// Registry key of the record.
    #[must_use]
    pub const fn key(&self) -> &RaidKey {
        self.handle.key()
    }

    /// Encounter identifier.
    #[must_use]
    pub const fn id(&self) -> EncounterId {
        self.handle.id()
    }

    /// Zone hosting the encounter.
    #[must_use]
    pub const fn zone(&self) -> &ZoneId {
        self.handle.zone()
    }

    /// Fixed anchor coordinate of the encounter.
    #[must_use]
    pub const fn anchor(&self) -> Coordinate {
        self.handle.anchor()
    }

    /// Step on which the record was registered.
    #[must_use]
    pub const fn registered_at(&self) -> Step {
        self.registered_at
    }

    /// Current eligibility phase.
    #[must_use]
    pub const fn phase(&self) -> RaidPhase {
        self.phase
    }

    /// Whether beacon recall is currently permitted.
    #[must_use]
    pub const fn teleport_enabled(&self) -> bool {
        matches!(self.phase, RaidPhase::Unlocked { .. })
    }

    /// Whether the wave-clear reset already ran for the current empty spell.
    #[must_use]
    pub const fn reset_guard(&self) -> bool {
        matches!(self.phase, RaidPhase::Cleared)
    }

    /// Evaluations with creatures present since the last wave clear.
    #[must_use]
    pub const fn tick_counter(&self) -> u32 {
        match self.phase {
            RaidPhase::Locked { ticks } | RaidPhase::Unlocked { ticks } => ticks,
            RaidPhase::Cleared => 0,
        }
    }

    /// Whether a recall cooldown is running.
    #[must_use]
    pub const fn cooldown_active(&self) -> bool {
        self.cooldown.is_some()
    }

    /// Pending task that will end the running cooldown.
    #[must_use]
    pub const fn cooldown_task(&self) -> Option<TaskHandle> {
        self.cooldown
    }

    /// Cached creature and observer sets.
    #[must_use]
    pub const fn cache(&self) -> &CacheEntry {
        &self.cache
    }

    /// Runs one eligibility evaluation.
    ///
    /// This is the only way the phase changes; the state updater calls it once
    /// per record per pass. An empty creature set clears the wave once; a
    /// non-empty set bumps the counter and unlocks recall when the counter
    /// exceeds `threshold`.
    pub fn evaluate(&mut self, creatures_present: bool, threshold: u32) -> Transition {
        if !creatures_present {
            if self.phase == RaidPhase::Cleared {
                return Transition::Idle;
            }
            self.phase = RaidPhase::Cleared;
            return Transition::Cleared;
        }

        let (ticks, was_unlocked) = match self.phase {
            RaidPhase::Locked { ticks } => (ticks.saturating_add(1), false),
            RaidPhase::Unlocked { ticks } => (ticks.saturating_add(1), true),
            RaidPhase::Cleared => (1, false),
        };

        if ticks > threshold {
            self.phase = RaidPhase::Unlocked { ticks };
            Transition::Unlocked {
                first: !was_unlocked,
            }
        } else {
            self.phase = RaidPhase::Locked { ticks };
            Transition::Locked
        }
    }

    /// Starts a cooldown whose expiry is the scheduled task `expiry`.
    ///
    /// Returns the expiry task of a cooldown that was already running.
    pub fn begin_cooldown(&mut self, expiry: TaskHandle) -> Option<TaskHandle> {
        self.cooldown.replace(expiry)
    }

    /// Ends the cooldown if `expiry` is the task that owns it.
    pub fn end_cooldown(&mut self, expiry: TaskHandle) -> bool {
        if self.cooldown == Some(expiry) {
            self.cooldown = None;
            true
        } else {
            false
        }
    }

    /// Ends any running cooldown regardless of its expiry task.
    ///
    /// Used when the scheduler holding the expiry was cleared.
    pub fn clear_cooldown(&mut self) -> Option<TaskHandle> {
        self.cooldown.take()
    }

    /// Replaces the cached sets with a refresh captured at `refreshed_at`.
    ///
    /// Called by the cache manager when it applies completed refreshes.
    /// Older captures than the one already stored are ignored. Returns
    /// whether the entry changed.
    pub fn store_cache(
        &mut self,
        creatures: BTreeSet<CreatureId>,
        observers: BTreeSet<ObserverId>,
        refreshed_at: Step,
    ) -> bool {
        if self
            .cache
            .refreshed_at
            .is_some_and(|current| current > refreshed_at)
        {
            return false;
        }
        self.cache = CacheEntry {
            creatures,
            observers,
            refreshed_at: Some(refreshed_at),
        };
        true
    }
}
