//! Validated engine settings.
//!
//! Loading and validation belong to the adapter that owns the configuration
//! file; the engine only ever sees a [`Settings`] value whose numbers are
//! already known to be non-negative.

use serde::{Deserialize, Serialize};

use crate::ZoneId;

/// How the discovery scanner is triggered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Sweep every monitored zone on a fixed period.
    #[default]
    Periodic,
    /// Rescan a zone whenever the host reports encounter activity in it.
    Events,
    /// Both periodic sweeps and event-driven rescans.
    Both,
}

impl ScanMode {
    /// Reports whether periodic sweeps are enabled.
    #[must_use]
    pub const fn periodic(self) -> bool {
        matches!(self, Self::Periodic | Self::Both)
    }

    /// Reports whether event-driven rescans are enabled.
    #[must_use]
    pub const fn on_events(self) -> bool {
        matches!(self, Self::Events | Self::Both)
    }
}

/// How the state updater walks the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Evaluate every record in a single pass.
    #[default]
    Full,
    /// Queue every record and evaluate a bounded slice per step.
    Batched,
}

/// Where cache refresh jobs run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Compute refreshes on the stepping thread.
    #[default]
    Inline,
    /// Compute refreshes on a background worker pool.
    Background,
}

/// Player-facing message texts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    /// Status-bar hint shown near encounters whose beacon recall is unlocked.
    pub ring: String,
    /// Sent when every in-range encounter is cooling down.
    pub cooldown: String,
    /// Sent when some in-range encounters were recalled and some were cooling down.
    pub partial_cooldown: String,
    /// Sent when every in-range encounter was recalled.
    pub success: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            ring: "If you can't find the raiders, just ring a bell and they will spawn above it."
                .to_owned(),
            cooldown: "The bell is on cooldown.".to_owned(),
            partial_cooldown: "Some raids are still on cooldown.".to_owned(),
            success: "The raiders have been summoned to the bell.".to_owned(),
        }
    }
}

/// Engine configuration. Durations are measured in simulation steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Zones in which encounters are tracked and beacons respond.
    pub zones: Vec<ZoneId>,
    /// Steps between periodic discovery sweeps.
    pub world_check_frequency: u64,
    /// Upper bound on entries each bounded loop processes per step.
    pub max_checks_per_tick: usize,
    /// Steps between state updater passes.
    pub raid_check_frequency: u64,
    /// Evaluations with creatures present before recall unlocks.
    pub bell_work_delay: u32,
    /// Steps a recall suppresses further recalls of the same encounter.
    pub bell_cooldown: u64,
    /// Steps between beacon activation and the recall itself.
    pub teleport_delay: u64,
    /// Beacon reach and observer notification radius, in world units.
    pub radius: f64,
    /// Height above the beacon at which recalled creatures appear.
    pub height_offset: f64,
    /// Steps a cached creature/observer set stays fresh.
    pub cache_expire_time: u64,
    /// Idle teleport coordinators kept for reuse.
    pub max_pool_size: usize,
    /// Discovery trigger.
    pub scan_mode: ScanMode,
    /// Registry walk strategy.
    pub update_mode: UpdateMode,
    /// Cache refresh placement.
    pub cache_refresh: RefreshMode,
    /// Player-facing texts.
    pub messages: Messages,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zones: Vec::new(),
            world_check_frequency: 100,
            max_checks_per_tick: 5,
            raid_check_frequency: 20,
            bell_work_delay: 60,
            bell_cooldown: 10,
            teleport_delay: 60,
            radius: 50.0,
            height_offset: 10.0,
            cache_expire_time: 100,
            max_pool_size: 4,
            scan_mode: ScanMode::default(),
            update_mode: UpdateMode::default(),
            cache_refresh: RefreshMode::default(),
            messages: Messages::default(),
        }
    }
}

impl Settings {
    /// Reports whether `zone` is monitored.
    #[must_use]
    pub fn monitors(&self, zone: &ZoneId) -> bool {
        self.zones.iter().any(|monitored| monitored == zone)
    }

    /// Squared beacon radius used by range checks.
    #[must_use]
    pub fn radius_squared(&self) -> f64 {
        self.radius * self.radius
    }

    /// Per-step batch size; a configured zero still makes progress.
    #[must_use]
    pub fn batch_limit(&self) -> usize {
        self.max_checks_per_tick.max(1)
    }
}
