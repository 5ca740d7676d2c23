#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Raid Helper engine.
//!
//! This crate defines the message surface that connects the host simulation,
//! the authoritative raid registry, and the pure systems. The host delivers
//! [`Signal`] values describing lifecycle changes, systems read the host
//! through the read-only [`WorldView`] boundary, and every side effect leaves
//! the engine as a [`HostCommand`] for the host to execute. Deferred work is
//! expressed as [`Task`] values queued on a [`StepScheduler`] rather than as
//! closures, so the whole engine stays inspectable and deterministic.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod batch;
mod schedule;
mod settings;

pub use batch::{BatchQueue, DrainStatus};
pub use schedule::{Step, StepScheduler, TaskHandle};
pub use settings::{Messages, RefreshMode, ScanMode, Settings, UpdateMode};

/// Name of a simulated zone (one world instance) monitored by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    /// Creates a zone identifier from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the zone.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the host assigns to an encounter, unique within its zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EncounterId(u32);

impl EncounterId {
    /// Creates a new encounter identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of a hostile creature spawned by an encounter wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(u64);

impl CreatureId {
    /// Creates a new creature identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Identifier of an observer (a connected player) able to receive messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Creates a new observer identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Point in zone space measured in world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    x: f64,
    y: f64,
    z: f64,
}

impl Coordinate {
    /// Creates a new coordinate. `y` is the vertical axis.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Horizontal `x` component.
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// Vertical component.
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }

    /// Horizontal `z` component.
    #[must_use]
    pub const fn z(&self) -> f64 {
        self.z
    }

    /// Computes the squared Euclidean distance between two coordinates.
    ///
    /// Range checks compare squared values so no square root is taken on the
    /// hot path.
    #[must_use]
    pub fn distance_squared(self, other: Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Returns the coordinate translated by the provided offsets.
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Reports whether every component is a finite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Composite key identifying a raid record: the zone plus the encounter id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RaidKey {
    zone: ZoneId,
    id: EncounterId,
}

impl RaidKey {
    /// Creates a key for the encounter `id` inside `zone`.
    #[must_use]
    pub const fn new(zone: ZoneId, id: EncounterId) -> Self {
        Self { zone, id }
    }

    /// Zone hosting the encounter.
    #[must_use]
    pub const fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// Encounter identifier within the zone.
    #[must_use]
    pub const fn id(&self) -> EncounterId {
        self.id
    }
}

impl fmt::Display for RaidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.zone, self.id.get())
    }
}

/// Opaque reference to a live encounter inside the host simulation.
///
/// A handle only captures identity. Whether the encounter still exists is
/// answered by the host through [`WorldView`] each time it matters.
#[derive(Clone, Debug, PartialEq)]
pub struct EncounterHandle {
    key: RaidKey,
    anchor: Coordinate,
}

impl EncounterHandle {
    /// Creates a handle for encounter `id` anchored at `anchor` in `zone`.
    #[must_use]
    pub fn new(zone: ZoneId, id: EncounterId, anchor: Coordinate) -> Self {
        Self {
            key: RaidKey::new(zone, id),
            anchor,
        }
    }

    /// Key under which the encounter is registered.
    #[must_use]
    pub const fn key(&self) -> &RaidKey {
        &self.key
    }

    /// Zone hosting the encounter.
    #[must_use]
    pub const fn zone(&self) -> &ZoneId {
        self.key.zone()
    }

    /// Encounter identifier within the zone.
    #[must_use]
    pub const fn id(&self) -> EncounterId {
        self.key.id()
    }

    /// Fixed coordinate the encounter is anchored to.
    #[must_use]
    pub const fn anchor(&self) -> Coordinate {
        self.anchor
    }

    /// Checks that the handle carries usable identity data.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.zone().as_str().trim().is_empty() {
            return Err(DiscoveryError::MissingZone { id: self.id() });
        }
        if !self.anchor.is_finite() {
            return Err(DiscoveryError::InvalidAnchor {
                key: self.key.clone(),
            });
        }
        Ok(())
    }
}

/// Reasons a discovered encounter is rejected before registration.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DiscoveryError {
    /// The host reported the encounter without a zone.
    #[error("encounter {} has no zone", .id.get())]
    MissingZone {
        /// Identifier of the offending encounter.
        id: EncounterId,
    },
    /// The encounter anchor is not a finite coordinate.
    #[error("encounter {key} has a non-finite anchor")]
    InvalidAnchor {
        /// Key of the offending encounter.
        key: RaidKey,
    },
    /// The encounter was listed under a different zone than it reports.
    #[error("encounter {key} was listed under zone {listed}")]
    ZoneMismatch {
        /// Key reported by the encounter itself.
        key: RaidKey,
        /// Zone whose listing contained the encounter.
        listed: ZoneId,
    },
}

/// Reasons a bounded drain loop refuses an operation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// A drain continuation for the loop is already in flight.
    #[error("{label} drain already in flight as task {}", .handle.get())]
    DrainInFlight {
        /// Name of the loop that rejected the start.
        label: &'static str,
        /// Handle of the continuation that is already armed.
        handle: TaskHandle,
    },
    /// A continuation fired that the loop no longer owns.
    #[error("{label} received stale continuation {}", .handle.get())]
    StaleContinuation {
        /// Name of the loop that rejected the continuation.
        label: &'static str,
        /// Handle of the stray continuation.
        handle: TaskHandle,
    },
}

/// Entity that activated a beacon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activator {
    /// An observer (player) that can receive feedback messages.
    Observer(ObserverId),
    /// Any other source, such as a mechanism or projectile.
    Other,
}

/// Lifecycle signals the host delivers to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    /// An encounter started somewhere in the zone.
    EncounterTriggered {
        /// Zone where the encounter started.
        zone: ZoneId,
    },
    /// A new wave spawned for some encounter in the zone.
    WaveSpawned {
        /// Zone where the wave spawned.
        zone: ZoneId,
    },
    /// An encounter finished (all waves defeated or lost).
    EncounterFinished {
        /// Encounter that finished.
        handle: EncounterHandle,
    },
    /// An encounter was stopped before finishing.
    EncounterStopped {
        /// Encounter that stopped.
        handle: EncounterHandle,
    },
    /// A summoning beacon was activated.
    BeaconActivated {
        /// Entity that activated the beacon.
        actor: Activator,
        /// Zone containing the beacon.
        zone: ZoneId,
        /// Location of the beacon.
        coordinate: Coordinate,
    },
}

/// Side effects the engine asks the host to carry out.
#[derive(Clone, Debug, PartialEq)]
pub enum HostCommand {
    /// Sends a chat message to one observer.
    SendMessage {
        /// Recipient of the message.
        observer: ObserverId,
        /// Message text.
        text: String,
    },
    /// Shows a transient status-bar message to one observer.
    SendStatusBar {
        /// Recipient of the message.
        observer: ObserverId,
        /// Message text.
        text: String,
    },
    /// Moves a creature to a new location within a zone.
    Teleport {
        /// Creature to move.
        creature: CreatureId,
        /// Zone containing the creature.
        zone: ZoneId,
        /// Destination coordinate.
        destination: Coordinate,
    },
}

/// Deferred work items queued on the engine scheduler.
#[derive(Clone, Debug, PartialEq)]
pub enum Task {
    /// Periodic sweep of every monitored zone for new encounters.
    ScanZones,
    /// Continuation of the discovery drain loop.
    DrainDiscoveries,
    /// Periodic evaluation pass over the registry.
    EvaluateRaids,
    /// Continuation of the batched evaluation drain loop.
    DrainEvaluations,
    /// Continuation of the cache refresh drain loop.
    DrainCacheRefreshes,
    /// Delayed recall of an encounter's creatures to a beacon.
    Recall {
        /// Encounter whose creatures are recalled.
        key: RaidKey,
        /// Point the creatures are moved to.
        destination: Coordinate,
    },
    /// Automatic end of a recall cooldown window.
    ExpireCooldown {
        /// Encounter whose cooldown ends.
        key: RaidKey,
    },
}

/// Read-only view of the host simulation.
///
/// Implementations must be callable from a background refresh worker, hence
/// the `Send + Sync` bound. Every method answers from the host's current
/// state; none of them mutate it.
pub trait WorldView: Send + Sync {
    /// Lists the encounters currently live in `zone`.
    fn active_encounters(&self, zone: &ZoneId) -> Vec<EncounterHandle>;

    /// Resolves a live encounter by key, returning `None` once it has ended.
    fn encounter(&self, key: &RaidKey) -> Option<EncounterHandle>;

    /// Living creatures of the encounter, or `None` if the handle went stale.
    fn living_creatures(&self, key: &RaidKey) -> Option<BTreeSet<CreatureId>>;

    /// Observers within `radius` of `coordinate`.
    fn nearby_observers(
        &self,
        zone: &ZoneId,
        coordinate: Coordinate,
        radius: f64,
    ) -> BTreeSet<ObserverId>;

    /// Creatures of any kind within `radius` of `coordinate`.
    ///
    /// Part of the host query surface for hosts and tools built on this
    /// trait; the engine itself tracks creatures per encounter through
    /// [`WorldView::living_creatures`].
    fn nearby_creatures(
        &self,
        zone: &ZoneId,
        coordinate: Coordinate,
        radius: f64,
    ) -> BTreeSet<CreatureId>;
}
