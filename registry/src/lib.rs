#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative registry of live raid encounters.
//!
//! Records are grouped by zone and keyed by encounter id. A zone entry exists
//! only while it holds at least one record.

use std::collections::{btree_map::Entry, BTreeMap};

use raid_helper_core::{DiscoveryError, EncounterHandle, EncounterId, RaidKey, Step, ZoneId};

mod record;

pub use record::{CacheEntry, RaidPhase, RaidRecord, Transition};

/// Map of zone to encounter id to record.
#[derive(Debug, Default)]
pub struct RaidRegistry {
    zones: BTreeMap<ZoneId, BTreeMap<EncounterId, RaidRecord>>,
}

impl RaidRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the encounter unless a record with the same key exists.
    ///
    /// Returns `Ok(true)` when a record was created and `Ok(false)` when the
    /// encounter was already known. Handles without usable identity are
    /// rejected and leave the registry untouched.
    pub fn register_if_absent(
        &mut self,
        handle: EncounterHandle,
        now: Step,
    ) -> Result<bool, DiscoveryError> {
        handle.validate()?;

        let records = self.zones.entry(handle.zone().clone()).or_default();
        match records.entry(handle.id()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let _ = slot.insert(RaidRecord::new(handle, now));
                Ok(true)
            }
        }
    }

    /// Removes the record for `key`, pruning the zone if it became empty.
    pub fn unregister(&mut self, key: &RaidKey) -> Option<RaidRecord> {
        let records = self.zones.get_mut(key.zone())?;
        let removed = records.remove(&key.id());
        if records.is_empty() {
            let _ = self.zones.remove(key.zone());
        }
        removed
    }

    /// Reports whether a record exists for `key`.
    #[must_use]
    pub fn is_registered(&self, key: &RaidKey) -> bool {
        self.get(key).is_some()
    }

    /// Looks up the record for `key`.
    #[must_use]
    pub fn get(&self, key: &RaidKey) -> Option<&RaidRecord> {
        self.zones.get(key.zone())?.get(&key.id())
    }

    /// Looks up the record for `key` for mutation.
    pub fn get_mut(&mut self, key: &RaidKey) -> Option<&mut RaidRecord> {
        self.zones.get_mut(key.zone())?.get_mut(&key.id())
    }

    /// Iterates the records of one zone in encounter id order.
    pub fn records_in_zone<'a>(&'a self, zone: &ZoneId) -> impl Iterator<Item = &'a RaidRecord> + 'a {
        self.zones
            .get(zone)
            .into_iter()
            .flat_map(|records| records.values())
    }

    /// Owned snapshot of every key, in zone then id order.
    ///
    /// Consumers walk this list and look each key up again, so no borrow of
    /// the registry is held while they call into the host.
    #[must_use]
    pub fn keys(&self) -> Vec<RaidKey> {
        self.iter().map(|record| record.key().clone()).collect()
    }

    /// Iterates every record in zone then id order.
    pub fn iter(&self) -> impl Iterator<Item = &RaidRecord> {
        self.zones.values().flat_map(|records| records.values())
    }

    /// Iterates every record for mutation, in zone then id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RaidRecord> {
        self.zones.values_mut().flat_map(|records| records.values_mut())
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.values().map(BTreeMap::len).sum()
    }

    /// Reports whether no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Number of zones holding at least one record.
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Reports whether `zone` holds any record.
    #[must_use]
    pub fn contains_zone(&self, zone: &ZoneId) -> bool {
        self.zones.contains_key(zone)
    }
}

/// Query functions that provide read-only views of the registry.
pub mod query {
    use raid_helper_core::{Coordinate, RaidKey};

    use super::{RaidPhase, RaidRegistry};

    /// Immutable representation of a single record used for reporting.
    #[derive(Clone, Debug, PartialEq)]
    pub struct RaidSnapshot {
        /// Registry key of the encounter.
        pub key: RaidKey,
        /// Anchor coordinate of the encounter.
        pub anchor: Coordinate,
        /// Eligibility phase.
        pub phase: RaidPhase,
        /// Whether a recall cooldown is running.
        pub cooldown_active: bool,
        /// Number of creatures in the cached set.
        pub cached_creatures: usize,
        /// Number of observers in the cached set.
        pub cached_observers: usize,
    }

    /// Read-only snapshot describing every registered record.
    #[derive(Clone, Debug, Default)]
    pub struct RaidView {
        snapshots: Vec<RaidSnapshot>,
    }

    impl RaidView {
        /// Iterator over the captured snapshots in key order.
        pub fn iter(&self) -> impl Iterator<Item = &RaidSnapshot> {
            self.snapshots.iter()
        }

        /// Number of captured snapshots.
        #[must_use]
        pub fn len(&self) -> usize {
            self.snapshots.len()
        }

        /// Reports whether the view is empty.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.snapshots.is_empty()
        }

        /// Consumes the view, yielding the underlying snapshots.
        #[must_use]
        pub fn into_vec(self) -> Vec<RaidSnapshot> {
            self.snapshots
        }
    }

    /// Captures a read-only view of every registered record.
    #[must_use]
    pub fn raid_view(registry: &RaidRegistry) -> RaidView {
        let snapshots = registry
            .iter()
            .map(|record| RaidSnapshot {
                key: record.key().clone(),
                anchor: record.anchor(),
                phase: record.phase(),
                cooldown_active: record.cooldown_active(),
                cached_creatures: record.cache().creatures().len(),
                cached_observers: record.cache().observers().len(),
            })
            .collect();
        RaidView { snapshots }
    }

    /// Counts records whose beacon recall is unlocked.
    #[must_use]
    pub fn unlocked_count(registry: &RaidRegistry) -> usize {
        registry
            .iter()
            .filter(|record| record.teleport_enabled())
            .count()
    }
}
