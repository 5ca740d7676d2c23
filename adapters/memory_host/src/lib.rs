#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! In-memory host simulation.
//!
//! [`MemoryWorld`] keeps zones, encounters, creatures and observers in plain
//! maps behind a lock, answers [`WorldView`] queries from them and executes
//! [`HostCommand`]s against them. Adapters drive it as a stand-in game server;
//! tests script it directly.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use raid_helper_core::{
    Coordinate, CreatureId, EncounterHandle, EncounterId, HostCommand, ObserverId, RaidKey,
    WorldView, ZoneId,
};

/// Message delivered to an observer by a [`HostCommand`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Chat message.
    Message {
        /// Recipient.
        observer: ObserverId,
        /// Message text.
        text: String,
    },
    /// Status-bar message.
    StatusBar {
        /// Recipient.
        observer: ObserverId,
        /// Message text.
        text: String,
    },
}

#[derive(Clone, Debug)]
struct EncounterState {
    handle: EncounterHandle,
    creatures: BTreeSet<CreatureId>,
}

#[derive(Clone, Debug)]
struct Placement {
    zone: ZoneId,
    position: Coordinate,
}

#[derive(Debug, Default)]
struct WorldState {
    encounters: BTreeMap<RaidKey, EncounterState>,
    creatures: BTreeMap<CreatureId, Placement>,
    observers: BTreeMap<ObserverId, Placement>,
    deliveries: Vec<Delivery>,
    teleports: usize,
    next_creature: u64,
}

/// Thread-safe in-memory world implementing [`WorldView`].
#[derive(Debug, Default)]
pub struct MemoryWorld {
    state: RwLock<WorldState>,
    creature_lookups: AtomicUsize,
    observer_lookups: AtomicUsize,
}

impl MemoryWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts an encounter anchored at `anchor` and returns its handle.
    ///
    /// Starting an encounter whose key is already live replaces it.
    pub fn start_encounter(&self, zone: &ZoneId, id: EncounterId, anchor: Coordinate) -> EncounterHandle {
        let handle = EncounterHandle::new(zone.clone(), id, anchor);
        let _ = self.write().encounters.insert(
            handle.key().clone(),
            EncounterState {
                handle: handle.clone(),
                creatures: BTreeSet::new(),
            },
        );
        handle
    }

    /// Ends an encounter and despawns its creatures. Returns its handle if it
    /// was live.
    pub fn end_encounter(&self, key: &RaidKey) -> Option<EncounterHandle> {
        let mut state = self.write();
        let ended = state.encounters.remove(key)?;
        for creature in &ended.creatures {
            let _ = state.creatures.remove(creature);
        }
        Some(ended.handle)
    }

    /// Spawns a wave of `count` creatures around the encounter anchor.
    ///
    /// Returns the new creature ids, empty if the encounter is not live.
    pub fn spawn_wave(&self, key: &RaidKey, count: usize) -> Vec<CreatureId> {
        let mut state = self.write();
        let Some(anchor) = state.encounters.get(key).map(|encounter| encounter.handle.anchor()) else {
            return Vec::new();
        };

        let mut spawned = Vec::with_capacity(count);
        for index in 0..count {
            let creature = CreatureId::new(state.next_creature);
            state.next_creature = state.next_creature.wrapping_add(1);
            let spread = index as f64;
            let _ = state.creatures.insert(
                creature,
                Placement {
                    zone: key.zone().clone(),
                    position: anchor.offset(spread, 0.0, -spread),
                },
            );
            spawned.push(creature);
        }
        if let Some(encounter) = state.encounters.get_mut(key) {
            encounter.creatures.extend(spawned.iter().copied());
        }
        spawned
    }

    /// Removes one creature from the world. Returns whether it existed.
    pub fn kill_creature(&self, creature: CreatureId) -> bool {
        let mut state = self.write();
        if state.creatures.remove(&creature).is_none() {
            return false;
        }
        for encounter in state.encounters.values_mut() {
            let _ = encounter.creatures.remove(&creature);
        }
        true
    }

    /// Removes every living creature of an encounter, ending its wave.
    pub fn clear_wave(&self, key: &RaidKey) -> usize {
        let creatures: Vec<CreatureId> = self
            .read()
            .encounters
            .get(key)
            .map(|encounter| encounter.creatures.iter().copied().collect())
            .unwrap_or_default();
        creatures
            .into_iter()
            .filter(|creature| self.kill_creature(*creature))
            .count()
    }

    /// Places (or moves) an observer.
    pub fn place_observer(&self, observer: ObserverId, zone: &ZoneId, position: Coordinate) {
        let _ = self.write().observers.insert(
            observer,
            Placement {
                zone: zone.clone(),
                position,
            },
        );
    }

    /// Removes an observer.
    pub fn remove_observer(&self, observer: ObserverId) -> bool {
        self.write().observers.remove(&observer).is_some()
    }

    /// Current position of a creature.
    #[must_use]
    pub fn creature_position(&self, creature: CreatureId) -> Option<Coordinate> {
        self.read()
            .creatures
            .get(&creature)
            .map(|placement| placement.position)
    }

    /// Keys of every live encounter.
    #[must_use]
    pub fn encounter_keys(&self) -> Vec<RaidKey> {
        self.read().encounters.keys().cloned().collect()
    }

    /// Observers currently placed in the world.
    #[must_use]
    pub fn observers(&self) -> Vec<(ObserverId, ZoneId, Coordinate)> {
        self.read()
            .observers
            .iter()
            .map(|(id, placement)| (*id, placement.zone.clone(), placement.position))
            .collect()
    }

    /// Executes one command issued by the engine.
    pub fn apply(&self, command: &HostCommand) {
        let mut guard = self.write();
        let state = &mut *guard;
        match command {
            HostCommand::SendMessage { observer, text } => state.deliveries.push(Delivery::Message {
                observer: *observer,
                text: text.clone(),
            }),
            HostCommand::SendStatusBar { observer, text } => {
                state.deliveries.push(Delivery::StatusBar {
                    observer: *observer,
                    text: text.clone(),
                })
            }
            HostCommand::Teleport {
                creature,
                zone,
                destination,
            } => {
                if let Some(placement) = state.creatures.get_mut(creature) {
                    if placement.zone == *zone {
                        placement.position = *destination;
                        state.teleports += 1;
                    }
                }
            }
        }
    }

    /// Executes a batch of commands in order.
    pub fn apply_all(&self, commands: &[HostCommand]) {
        for command in commands {
            self.apply(command);
        }
    }

    /// Drains the messages delivered so far.
    pub fn take_deliveries(&self) -> Vec<Delivery> {
        std::mem::take(&mut self.write().deliveries)
    }

    /// Number of creature teleports executed.
    #[must_use]
    pub fn teleport_count(&self) -> usize {
        self.read().teleports
    }

    /// Number of `living_creatures` queries answered so far.
    #[must_use]
    pub fn creature_lookups(&self) -> usize {
        self.creature_lookups.load(Ordering::Relaxed)
    }

    /// Number of `nearby_observers` queries answered so far.
    #[must_use]
    pub fn observer_lookups(&self) -> usize {
        self.observer_lookups.load(Ordering::Relaxed)
    }
}

impl WorldView for MemoryWorld {
    fn active_encounters(&self, zone: &ZoneId) -> Vec<EncounterHandle> {
        self.read()
            .encounters
            .values()
            .filter(|encounter| encounter.handle.zone() == zone)
            .map(|encounter| encounter.handle.clone())
            .collect()
    }

    fn encounter(&self, key: &RaidKey) -> Option<EncounterHandle> {
        self.read()
            .encounters
            .get(key)
            .map(|encounter| encounter.handle.clone())
    }

    fn living_creatures(&self, key: &RaidKey) -> Option<BTreeSet<CreatureId>> {
        let _ = self.creature_lookups.fetch_add(1, Ordering::Relaxed);
        self.read()
            .encounters
            .get(key)
            .map(|encounter| encounter.creatures.clone())
    }

    fn nearby_observers(
        &self,
        zone: &ZoneId,
        coordinate: Coordinate,
        radius: f64,
    ) -> BTreeSet<ObserverId> {
        let _ = self.observer_lookups.fetch_add(1, Ordering::Relaxed);
        let radius_squared = radius * radius;
        self.read()
            .observers
            .iter()
            .filter(|(_, placement)| {
                placement.zone == *zone
                    && placement.position.distance_squared(coordinate) <= radius_squared
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn nearby_creatures(
        &self,
        zone: &ZoneId,
        coordinate: Coordinate,
        radius: f64,
    ) -> BTreeSet<CreatureId> {
        let radius_squared = radius * radius;
        self.read()
            .creatures
            .iter()
            .filter(|(_, placement)| {
                placement.zone == *zone
                    && placement.position.distance_squared(coordinate) <= radius_squared
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> ZoneId {
        ZoneId::new("overworld")
    }

    #[test]
    fn spawned_wave_is_reported_as_living() {
        let world = MemoryWorld::new();
        let handle = world.start_encounter(&zone(), EncounterId::new(1), Coordinate::new(0.0, 64.0, 0.0));
        let spawned = world.spawn_wave(handle.key(), 3);

        let living = world.living_creatures(handle.key()).expect("encounter live");
        assert_eq!(living.len(), 3);
        assert!(spawned.iter().all(|creature| living.contains(creature)));
        assert_eq!(world.creature_lookups(), 1);
    }

    #[test]
    fn ended_encounter_goes_stale() {
        let world = MemoryWorld::new();
        let handle = world.start_encounter(&zone(), EncounterId::new(1), Coordinate::new(0.0, 64.0, 0.0));
        let _ = world.spawn_wave(handle.key(), 2);

        assert!(world.end_encounter(handle.key()).is_some());
        assert!(world.living_creatures(handle.key()).is_none());
        assert!(world.encounter(handle.key()).is_none());
        assert!(world.nearby_creatures(&zone(), handle.anchor(), 100.0).is_empty());
    }

    #[test]
    fn teleport_moves_creature_within_zone() {
        let world = MemoryWorld::new();
        let handle = world.start_encounter(&zone(), EncounterId::new(1), Coordinate::new(0.0, 64.0, 0.0));
        let creature = world.spawn_wave(handle.key(), 1)[0];
        let destination = Coordinate::new(30.0, 74.0, 30.0);

        world.apply(&HostCommand::Teleport {
            creature,
            zone: zone(),
            destination,
        });

        assert_eq!(world.creature_position(creature), Some(destination));
        assert_eq!(world.teleport_count(), 1);
    }

    #[test]
    fn nearby_observers_respects_zone_and_radius() {
        let world = MemoryWorld::new();
        world.place_observer(ObserverId::new(1), &zone(), Coordinate::new(3.0, 0.0, 4.0));
        world.place_observer(ObserverId::new(2), &zone(), Coordinate::new(30.0, 0.0, 40.0));
        world.place_observer(ObserverId::new(3), &ZoneId::new("nether"), Coordinate::new(0.0, 0.0, 0.0));

        let nearby = world.nearby_observers(&zone(), Coordinate::new(0.0, 0.0, 0.0), 5.0);
        assert_eq!(nearby.into_iter().collect::<Vec<_>>(), vec![ObserverId::new(1)]);
    }
}
