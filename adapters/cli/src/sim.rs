//! Seeded host simulation that drives the engine end to end.

use std::{collections::BTreeMap, fmt, sync::Arc};

use rand::{seq::IteratorRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use raid_helper_core::{
    Activator, Coordinate, EncounterId, HostCommand, ObserverId, RaidKey, Settings, Signal,
    WorldView, ZoneId,
};
use raid_helper_memory_host::{Delivery, MemoryWorld};
use raid_helper_runtime::RaidHelper;
use tracing::{debug, info};

const MAX_ENCOUNTERS: usize = 4;
const MAX_WAVES: u32 = 4;
const OBSERVERS_PER_ZONE: u64 = 3;
const ARENA_HALF_EXTENT: f64 = 120.0;
const START_CHANCE: f64 = 0.01;
const KILL_CHANCE: f64 = 0.08;
const RING_CHANCE: f64 = 0.01;
const STOP_CHANCE: f64 = 0.0005;

/// Totals gathered over one simulation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    steps: u64,
    encounters_started: usize,
    encounters_ended: usize,
    peak_registered: usize,
    beacon_rings: usize,
    teleports: usize,
    chat_messages: usize,
    status_hints: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "steps: {}", self.steps)?;
        writeln!(f, "encounters started: {}", self.encounters_started)?;
        writeln!(f, "encounters ended: {}", self.encounters_ended)?;
        writeln!(f, "peak registered: {}", self.peak_registered)?;
        writeln!(f, "beacon rings: {}", self.beacon_rings)?;
        writeln!(f, "creatures teleported: {}", self.teleports)?;
        writeln!(f, "chat messages: {}", self.chat_messages)?;
        write!(f, "status-bar hints: {}", self.status_hints)
    }
}

/// Scripted host around a [`MemoryWorld`].
pub(crate) struct Simulation {
    rng: ChaCha8Rng,
    zones: Vec<ZoneId>,
    world: Arc<MemoryWorld>,
    helper: RaidHelper,
    waves: BTreeMap<RaidKey, u32>,
    next_encounter: u32,
    out: Vec<HostCommand>,
    summary: Summary,
}

impl Simulation {
    /// Builds a simulation with observers scattered over every monitored zone.
    pub(crate) fn new(settings: Settings, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let world = Arc::new(MemoryWorld::new());
        let zones = settings.zones.clone();

        let mut observer = 0;
        for zone in &zones {
            for _ in 0..OBSERVERS_PER_ZONE {
                observer += 1;
                let position = random_point(&mut rng);
                world.place_observer(ObserverId::new(observer), zone, position);
            }
        }

        let view: Arc<dyn WorldView> = world.clone();
        let mut helper = RaidHelper::new(settings, view);
        helper.start();

        Self {
            rng,
            zones,
            world,
            helper,
            waves: BTreeMap::new(),
            next_encounter: 1,
            out: Vec::new(),
            summary: Summary::default(),
        }
    }

    /// Runs `steps` steps and returns the totals.
    pub(crate) fn run(mut self, steps: u64) -> Summary {
        for _ in 0..steps {
            self.host_activity();
            self.wander_observers();
            self.ring_beacon();

            let report = self.helper.step(&mut self.out);
            self.summary.teleports += report.teleported;
            self.flush();

            self.summary.steps += 1;
            self.summary.peak_registered = self
                .summary
                .peak_registered
                .max(self.helper.registry().len());
        }
        self.helper.shutdown();
        self.collect_deliveries();
        info!(steps = self.summary.steps, "simulation finished");
        self.summary
    }

    fn signal(&mut self, signal: Signal) {
        self.helper.handle_signal(&signal, &mut self.out);
        self.flush();
    }

    fn flush(&mut self) {
        self.world.apply_all(&self.out);
        self.out.clear();
    }

    fn host_activity(&mut self) {
        if self.waves.len() < MAX_ENCOUNTERS && self.rng.gen_bool(START_CHANCE) {
            self.start_encounter();
        }

        let keys: Vec<RaidKey> = self.waves.keys().cloned().collect();
        for key in keys {
            if self.rng.gen_bool(STOP_CHANCE) {
                self.end_encounter(&key, false);
                continue;
            }
            let living = self.world.living_creatures(&key).unwrap_or_default();
            if living.is_empty() {
                self.next_wave(&key);
            } else if self.rng.gen_bool(KILL_CHANCE) {
                if let Some(creature) = living.iter().copied().choose(&mut self.rng) {
                    let _ = self.world.kill_creature(creature);
                }
            }
        }
    }

    fn start_encounter(&mut self) {
        let Some(zone) = self.zones.iter().choose(&mut self.rng).cloned() else {
            return;
        };
        let id = EncounterId::new(self.next_encounter);
        self.next_encounter += 1;
        let anchor = random_point(&mut self.rng);
        let handle = self.world.start_encounter(&zone, id, anchor);
        debug!(raid = %handle.key(), "encounter started");
        let _ = self.waves.insert(handle.key().clone(), 0);
        self.summary.encounters_started += 1;
        self.signal(Signal::EncounterTriggered { zone });
    }

    fn next_wave(&mut self, key: &RaidKey) {
        let spawned = self.waves.get(key).copied().unwrap_or_default();
        if spawned >= MAX_WAVES {
            self.end_encounter(key, true);
            return;
        }
        let count = self.rng.gen_range(2..=6);
        let _ = self.world.spawn_wave(key, count);
        let _ = self.waves.insert(key.clone(), spawned + 1);
        self.signal(Signal::WaveSpawned {
            zone: key.zone().clone(),
        });
    }

    fn end_encounter(&mut self, key: &RaidKey, finished: bool) {
        let _ = self.waves.remove(key);
        let Some(handle) = self.world.end_encounter(key) else {
            return;
        };
        self.summary.encounters_ended += 1;
        let signal = if finished {
            Signal::EncounterFinished { handle }
        } else {
            Signal::EncounterStopped { handle }
        };
        self.signal(signal);
    }

    fn wander_observers(&mut self) {
        for (observer, zone, position) in self.world.observers() {
            let step = |rng: &mut ChaCha8Rng| rng.gen_range(-1.0_f64..=1.0);
            let moved = position.offset(step(&mut self.rng), 0.0, step(&mut self.rng));
            let clamped = Coordinate::new(
                moved.x().clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
                moved.y(),
                moved.z().clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
            );
            self.world.place_observer(observer, &zone, clamped);
        }
    }

    fn ring_beacon(&mut self) {
        if !self.rng.gen_bool(RING_CHANCE) {
            return;
        }
        let Some((observer, zone, position)) =
            self.world.observers().into_iter().choose(&mut self.rng)
        else {
            return;
        };
        let actor = if self.rng.gen_bool(0.9) {
            Activator::Observer(observer)
        } else {
            Activator::Other
        };
        self.summary.beacon_rings += 1;
        self.signal(Signal::BeaconActivated {
            actor,
            zone,
            coordinate: position,
        });
    }

    fn collect_deliveries(&mut self) {
        for delivery in self.world.take_deliveries() {
            match delivery {
                Delivery::Message { .. } => self.summary.chat_messages += 1,
                Delivery::StatusBar { .. } => self.summary.status_hints += 1,
            }
        }
    }
}

fn random_point(rng: &mut ChaCha8Rng) -> Coordinate {
    Coordinate::new(
        rng.gen_range(-ARENA_HALF_EXTENT..=ARENA_HALF_EXTENT),
        64.0,
        rng.gen_range(-ARENA_HALF_EXTENT..=ARENA_HALF_EXTENT),
    )
}
