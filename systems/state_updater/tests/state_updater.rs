use std::sync::Arc;

use raid_helper_core::{
    Coordinate, EncounterId, HostCommand, ObserverId, RaidKey, StepScheduler, Task, UpdateMode,
    WorldView, ZoneId,
};
use raid_helper_memory_host::MemoryWorld;
use raid_helper_registry::{RaidPhase, RaidRegistry};
use raid_helper_system_cache::{self as cache, CacheManager, Inline};
use raid_helper_system_state_updater::{Config, PassReport, StateUpdater};

const RING: &str = "ring the bell";

struct Harness {
    world: Arc<MemoryWorld>,
    registry: RaidRegistry,
    scheduler: StepScheduler<Task>,
    cache: CacheManager,
    updater: StateUpdater,
}

impl Harness {
    fn new(mode: UpdateMode, threshold: u32) -> Self {
        let world = Arc::new(MemoryWorld::new());
        let view: Arc<dyn WorldView> = world.clone();
        Self {
            world,
            registry: RaidRegistry::new(),
            scheduler: StepScheduler::new(),
            cache: CacheManager::new(cache::Config::new(100, 50.0, 5), view, Box::new(Inline)),
            updater: StateUpdater::new(Config::new(mode, 20, threshold, 5, RING)),
        }
    }

    fn encounter(&mut self, id: u32, creatures: usize) -> RaidKey {
        let handle = self.world.start_encounter(
            &ZoneId::new("overworld"),
            EncounterId::new(id),
            Coordinate::new(f64::from(id) * 200.0, 64.0, 0.0),
        );
        let _ = self.world.spawn_wave(handle.key(), creatures);
        let _ = self
            .registry
            .register_if_absent(handle.clone(), self.scheduler.now())
            .expect("valid handle");
        handle.key().clone()
    }

    fn pass(&mut self, out: &mut Vec<HostCommand>) -> PassReport {
        self.updater
            .run_pass(&mut self.registry, &mut self.cache, &mut self.scheduler, out)
    }
}

#[test]
fn recall_unlocks_when_counter_first_exceeds_threshold() {
    let mut harness = Harness::new(UpdateMode::Full, 60);
    let key = harness.encounter(1, 3);
    let mut out = Vec::new();

    for pass in 1..=60 {
        let report = harness.pass(&mut out);
        assert_eq!(report.unlocked, 0, "pass {pass} must stay locked");
        let record = harness.registry.get(&key).expect("registered");
        assert_eq!(record.tick_counter(), pass);
        assert!(!record.teleport_enabled());
    }

    let report = harness.pass(&mut out);
    assert_eq!(report.unlocked, 1);
    let record = harness.registry.get(&key).expect("registered");
    assert_eq!(record.tick_counter(), 61);
    assert!(record.teleport_enabled());
}

#[test]
fn unlocked_record_notifies_observers_every_evaluation() {
    let mut harness = Harness::new(UpdateMode::Full, 2);
    let key = harness.encounter(1, 2);
    let anchor = harness.registry.get(&key).expect("registered").anchor();
    harness
        .world
        .place_observer(ObserverId::new(7), key.zone(), anchor.offset(5.0, 0.0, 5.0));
    harness
        .world
        .place_observer(ObserverId::new(8), key.zone(), anchor.offset(400.0, 0.0, 0.0));

    let mut out = Vec::new();
    for _ in 0..5 {
        let _ = harness.pass(&mut out);
    }

    assert_eq!(out.len(), 3, "passes 3, 4 and 5 each notify once");
    for command in &out {
        assert_eq!(
            command,
            &HostCommand::SendStatusBar {
                observer: ObserverId::new(7),
                text: RING.to_owned(),
            }
        );
    }
}

#[test]
fn wave_clear_resets_exactly_once() {
    let mut harness = Harness::new(UpdateMode::Full, 2);
    let key = harness.encounter(1, 2);
    let mut out = Vec::new();
    for _ in 0..4 {
        let _ = harness.pass(&mut out);
    }
    assert!(harness.registry.get(&key).expect("registered").teleport_enabled());

    let _ = harness.world.clear_wave(&key);
    let mut cleared = 0;
    for _ in 0..6 {
        cleared += harness.pass(&mut out).cleared;
    }

    assert_eq!(cleared, 1);
    let record = harness.registry.get(&key).expect("registered");
    assert_eq!(record.phase(), RaidPhase::Cleared);
    assert_eq!(record.tick_counter(), 0);
    assert!(!record.teleport_enabled());

    let _ = harness.world.spawn_wave(&key, 1);
    let _ = harness.pass(&mut out);
    let record = harness.registry.get(&key).expect("registered");
    assert_eq!(record.phase(), RaidPhase::Locked { ticks: 1 });
}

#[test]
fn stale_handle_is_skipped_not_unregistered() {
    let mut harness = Harness::new(UpdateMode::Full, 2);
    let stale = harness.encounter(1, 2);
    let live = harness.encounter(2, 2);
    let _ = harness.world.end_encounter(&stale);

    let mut out = Vec::new();
    let report = harness.pass(&mut out);

    assert_eq!(report.stale, 1);
    assert_eq!(report.evaluated, 1);
    assert!(harness.registry.is_registered(&stale));
    assert_eq!(
        harness.registry.get(&live).expect("registered").tick_counter(),
        1
    );
}

#[test]
fn batched_mode_evaluates_bounded_slices() {
    let mut harness = Harness::new(UpdateMode::Batched, 60);
    for id in 1..=12 {
        let _ = harness.encounter(id, 1);
    }
    let mut out = Vec::new();

    let queued = harness.pass(&mut out);
    assert_eq!(queued.evaluated, 0, "batched pass only queues keys");
    assert_eq!(harness.updater.pending(), 12);

    let mut slices = Vec::new();
    for _ in 0..4 {
        for (handle, task) in harness.scheduler.advance() {
            if task == Task::DrainEvaluations {
                let report = harness.updater.drain(
                    handle,
                    &mut harness.registry,
                    &mut harness.cache,
                    &mut harness.scheduler,
                    &mut out,
                );
                slices.push(report.evaluated);
            }
        }
    }

    assert_eq!(slices, vec![5, 5, 2]);
    assert!(harness.registry.iter().all(|record| record.tick_counter() == 1));
}

#[test]
fn periodic_pass_fires_every_frequency_steps() {
    let mut harness = Harness::new(UpdateMode::Full, 60);
    let _ = harness.updater.start(&mut harness.scheduler).expect("armed");

    let mut fired = Vec::new();
    for _ in 0..45 {
        for (_, task) in harness.scheduler.advance() {
            if task == Task::EvaluateRaids {
                fired.push(harness.scheduler.now().get());
            }
        }
    }
    assert_eq!(fired, vec![20, 40]);

    harness.updater.stop(&mut harness.scheduler);
    assert_eq!(harness.scheduler.pending(), 0);
}
