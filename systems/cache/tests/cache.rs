use std::{sync::Arc, thread, time::Duration};

use raid_helper_core::{
    Coordinate, EncounterId, ObserverId, RaidKey, StepScheduler, Task, WorldView, ZoneId,
};
use raid_helper_memory_host::MemoryWorld;
use raid_helper_registry::RaidRegistry;
use raid_helper_system_cache::{Background, CacheManager, Config, Inline, Offload};

struct Harness {
    world: Arc<MemoryWorld>,
    registry: RaidRegistry,
    scheduler: StepScheduler<Task>,
    cache: CacheManager,
}

impl Harness {
    fn new(ttl: u64, offload: Box<dyn Offload>) -> Self {
        let world = Arc::new(MemoryWorld::new());
        let view: Arc<dyn WorldView> = world.clone();
        Self {
            world,
            registry: RaidRegistry::new(),
            scheduler: StepScheduler::new(),
            cache: CacheManager::new(Config::new(ttl, 50.0, 5), view, offload),
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

    fn present(&mut self, key: &RaidKey) -> Option<usize> {
        let now = self.scheduler.now();
        let record = self.registry.get(key).expect("registered");
        self.cache
            .creatures_for(record, now, &mut self.scheduler)
            .map(|creatures| creatures.len())
    }

    /// Advances one step, starting any due refresh jobs.
    fn step(&mut self) -> usize {
        let mut started = 0;
        for (handle, task) in self.scheduler.advance() {
            if task == Task::DrainCacheRefreshes {
                started += self
                    .cache
                    .drain(handle, &self.registry, &mut self.scheduler)
                    .unwrap_or_default();
            }
        }
        started
    }
}

#[test]
fn expired_entry_falls_back_to_live_lookup_and_requests_refresh() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let key = harness.encounter(1, 3);

    assert_eq!(harness.present(&key), Some(3));
    assert_eq!(harness.world.creature_lookups(), 1);
    assert_eq!(harness.cache.queued(), 1);

    assert_eq!(harness.step(), 1);
    assert_eq!(harness.cache.apply_completed(&mut harness.registry), 1);

    let lookups = harness.world.creature_lookups();
    assert_eq!(harness.present(&key), Some(3));
    assert_eq!(
        harness.world.creature_lookups(),
        lookups,
        "fresh entry is served from the cache"
    );
}

#[test]
fn fresh_entry_serves_stale_counts_until_ttl_elapses() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let key = harness.encounter(1, 2);

    let _ = harness.present(&key);
    let _ = harness.step();
    let _ = harness.cache.apply_completed(&mut harness.registry);
    let refreshed_at = harness
        .registry
        .get(&key)
        .and_then(|record| record.cache().last_refresh())
        .expect("refreshed");

    let _ = harness.world.clear_wave(&key);
    while harness.scheduler.now().steps_since(refreshed_at) < 10 {
        let _ = harness.step();
        assert_eq!(harness.present(&key), Some(2), "cached set still fresh");
    }

    let _ = harness.step();
    assert_eq!(harness.present(&key), Some(0), "expired entry asks the host");
}

#[test]
fn stale_handle_reports_none() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let key = harness.encounter(1, 2);
    let _ = harness.world.end_encounter(&key);

    assert_eq!(harness.present(&key), None);

    let _ = harness.step();
    assert_eq!(
        harness.cache.apply_completed(&mut harness.registry),
        0,
        "stale lookups are not stored"
    );
}

#[test]
fn refresh_jobs_start_in_bounded_batches() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let keys: Vec<RaidKey> = (1..=7).map(|id| harness.encounter(id, 1)).collect();
    for key in &keys {
        let _ = harness.present(key);
    }
    assert_eq!(harness.cache.queued(), 7);

    assert_eq!(harness.step(), 5);
    assert_eq!(harness.step(), 2);
    assert_eq!(harness.step(), 0);
    assert_eq!(harness.cache.apply_completed(&mut harness.registry), 7);
    assert_eq!(harness.cache.in_flight(), 0);
}

#[test]
fn duplicate_requests_are_ignored() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let key = harness.encounter(1, 1);

    assert!(harness.cache.request_refresh(&key, &mut harness.scheduler));
    assert!(!harness.cache.request_refresh(&key, &mut harness.scheduler));
    assert_eq!(harness.cache.queued(), 1);
    assert_eq!(harness.scheduler.pending(), 1);
}

#[test]
fn results_for_unregistered_records_are_dropped() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let key = harness.encounter(1, 4);
    let _ = harness.present(&key);
    let _ = harness.step();

    let _ = harness.registry.unregister(&key);
    assert_eq!(harness.cache.apply_completed(&mut harness.registry), 0);
}

#[test]
fn observers_come_from_anchor_radius() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let key = harness.encounter(1, 1);
    let anchor = harness.registry.get(&key).expect("registered").anchor();
    harness
        .world
        .place_observer(ObserverId::new(9), key.zone(), anchor.offset(10.0, 0.0, 0.0));
    harness.world.place_observer(
        ObserverId::new(10),
        key.zone(),
        anchor.offset(500.0, 0.0, 0.0),
    );

    let record = harness.registry.get(&key).expect("registered");
    let observers = harness.cache.observers_for(record, harness.scheduler.now());
    assert_eq!(observers.iter().copied().collect::<Vec<_>>(), vec![ObserverId::new(9)]);
}

#[test]
fn background_refresh_is_applied_on_the_stepping_context() {
    let mut harness = Harness::new(10, Box::new(Background));
    let key = harness.encounter(1, 3);
    let _ = harness.present(&key);
    assert_eq!(harness.step(), 1);

    let mut stored = 0;
    for _ in 0..200 {
        stored += harness.cache.apply_completed(&mut harness.registry);
        if stored > 0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(stored, 1);
    let record = harness.registry.get(&key).expect("registered");
    assert_eq!(record.cache().creatures().len(), 3);
}

#[test]
fn stopped_queue_is_rearmed_by_the_next_request() {
    let mut harness = Harness::new(10, Box::new(Inline));
    let key = harness.encounter(1, 2);
    let _ = harness.present(&key);
    assert_eq!(harness.cache.queued(), 1);

    harness.cache.stop(&mut harness.scheduler);
    harness.scheduler.clear();
    assert_eq!(harness.cache.queued(), 1, "stop keeps queued requests");

    assert!(
        !harness.cache.request_refresh(&key, &mut harness.scheduler),
        "key is already queued"
    );
    assert_eq!(harness.scheduler.pending(), 1, "drain armed again");

    assert_eq!(harness.step(), 1);
    assert_eq!(harness.cache.apply_completed(&mut harness.registry), 1);
    let record = harness.registry.get(&key).expect("registered");
    assert_eq!(record.cache().creatures().len(), 2);
}
