use std::sync::Arc;

use raid_helper_core::{
    Activator, Coordinate, EncounterId, HostCommand, ObserverId, RaidKey, ScanMode, Settings,
    Signal, WorldView, ZoneId,
};
use raid_helper_memory_host::{Delivery, MemoryWorld};
use raid_helper_runtime::RaidHelper;
use raid_helper_system_cache::Inline;

const PLAYER: ObserverId = ObserverId::new(1);

fn overworld() -> ZoneId {
    ZoneId::new("overworld")
}

fn settings() -> Settings {
    Settings {
        zones: vec![overworld()],
        world_check_frequency: 5,
        raid_check_frequency: 2,
        bell_work_delay: 3,
        bell_cooldown: 10,
        teleport_delay: 4,
        cache_expire_time: 3,
        max_pool_size: 2,
        ..Settings::default()
    }
}

struct Host {
    world: Arc<MemoryWorld>,
    helper: RaidHelper,
    out: Vec<HostCommand>,
}

impl Host {
    fn new(settings: Settings) -> Self {
        let world = Arc::new(MemoryWorld::new());
        let view: Arc<dyn WorldView> = world.clone();
        let mut helper = RaidHelper::with_offload(settings, view, Box::new(Inline));
        helper.start();
        Self {
            world,
            helper,
            out: Vec::new(),
        }
    }

    fn encounter(&self, id: u32, anchor: Coordinate, creatures: usize) -> RaidKey {
        let handle = self
            .world
            .start_encounter(&overworld(), EncounterId::new(id), anchor);
        let _ = self.world.spawn_wave(handle.key(), creatures);
        handle.key().clone()
    }

    fn step(&mut self) -> raid_helper_runtime::StepReport {
        let report = self.helper.step(&mut self.out);
        self.world.apply_all(&self.out);
        self.out.clear();
        report
    }

    fn signal(&mut self, signal: Signal) -> Vec<HostCommand> {
        self.helper.handle_signal(&signal, &mut self.out);
        self.world.apply_all(&self.out);
        std::mem::take(&mut self.out)
    }

    fn ring(&mut self, actor: Activator, zone: ZoneId, coordinate: Coordinate) -> Vec<HostCommand> {
        self.signal(Signal::BeaconActivated {
            actor,
            zone,
            coordinate,
        })
    }

    fn run_until_unlocked(&mut self, key: &RaidKey) {
        for _ in 0..60 {
            let _ = self.step();
            if self
                .helper
                .registry()
                .get(key)
                .is_some_and(|record| record.teleport_enabled())
            {
                return;
            }
        }
        panic!("encounter {key} never unlocked");
    }

    fn cooling(&self, key: &RaidKey) -> bool {
        self.helper
            .registry()
            .get(key)
            .is_some_and(|record| record.cooldown_active())
    }
}

#[test]
fn discovered_encounter_unlocks_and_recalls_to_beacon() {
    let mut host = Host::new(settings());
    let key = host.encounter(1, Coordinate::new(0.0, 64.0, 0.0), 3);
    host.world
        .place_observer(PLAYER, &overworld(), Coordinate::new(10.0, 64.0, 0.0));

    host.run_until_unlocked(&key);
    let hints = host.world.take_deliveries();
    assert!(!hints.is_empty(), "unlocked encounter nudges nearby observers");
    assert!(hints
        .iter()
        .all(|delivery| matches!(delivery, Delivery::StatusBar { observer, .. } if *observer == PLAYER)));

    let beacon = Coordinate::new(20.0, 64.0, 0.0);
    let replies = host.ring(Activator::Observer(PLAYER), overworld(), beacon);
    assert_eq!(
        replies,
        vec![HostCommand::SendMessage {
            observer: PLAYER,
            text: settings().messages.success,
        }]
    );

    let mut teleported = 0;
    for _ in 0..4 {
        teleported += host.step().teleported;
    }
    assert_eq!(teleported, 3);

    let destination = Coordinate::new(20.0, 74.0, 0.0);
    for creature in host.world.living_creatures(&key).expect("live") {
        assert_eq!(host.world.creature_position(creature), Some(destination));
    }
}

#[test]
fn cooldown_reverts_after_exactly_bell_cooldown_steps() {
    let mut host = Host::new(settings());
    let key = host.encounter(1, Coordinate::new(0.0, 64.0, 0.0), 2);
    host.run_until_unlocked(&key);

    let _ = host.ring(
        Activator::Observer(PLAYER),
        overworld(),
        Coordinate::new(0.0, 64.0, 0.0),
    );
    assert!(host.cooling(&key), "cooldown starts with the activation");

    for _ in 0..9 {
        let _ = host.step();
        assert!(host.cooling(&key));
    }
    let report = host.step();
    assert_eq!(report.cooldowns_expired, 1);
    assert!(!host.cooling(&key));
}

#[test]
fn finished_encounter_is_unregistered_mid_cooldown() {
    let mut host = Host::new(settings());
    let key = host.encounter(1, Coordinate::new(0.0, 64.0, 0.0), 2);
    host.run_until_unlocked(&key);
    let _ = host.ring(
        Activator::Observer(PLAYER),
        overworld(),
        Coordinate::new(0.0, 64.0, 0.0),
    );

    let handle = host.world.end_encounter(&key).expect("live encounter");
    let _ = host.signal(Signal::EncounterFinished { handle });
    assert!(host.helper.registry().is_empty());
    assert!(!host.helper.registry().contains_zone(&overworld()));

    let mut teleported = 0;
    let mut expired = 0;
    for _ in 0..12 {
        let report = host.step();
        teleported += report.teleported;
        expired += report.cooldowns_expired;
    }
    assert_eq!(teleported, 0, "pending recall finds no record");
    assert_eq!(expired, 0, "cooldown expiry was cancelled");
}

#[test]
fn beacons_from_non_observers_or_unmonitored_zones_are_ignored() {
    let mut host = Host::new(settings());
    let key = host.encounter(1, Coordinate::new(0.0, 64.0, 0.0), 2);
    host.run_until_unlocked(&key);

    let anchor = Coordinate::new(0.0, 64.0, 0.0);
    assert!(host.ring(Activator::Other, overworld(), anchor).is_empty());
    assert!(host
        .ring(Activator::Observer(PLAYER), ZoneId::new("nether"), anchor)
        .is_empty());
    assert!(!host.cooling(&key));
}

#[test]
fn event_scanning_registers_on_trigger_without_sweeps() {
    let mut host = Host::new(Settings {
        scan_mode: ScanMode::Events,
        ..settings()
    });
    let key = host.encounter(1, Coordinate::new(0.0, 64.0, 0.0), 1);

    for _ in 0..10 {
        let _ = host.step();
    }
    assert!(host.helper.registry().is_empty(), "no periodic sweep");

    let _ = host.signal(Signal::EncounterTriggered { zone: overworld() });
    let report = host.step();
    assert_eq!(report.registered, 1);
    assert!(host.helper.registry().is_registered(&key));
}

#[test]
fn shutdown_cancels_every_task() {
    let mut host = Host::new(settings());
    let _ = host.encounter(1, Coordinate::new(0.0, 64.0, 0.0), 1);
    for _ in 0..3 {
        let _ = host.step();
    }
    assert!(host.helper.pending_tasks() > 0);

    host.helper.shutdown();
    assert_eq!(host.helper.pending_tasks(), 0);
    assert_eq!(host.helper.registry().len(), 1);
}

#[test]
fn restart_after_shutdown_ends_cooldown_and_accepts_new_rings() {
    let mut host = Host::new(settings());
    let key = host.encounter(1, Coordinate::new(0.0, 64.0, 0.0), 2);
    host.run_until_unlocked(&key);

    let beacon = Coordinate::new(0.0, 64.0, 0.0);
    let _ = host.ring(Activator::Observer(PLAYER), overworld(), beacon);
    assert!(host.cooling(&key));

    host.helper.shutdown();
    assert!(!host.cooling(&key), "cooldown ends with its expiry task");
    host.helper.start();

    let replies = host.ring(Activator::Observer(PLAYER), overworld(), beacon);
    assert_eq!(
        replies,
        vec![HostCommand::SendMessage {
            observer: PLAYER,
            text: settings().messages.success,
        }]
    );

    for _ in 0..9 {
        let _ = host.step();
        assert!(host.cooling(&key));
    }
    let report = host.step();
    assert_eq!(report.cooldowns_expired, 1);
    assert!(!host.cooling(&key));
}
