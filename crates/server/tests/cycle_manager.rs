//! World discovery and cycle activation against real world directories.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use regionerator_engine::config::{Config, SharedConfig, WorldSettings};
use regionerator_engine::deletion::{DeletionContext, Rendezvous, RunSnapshot, RunState};
use regionerator_engine::flag::MemoryFlagCache;
use regionerator_engine::hooks::HookRegistry;
use regionerator_engine::now_millis;
use regionerator_engine::world::SlotIndex;
use regionerator_server::manager::{CycleManager, CycleReporter};
use regionerator_server::state::CycleState;
use tokio::sync::mpsc;

const HEADER: usize = 8192;
const SECTOR: usize = 4096;
const OLD_SECONDS: u32 = 1_000_000_000;
const WEEK_MS: i64 = 168 * 3_600_000;

/// Region file whose every slot holds one old sector.
fn write_full_region(world_root: &Path, file: &str) {
    let dir = world_root.join("region");
    fs::create_dir_all(&dir).unwrap();
    let mut bytes = vec![0u8; HEADER + SECTOR * 1024];
    for (n, slot) in SlotIndex::all().enumerate() {
        let pointer = (((2 + n) as u32) << 8) | 1;
        let at = slot.pointer_offset();
        bytes[at..at + 4].copy_from_slice(&pointer.to_be_bytes());
        let at = slot.timestamp_offset();
        bytes[at..at + 4].copy_from_slice(&OLD_SECONDS.to_be_bytes());
    }
    fs::write(dir.join(file), bytes).unwrap();
}

fn config(enabled: &[&str]) -> Config {
    let mut config = Config::default();
    config.deletion.recovery_time = 0;
    for world in enabled {
        config.worlds.insert(
            world.to_string(),
            WorldSettings {
                days_till_flag_expires: Some(7),
            },
        );
    }
    config
}

fn manager(
    worlds_dir: &Path,
    config: Config,
    state: CycleState,
) -> (CycleManager, mpsc::UnboundedReceiver<RunSnapshot>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = DeletionContext {
        config: Arc::new(SharedConfig::new(config)),
        flags: Arc::new(MemoryFlagCache::new()),
        hooks: Arc::new(HookRegistry::new()),
        rendezvous: Arc::new(Rendezvous::new()),
        listener: Some(Arc::new(CycleReporter::new(tx))),
    };
    (CycleManager::new(worlds_dir, ctx, Arc::new(state)), rx)
}

fn empty_state(root: &Path) -> CycleState {
    CycleState::empty(root.join("state.json"))
}

fn wait_idle(manager: &CycleManager) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !manager.running().is_empty() {
        assert!(Instant::now() < deadline, "workers never finished");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_due_world_runs_and_reschedules() {
    let root = tempfile::tempdir().unwrap();
    write_full_region(&root.path().join("world"), "r.0.0.mca");
    let (manager, mut rx) = manager(root.path(), config(&["world"]), empty_state(root.path()));

    let before = now_millis();
    assert_eq!(manager.attempt_activation(before), ["world"]);
    wait_idle(&manager);

    assert!(!root.path().join("world/region/r.0.0.mca").exists());
    let snapshots = manager.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].regions_checked, 1);
    assert_eq!(snapshots[0].regions_deleted, 1);
    assert_eq!(snapshots[0].state, RunState::Idle);
    assert!(snapshots[0].next_run >= before + WEEK_MS);

    let reported = rx.try_recv().unwrap();
    assert_eq!(reported.world, "world");
    assert_eq!(reported.state, RunState::Completed);

    // Not due again until the delay has passed.
    assert!(manager.attempt_activation(now_millis()).is_empty());
    assert_eq!(manager.attempt_activation(before + WEEK_MS * 2), ["world"]);
    wait_idle(&manager);
}

#[test]
fn test_disabled_and_plain_directories_are_skipped() {
    let root = tempfile::tempdir().unwrap();
    write_full_region(&root.path().join("world"), "r.0.0.mca");
    write_full_region(&root.path().join("world_nether").join("DIM-1"), "r.0.0.mca");
    fs::create_dir_all(root.path().join("logs")).unwrap();
    fs::write(root.path().join("server.properties"), "").unwrap();

    let enabled = config(&["world_nether", "logs"]);
    let (manager, _rx) = manager(root.path(), enabled, empty_state(root.path()));
    assert_eq!(manager.attempt_activation(now_millis()), ["world_nether"]);
    wait_idle(&manager);

    assert!(root.path().join("world/region/r.0.0.mca").exists());
    assert!(!root.path().join("world_nether/DIM-1/region/r.0.0.mca").exists());
}

#[test]
fn test_remembered_schedule_delays_first_run() {
    let root = tempfile::tempdir().unwrap();
    write_full_region(&root.path().join("world"), "r.0.0.mca");

    let now = now_millis();
    let state = CycleState::empty(root.path().join("state.json"));
    state.record(&RunSnapshot {
        world: "world".into(),
        regions_checked: 0,
        regions_deleted: 0,
        chunks_deleted: 0,
        next_run: now + 60_000,
        state: RunState::Completed,
    });

    let (manager, _rx) = manager(root.path(), config(&["world"]), state);
    assert!(manager.attempt_activation(now).is_empty());
    assert_eq!(manager.snapshots()[0].next_run, now + 60_000);
    assert!(root.path().join("world/region/r.0.0.mca").exists());

    assert_eq!(manager.attempt_activation(now + 60_000), ["world"]);
    wait_idle(&manager);
    assert!(!root.path().join("world/region/r.0.0.mca").exists());
}

#[test]
fn test_shutdown_cancels_for_good() {
    let root = tempfile::tempdir().unwrap();
    write_full_region(&root.path().join("world"), "r.0.0.mca");
    write_full_region(&root.path().join("world"), "r.1.0.mca");
    let mut config = config(&["world"]);
    config.deletion.recovery_time = 60_000;

    let (manager, _rx) = manager(root.path(), config, empty_state(root.path()));
    assert_eq!(manager.attempt_activation(now_millis()), ["world"]);

    let started = Instant::now();
    manager.shutdown();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(manager.running().is_empty());
    assert_eq!(manager.snapshots()[0].state, RunState::Cancelled);

    // A cancelled world is not restarted.
    assert!(manager.attempt_activation(i64::MAX - 10).is_empty());
}
