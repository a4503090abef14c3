use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use regionerator_engine::config::SharedConfig;
use regionerator_engine::deletion::{CycleListener, DeletionContext, Rendezvous};
use regionerator_engine::flag::{FlagCache, MemoryFlagCache};
use regionerator_engine::hooks::{HookRegistry, MainThread};
use regionerator_engine::now_millis;
use regionerator_server::dashboard::{self, DashboardState};
use regionerator_server::flagging::FlaggingTask;
use regionerator_server::manager::{CycleManager, CycleReporter};
use regionerator_server::player_registry::PlayerRegistry;
use regionerator_server::state::CycleState;
use regionerator_server::zones::ZoneHook;
use regionerator_server::{flag_store, settings};
use tokio::sync::mpsc;

/// Flag autosave interval (5 minutes).
const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);

fn arg(name: &str) -> Option<String> {
    std::env::args().skip_while(|a| a != name).nth(1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path: PathBuf = arg("--config")
        .unwrap_or_else(|| "regionerator.toml".into())
        .into();
    let worlds_dir: PathBuf = arg("--worlds").unwrap_or_else(|| ".".into()).into();
    let data_dir: PathBuf = arg("--data")
        .unwrap_or_else(|| ".regionerator".into())
        .into();
    let dashboard_port: u16 = arg("--dashboard-port")
        .and_then(|s| s.parse().ok())
        .unwrap_or(8000);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Regionerator -- region reclamation service");

    let settings = settings::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let config = Arc::new(SharedConfig::new(settings.engine.clone()));

    // ── Flags and remembered schedule ───────────────────────────────────
    let flags_path = data_dir.join("flags.json");
    let flags = Arc::new(MemoryFlagCache::new());
    match flag_store::load(&flags_path, &flags) {
        Ok(0) => tracing::info!("No saved flags found"),
        Ok(n) => tracing::info!("Loaded {} flags from {}", n, flags_path.display()),
        Err(e) => tracing::error!("Failed to load flags: {:#}", e),
    }

    let state_path = data_dir.join("state.json");
    let state = match CycleState::load(&state_path) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Failed to load cycle state, starting fresh: {:#}", e);
            Arc::new(CycleState::empty(&state_path))
        }
    };

    // ── Protection hooks ─────────────────────────────────────────────────
    // Non-async hooks run on this detached thread until the registry drops.
    let (main_thread, queue) = MainThread::channel();
    thread::Builder::new()
        .name("host".into())
        .spawn(move || queue.run())
        .context("starting hook executor thread")?;
    let mut hooks = HookRegistry::new();
    if let Some(zones) = ZoneHook::from_settings(&settings.protection) {
        hooks.register(Arc::new(zones));
    }
    hooks.attach_main_thread(main_thread);
    if hooks.is_empty() {
        tracing::info!("No protection hooks enabled");
    } else {
        let names: Vec<&str> = hooks.names().collect();
        tracing::info!("Protection hooks: {}", names.join(", "));
    }

    // ── Cycle manager ────────────────────────────────────────────────────
    let (cycle_tx, mut cycle_rx) = mpsc::unbounded_channel();
    let reporter: Arc<dyn CycleListener> = Arc::new(CycleReporter::new(cycle_tx));
    let flag_cache: Arc<dyn FlagCache> = flags.clone();
    let ctx = DeletionContext {
        config: Arc::clone(&config),
        flags: Arc::clone(&flag_cache),
        hooks: Arc::new(hooks),
        rendezvous: Arc::new(Rendezvous::new()),
        listener: Some(reporter),
    };
    let manager = Arc::new(CycleManager::new(&worlds_dir, ctx, Arc::clone(&state)));
    let players = Arc::new(PlayerRegistry::new());

    // Start the operator API (non-blocking, runs on its own tasks).
    let dashboard = Arc::new(DashboardState::new(
        Arc::clone(&manager),
        Arc::clone(&players),
        Arc::clone(&flag_cache),
        Arc::clone(&config),
        &config_path,
    ));
    tokio::spawn(dashboard::start(Arc::clone(&dashboard), dashboard_port));

    let flagging = Arc::new(FlaggingTask::new(
        Arc::clone(&config),
        Arc::clone(&flag_cache),
        Arc::clone(&players),
        Arc::clone(&manager),
    ));
    tokio::spawn(flagging.run());

    // ── Remembered cycles ────────────────────────────────────────────────
    let record_state = Arc::clone(&state);
    let record_dashboard = Arc::clone(&dashboard);
    let recorder = tokio::spawn(async move {
        while let Some(run) = cycle_rx.recv().await {
            record_state.record(&run);
            record_dashboard.metrics.cycle_recorded();
            let state = Arc::clone(&record_state);
            match tokio::task::spawn_blocking(move || state.save()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Failed to save cycle state: {:#}", e),
                Err(e) => tracing::error!("Cycle state save task failed: {}", e),
            }
        }
    });

    // ── Periodic flag autosave ───────────────────────────────────────────
    let save_flags = Arc::clone(&flags);
    let save_path = flags_path.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUTOSAVE_INTERVAL);
        interval.tick().await; // first tick is immediate, skip it
        loop {
            interval.tick().await;
            let flags = Arc::clone(&save_flags);
            let path = save_path.clone();
            match tokio::task::spawn_blocking(move || flag_store::save(&path, &flags)).await {
                Ok(Ok(n)) => tracing::debug!("Autosaved {} flags", n),
                Ok(Err(e)) => tracing::error!("Flag autosave failed: {:#}", e),
                Err(e) => tracing::error!("Flag autosave task failed: {}", e),
            }
        }
    });

    // Worlds already due start now rather than one flagging interval later.
    let startup = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || startup.attempt_activation(now_millis()))
        .await
        .context("initial cycle activation")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    tracing::info!("Ctrl+C received, shutting down...");

    // ── Shutdown ─────────────────────────────────────────────────────────
    // Runners finishing from here on find the reporter closed and move on.
    recorder.abort();
    let stopping = Arc::clone(&manager);
    if let Err(e) = tokio::task::spawn_blocking(move || stopping.shutdown()).await {
        tracing::error!("Worker shutdown failed: {}", e);
    }

    tracing::info!("Saving flags before exit...");
    match flag_store::save(&flags_path, &flags) {
        Ok(n) => tracing::info!("Shutdown save complete: {} flags written", n),
        Err(e) => tracing::error!("Shutdown save failed: {:#}", e),
    }
    Ok(())
}
