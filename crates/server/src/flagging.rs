//! Periodic visit flagging around online players.

use std::sync::Arc;

use regionerator_engine::config::SharedConfig;
use regionerator_engine::flag::FlagCache;
use regionerator_engine::now_millis;

use crate::manager::CycleManager;
use crate::player_registry::PlayerRegistry;

pub struct FlaggingTask {
    config: Arc<SharedConfig>,
    flags: Arc<dyn FlagCache>,
    players: Arc<PlayerRegistry>,
    manager: Arc<CycleManager>,
}

impl FlaggingTask {
    pub fn new(
        config: Arc<SharedConfig>,
        flags: Arc<dyn FlagCache>,
        players: Arc<PlayerRegistry>,
        manager: Arc<CycleManager>,
    ) -> Self {
        Self {
            config,
            flags,
            players,
            manager,
        }
    }

    /// Flag the chunks around every player that counts as a visitor.
    /// Returns how many players were flagged for.
    pub fn flag_players(&self, now: i64) -> usize {
        let config = self.config.snapshot();
        let radius = config.flag_radius();
        let mut flagged = 0;

        for player in self.players.snapshot() {
            if player.spectator || !config.is_enabled(&player.world) {
                continue;
            }
            let until = config.flag_visit(&player.world, now);
            self.flags.flag_radius(&player.world, player.chunk(), radius, until);
            flagged += 1;
        }
        flagged
    }

    /// Tick forever. The interval is re-read every tick so reloads apply.
    pub async fn run(self: Arc<Self>) {
        loop {
            let interval = self.config.snapshot().flagging_interval();
            tokio::time::sleep(interval).await;

            let task = Arc::clone(&self);
            let tick = tokio::task::spawn_blocking(move || {
                let now = now_millis();
                task.flag_players(now);
                task.manager.attempt_activation(now)
            });
            if let Err(e) = tick.await {
                tracing::error!("Flagging tick failed: {}", e);
            }
        }
    }
}
