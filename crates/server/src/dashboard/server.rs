//! axum server for the operator API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use regionerator_engine::now_millis;
use regionerator_engine::visit::FLAG_ETERNAL;
use regionerator_engine::world::ChunkPos;
use tokio::net::TcpListener;

use super::{DashboardState, FlagAction, FlagRequest, FlagResponse, MAX_FLAG_RADIUS, StatsResponse};
use crate::player_registry::PlayerInfo;
use crate::settings;

type ApiError = (StatusCode, String);

pub fn router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/players", post(report_players))
        .route("/api/flags", post(flag))
        .route("/api/reload", post(reload))
        .with_state(state)
}

/// Start the API server. Runs forever on its own tasks.
pub async fn start(state: Arc<DashboardState>, port: u16) {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Operator API failed to bind to {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Operator API listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Operator API server error: {}", e);
    }
}

async fn stats(State(state): State<Arc<DashboardState>>) -> Json<StatsResponse> {
    let online = state.players.player_count() as u64;
    Json(StatsResponse {
        service: state.metrics.snapshot(online),
        worlds: state.manager.snapshots(),
    })
}

/// Replace the online player list.
async fn report_players(
    State(state): State<Arc<DashboardState>>,
    Json(players): Json<Vec<PlayerInfo>>,
) -> StatusCode {
    state.players.replace_all(players);
    state.metrics.player_report();
    StatusCode::NO_CONTENT
}

async fn flag(
    State(state): State<Arc<DashboardState>>,
    Json(req): Json<FlagRequest>,
) -> Result<Json<FlagResponse>, ApiError> {
    if !(0..=MAX_FLAG_RADIUS).contains(&req.radius) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("radius must be between 0 and {}", MAX_FLAG_RADIUS),
        ));
    }

    let config = state.config.snapshot();
    let world = req.world.as_str();
    let now = now_millis();
    let until = match req.action {
        FlagAction::Visit | FlagAction::Generated if !config.is_enabled(world) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("flagging is disabled for world {}", world),
            ));
        }
        FlagAction::Visit => config.flag_visit(world, now),
        FlagAction::Generated => config.flag_generated(world, now),
        FlagAction::Eternal => FLAG_ETERNAL,
        FlagAction::Unflag => 0,
    };

    let mut chunks = 0u64;
    for dx in -req.radius..=req.radius {
        for dz in -req.radius..=req.radius {
            let chunk = ChunkPos::new(req.x.saturating_add(dx), req.z.saturating_add(dz));
            match req.action {
                FlagAction::Visit | FlagAction::Eternal => state.flags.flag(world, chunk, until),
                FlagAction::Generated => state.flags.flag_generated(world, chunk, until),
                FlagAction::Unflag => state.flags.unflag(world, chunk),
            }
            chunks += 1;
        }
    }

    state.metrics.flag_request(chunks);
    tracing::debug!("{:?} {} chunks around {}:{},{}", req.action, chunks, world, req.x, req.z);
    Ok(Json(FlagResponse { chunks }))
}

/// Re-read the config file and swap it in for every reader.
async fn reload(State(state): State<Arc<DashboardState>>) -> Result<StatusCode, ApiError> {
    let path = state.settings_path.clone();
    let loaded = tokio::task::spawn_blocking(move || settings::load(&path))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match loaded {
        Ok(settings) => {
            state.config.replace(settings.engine);
            state.metrics.reload(true);
            tracing::info!("Reloaded configuration from {}", state.settings_path.display());
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            state.metrics.reload(false);
            tracing::warn!("Configuration reload failed: {:#}", e);
            Err((StatusCode::UNPROCESSABLE_ENTITY, format!("{:#}", e)))
        }
    }
}
