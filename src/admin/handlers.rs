use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::banning::BanInfo;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub uptime_secs: u64,
    pub modules: usize,
    pub banning_routes: usize,
    pub active_sessions: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ModuleStatus {
    pub index: usize,
    pub name: String,
    pub base_route: String,
    pub final_handler: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BanningRouteStatus {
    pub route_id: String,
    pub ban_minutes: u64,
    pub max_requests_per_second: u32,
    pub tracked_clients: usize,
    pub bans: Vec<BanStatus>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BanStatus {
    pub client: String,
    pub remaining_secs: u64,
    pub explicit: bool,
}

impl From<BanInfo> for BanStatus {
    fn from(info: BanInfo) -> Self {
        Self {
            client: info.client,
            remaining_secs: info.remaining_secs,
            explicit: info.explicit,
        }
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        uptime_secs: state.uptime_secs(),
        modules: state.registry.len(),
        banning_routes: state.banning.len(),
        active_sessions: state.sessions.as_ref().map(|s| s.len()),
    })
}

pub async fn get_modules(State(state): State<AdminState>) -> Json<Vec<ModuleStatus>> {
    let modules = state
        .registry
        .entries()
        .iter()
        .map(|entry| ModuleStatus {
            index: entry.index(),
            name: entry.name().to_string(),
            base_route: entry.module().base_route().to_string(),
            final_handler: entry.module().is_final_handler(),
        })
        .collect();
    Json(modules)
}

pub async fn get_banning_routes(State(state): State<AdminState>) -> Json<Vec<String>> {
    Json(state.banning.routes())
}

pub async fn get_banning_route(
    State(state): State<AdminState>,
    Path(route): Path<String>,
) -> Result<Json<BanningRouteStatus>, StatusCode> {
    let config = state.banning.try_get(&route).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(BanningRouteStatus {
        route_id: route,
        ban_minutes: config.ban_duration().as_secs() / 60,
        max_requests_per_second: config.max_requests_per_second(),
        tracked_clients: config.len(),
        bans: config.active_bans().into_iter().map(BanStatus::from).collect(),
    }))
}

pub async fn delete_banning_route(
    State(state): State<AdminState>,
    Path(route): Path<String>,
) -> StatusCode {
    match state.banning.try_remove(&route) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn delete_ban(
    State(state): State<AdminState>,
    Path((route, client)): Path<(String, String)>,
) -> StatusCode {
    let Some(config) = state.banning.try_get(&route) else {
        return StatusCode::NOT_FOUND;
    };
    if config.unban(&client) {
        tracing::info!(route_id = %route, client = %client, "Ban lifted by administrator");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
