use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::backend::PoolStatus;
use crate::error::PoolerError;
use crate::session::SessionSummary;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub pools: usize,
    pub degraded_pools: usize,
    pub sessions: usize,
}

#[derive(Serialize)]
pub struct FailoverResult {
    pub pool: String,
    pub address: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let pools = state.coordinator.pool_statuses();
    let status = if state.shutdown.is_triggered() {
        "draining"
    } else {
        "operational"
    };
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        pools: pools.len(),
        degraded_pools: pools.iter().filter(|p| p.degraded).count(),
        sessions: state.coordinator.session_count(),
    })
}

pub async fn get_pools(State(state): State<AdminState>) -> Json<Vec<PoolStatus>> {
    Json(state.coordinator.pool_statuses())
}

pub async fn get_sessions(State(state): State<AdminState>) -> Json<Vec<SessionSummary>> {
    Json(state.coordinator.session_summaries())
}

pub async fn post_failover(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<FailoverResult>, (StatusCode, Json<ErrorBody>)> {
    match state.coordinator.fail_over(&name) {
        Ok(Some(address)) => Ok(Json(FailoverResult { pool: name, address })),
        Ok(None) => Err((
            StatusCode::CONFLICT,
            Json(ErrorBody {
                code: "no_standby",
                message: format!("pool '{}' has no standby or already failed over", name),
            }),
        )),
        Err(e @ PoolerError::UnknownTarget(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                code: e.code(),
                message: e.to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                code: e.code(),
                message: e.to_string(),
            }),
        )),
    }
}
