use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{BreakerStatus, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub breaker: CircuitState,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let breaker = state.breaker.state();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if breaker == CircuitState::Closed {
            "operational"
        } else {
            "degraded"
        },
        breaker,
    })
}

pub async fn get_breaker(State(state): State<AppState>) -> Json<BreakerStatus> {
    Json(state.breaker.status())
}
