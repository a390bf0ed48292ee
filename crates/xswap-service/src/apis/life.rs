use crate::server::AppState;
use axum::{extract::State, Json};
use xswap_core::LifeState;

/// Handles GET /api/life.
pub async fn get_life(State(state): State<AppState>) -> Json<LifeState> {
	Json(state.engine.life_state())
}
