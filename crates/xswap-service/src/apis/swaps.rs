//! Relayer submission of signed steps.

use super::error::ApiError;
use crate::server::AppState;
use axum::{extract::State, Json};
use xswap_core::{StealthSwapParams, StepOutcome, SwapParams};
use xswap_types::truncate_id;

/// Handles POST /api/swaps.
pub async fn submit_swap(
	State(state): State<AppState>,
	Json(params): Json<SwapParams>,
) -> Result<Json<StepOutcome>, ApiError> {
	match state.engine.swap(&params).await {
		Ok(outcome) => Ok(Json(outcome)),
		Err(e) => {
			tracing::warn!(step_index = params.step_index, error = %e, "Swap submission failed");
			Err(e.into())
		},
	}
}

/// Handles POST /api/swaps/stealth.
pub async fn submit_stealth_swap(
	State(state): State<AppState>,
	Json(params): Json<StealthSwapParams>,
) -> Result<Json<StepOutcome>, ApiError> {
	match state.engine.swap_stealth(&params).await {
		Ok(outcome) => Ok(Json(outcome)),
		Err(e) => {
			tracing::warn!(
				account = %truncate_id(&params.stealth_swap.account.to_string()),
				error = %e,
				"Stealth swap submission failed"
			);
			Err(e.into())
		},
	}
}
