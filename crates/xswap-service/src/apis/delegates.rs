//! Delegate queries and permissionless deployment.

use super::{error::ApiError, parse_address};
use crate::server::AppState;
use alloy_primitives::Address;
use axum::{
	extract::{Path, State},
	Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateResponse {
	pub account: Address,
	/// Deterministic delegate address, whether deployed or not.
	pub delegate: Address,
	pub deployed: bool,
}

/// Handles GET /api/delegates/{account}.
pub async fn get_delegate(
	State(state): State<AppState>,
	Path(account): Path<String>,
) -> Result<Json<DelegateResponse>, ApiError> {
	let account = parse_address(&account)?;
	Ok(Json(DelegateResponse {
		account,
		delegate: state.engine.predict_delegate_deploy(&account),
		deployed: state.engine.is_delegate_deployed(&account),
	}))
}

/// Handles POST /api/delegates/{account}.
///
/// Deploying is idempotent; a second call returns the same address.
pub async fn deploy_delegate(
	State(state): State<AppState>,
	Path(account): Path<String>,
) -> Result<Json<DelegateResponse>, ApiError> {
	let account = parse_address(&account)?;
	let delegate = state.engine.deploy_delegate(&account).await?;
	tracing::info!(%account, %delegate, "Delegate deployment requested");
	Ok(Json(DelegateResponse {
		account,
		delegate,
		deployed: true,
	}))
}
