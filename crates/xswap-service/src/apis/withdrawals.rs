//! Signed withdrawals of engine and delegate funds.

use super::{error::ApiError, parse_address};
use crate::server::AppState;
use alloy_primitives::{Address, Bytes};
use axum::{
	extract::{Path, State},
	Json,
};
use serde::{Deserialize, Serialize};
use xswap_types::Withdrawal;

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
	pub withdrawal: Withdrawal,
	pub signature: Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalResponse {
	/// Signer the withdrawal was executed for.
	pub caller: Address,
	pub account: Address,
	pub items: usize,
}

/// Handles POST /api/withdrawals.
///
/// Moves funds the engine kept from unused outputs. Only whitelisted signers
/// succeed.
pub async fn withdraw(
	State(state): State<AppState>,
	Json(request): Json<WithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
	if !request.withdrawal.account.is_zero() {
		return Err(ApiError::bad_request(
			"InvalidAccount",
			format!(
				"withdrawal of delegate {} belongs under /delegates",
				request.withdrawal.account
			),
		));
	}
	settle(&state, &request).await
}

/// Handles POST /api/delegates/{account}/withdrawals.
pub async fn withdraw_delegate(
	State(state): State<AppState>,
	Path(account): Path<String>,
	Json(request): Json<WithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
	let account = parse_address(&account)?;
	if account.is_zero() || request.withdrawal.account != account {
		return Err(ApiError::bad_request(
			"InvalidAccount",
			format!(
				"withdrawal account {} does not match {}",
				request.withdrawal.account, account
			),
		));
	}
	settle(&state, &request).await
}

async fn settle(
	state: &AppState,
	request: &WithdrawalRequest,
) -> Result<Json<WithdrawalResponse>, ApiError> {
	let withdrawal = &request.withdrawal;
	match state
		.engine
		.withdraw_signed(withdrawal, &request.signature)
		.await
	{
		Ok(caller) => {
			tracing::info!(%caller, account = %withdrawal.account, items = withdrawal.items.len(), "Withdrawal executed");
			Ok(Json(WithdrawalResponse {
				caller,
				account: withdrawal.account,
				items: withdrawal.items.len(),
			}))
		},
		Err(e) => {
			tracing::warn!(account = %withdrawal.account, error = %e, "Withdrawal failed");
			Err(e.into())
		},
	}
}
