//! Nonce status queries.

use super::{error::ApiError, parse_address, parse_u256};
use crate::server::AppState;
use alloy_primitives::{Address, U256};
use axum::{
	extract::{Path, State},
	Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct NonceResponse {
	pub account: Address,
	pub nonce: U256,
	pub consumed: bool,
}

/// Handles GET /api/nonces/{account}/{nonce}.
///
/// The nonce may be given in decimal or as `0x` hex.
pub async fn get_nonce(
	State(state): State<AppState>,
	Path((account, nonce)): Path<(String, String)>,
) -> Result<Json<NonceResponse>, ApiError> {
	let account = parse_address(&account)?;
	let nonce = parse_u256(&nonce)?;
	Ok(Json(NonceResponse {
		account,
		nonce,
		consumed: state.engine.is_nonce_consumed(&account, &nonce),
	}))
}
