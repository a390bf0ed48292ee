//! Hashing helpers for relayers preparing signatures.

use super::error::ApiError;
use alloy_primitives::{hex, B256};
use axum::Json;
use serde::Serialize;
use xswap_signature::{hash_swap_step, stealth_swap_digest, swap_digest};
use xswap_types::{with_0x_prefix, StealthSwap, Swap, SwapStep};

#[derive(Debug, Serialize)]
pub struct HashResponse {
	pub hash: String,
}

impl From<B256> for HashResponse {
	fn from(hash: B256) -> Self {
		Self {
			hash: with_0x_prefix(&hex::encode(hash)),
		}
	}
}

/// Handles POST /api/hashes/step: EIP-712 struct hash of a step, as committed
/// to by stealth swaps.
pub async fn hash_step(Json(step): Json<SwapStep>) -> Json<HashResponse> {
	Json(hash_swap_step(&step).into())
}

/// Handles POST /api/hashes/swap: digest the swap's first account signs.
pub async fn hash_swap(Json(swap): Json<Swap>) -> Result<Json<HashResponse>, ApiError> {
	let digest =
		swap_digest(&swap).map_err(|e| ApiError::bad_request("InvalidSwap", e.to_string()))?;
	Ok(Json(digest.into()))
}

/// Handles POST /api/hashes/stealth: digest of a stealth commitment.
pub async fn hash_stealth(Json(stealth): Json<StealthSwap>) -> Json<HashResponse> {
	Json(stealth_swap_digest(&stealth).into())
}
