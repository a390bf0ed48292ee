pub mod delegates;
pub mod error;
pub mod hashes;
pub mod life;
pub mod nonces;
pub mod swaps;
pub mod withdrawals;

use alloy_primitives::{Address, U256};
use error::ApiError;
use std::str::FromStr;

pub(crate) fn parse_address(value: &str) -> Result<Address, ApiError> {
	value
		.parse()
		.map_err(|e| ApiError::bad_request("InvalidAddress", format!("'{}': {}", value, e)))
}

pub(crate) fn parse_u256(value: &str) -> Result<U256, ApiError> {
	U256::from_str(value)
		.map_err(|e| ApiError::bad_request("InvalidNumber", format!("'{}': {}", value, e)))
}
