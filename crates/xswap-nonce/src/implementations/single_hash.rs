//! Nonce scheme keyed by a single hash of account and nonce.

use crate::{NonceError, NonceInterface};
use alloy_primitives::{keccak256, Address, B256, U256};
use std::collections::HashSet;
use xswap_types::utils::Eip712AbiEncoder;
use xswap_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

/// Flat set of `keccak256(salt || account || nonce)`.
pub struct SingleHashNonces {
	salt: B256,
	consumed: HashSet<B256>,
}

impl SingleHashNonces {
	/// Creates the scheme; `salt` separates independent registries sharing storage.
	pub fn new(salt: &str) -> Self {
		Self {
			salt: keccak256(salt.as_bytes()),
			consumed: HashSet::new(),
		}
	}

	fn key(&self, account: &Address, nonce: &U256) -> B256 {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&self.salt);
		enc.push_address(account);
		enc.push_u256(*nonce);
		keccak256(enc.finish())
	}
}

impl NonceInterface for SingleHashNonces {
	fn is_consumed(&self, account: &Address, nonce: &U256) -> bool {
		self.consumed.contains(&self.key(account, nonce))
	}

	fn consume(&mut self, account: &Address, nonce: &U256) -> Result<(), NonceError> {
		let key = self.key(account, nonce);
		if !self.consumed.insert(key) {
			return Err(NonceError::AlreadyConsumed {
				account: *account,
				nonce: *nonce,
			});
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SingleHashNoncesSchema)
	}
}

/// Configuration schema for SingleHashNonces.
pub struct SingleHashNoncesSchema;

impl ConfigSchema for SingleHashNoncesSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("salt", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(s) if !s.is_empty() => Ok(()),
					_ => Err("salt cannot be empty".to_string()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create the single hash scheme from configuration.
///
/// Configuration parameters:
/// - `salt`: optional domain separator, defaults to "xSwap.nonces"
pub fn create_nonces(config: &toml::Value) -> Result<Box<dyn NonceInterface>, NonceError> {
	SingleHashNoncesSchema
		.validate(config)
		.map_err(|e| NonceError::Configuration(e.to_string()))?;

	let salt = config
		.get("salt")
		.and_then(|v| v.as_str())
		.unwrap_or("xSwap.nonces");
	Ok(Box::new(SingleHashNonces::new(salt)))
}

/// Registry for the single hash nonce implementation.
pub struct Registry;

impl xswap_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "single_hash";
	type Factory = crate::NonceFactory;

	fn factory() -> Self::Factory {
		create_nonces
	}
}

impl crate::NonceRegistry for Registry {}
