//! Nonce scheme keyed first by account, then by nonce.

use crate::{NonceError, NonceInterface};
use alloy_primitives::{Address, U256};
use std::collections::{HashMap, HashSet};
use xswap_types::{ConfigSchema, Schema, ValidationError};

/// Nested map `account -> {nonce}`.
#[derive(Default)]
pub struct DoubleMapNonces {
	consumed: HashMap<Address, HashSet<U256>>,
}

impl DoubleMapNonces {
	pub fn new() -> Self {
		Self::default()
	}
}

impl NonceInterface for DoubleMapNonces {
	fn is_consumed(&self, account: &Address, nonce: &U256) -> bool {
		self.consumed
			.get(account)
			.is_some_and(|nonces| nonces.contains(nonce))
	}

	fn consume(&mut self, account: &Address, nonce: &U256) -> Result<(), NonceError> {
		if !self.consumed.entry(*account).or_default().insert(*nonce) {
			return Err(NonceError::AlreadyConsumed {
				account: *account,
				nonce: *nonce,
			});
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(DoubleMapNoncesSchema)
	}
}

/// Configuration schema for DoubleMapNonces.
pub struct DoubleMapNoncesSchema;

impl ConfigSchema for DoubleMapNoncesSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create the double map scheme from configuration.
///
/// Configuration parameters:
/// - None required
pub fn create_nonces(config: &toml::Value) -> Result<Box<dyn NonceInterface>, NonceError> {
	DoubleMapNoncesSchema
		.validate(config)
		.map_err(|e| NonceError::Configuration(e.to_string()))?;
	Ok(Box::new(DoubleMapNonces::new()))
}

/// Registry for the double map nonce implementation.
pub struct Registry;

impl xswap_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "double_map";
	type Factory = crate::NonceFactory;

	fn factory() -> Self::Factory {
		create_nonces
	}
}

impl crate::NonceRegistry for Registry {}
