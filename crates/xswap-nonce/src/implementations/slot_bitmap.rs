//! Nonce scheme packing 256 nonces per account into one bitmap word.
//!
//! The word index is `nonce >> 8` and the bit is `nonce & 0xff`, so nearby
//! nonces share storage while distant ones stay sparse.

use crate::{NonceError, NonceInterface};
use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use xswap_types::{ConfigSchema, Schema, ValidationError};

/// Bitmap words keyed by `(account, nonce >> 8)`.
#[derive(Default)]
pub struct SlotBitmapNonces {
	words: HashMap<(Address, U256), U256>,
}

impl SlotBitmapNonces {
	pub fn new() -> Self {
		Self::default()
	}

	fn locate(nonce: &U256) -> (U256, U256) {
		let word = *nonce >> 8;
		let bit = U256::from(1) << (nonce.as_limbs()[0] & 0xff) as usize;
		(word, bit)
	}
}

impl NonceInterface for SlotBitmapNonces {
	fn is_consumed(&self, account: &Address, nonce: &U256) -> bool {
		let (word, bit) = Self::locate(nonce);
		self.words
			.get(&(*account, word))
			.is_some_and(|bits| !(*bits & bit).is_zero())
	}

	fn consume(&mut self, account: &Address, nonce: &U256) -> Result<(), NonceError> {
		let (word, bit) = Self::locate(nonce);
		let bits = self.words.entry((*account, word)).or_insert(U256::ZERO);
		if !(*bits & bit).is_zero() {
			return Err(NonceError::AlreadyConsumed {
				account: *account,
				nonce: *nonce,
			});
		}
		*bits |= bit;
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SlotBitmapNoncesSchema)
	}
}

/// Configuration schema for SlotBitmapNonces.
pub struct SlotBitmapNoncesSchema;

impl ConfigSchema for SlotBitmapNoncesSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create the slot bitmap scheme from configuration.
///
/// Configuration parameters:
/// - None required
pub fn create_nonces(config: &toml::Value) -> Result<Box<dyn NonceInterface>, NonceError> {
	SlotBitmapNoncesSchema
		.validate(config)
		.map_err(|e| NonceError::Configuration(e.to_string()))?;
	Ok(Box::new(SlotBitmapNonces::new()))
}

/// Registry for the slot bitmap nonce implementation.
pub struct Registry;

impl xswap_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "slot_bitmap";
	type Factory = crate::NonceFactory;

	fn factory() -> Self::Factory {
		create_nonces
	}
}

impl crate::NonceRegistry for Registry {}
