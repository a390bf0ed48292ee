//! Nonce registry for the xSwap engine.
//!
//! Tracks which `(account, nonce)` pairs have been consumed. Nonces are sparse
//! one-time tags rather than sequential counters, so relayers may submit steps
//! in any order or skip values. Several storage schemes are provided and
//! selected by name in configuration.

use alloy_primitives::{Address, U256};
use thiserror::Error;
use xswap_types::{ConfigSchema, ImplementationRegistry};

/// Re-export implementations
pub mod implementations {
	pub mod double_map;
	pub mod single_hash;
	pub mod slot_bitmap;
}

/// Errors that can occur during nonce operations.
#[derive(Debug, Error)]
pub enum NonceError {
	/// The pair has been consumed before.
	#[error("Nonce {nonce} already consumed for {account}")]
	AlreadyConsumed { account: Address, nonce: U256 },
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// No implementation is registered under the requested name.
	#[error("Unknown nonce implementation: {0}")]
	UnknownImplementation(String),
}

/// Trait defining the interface for nonce storage schemes.
///
/// Implementations must give O(1) check-and-set per nonce and must not
/// allocate proportionally to the nonce value.
pub trait NonceInterface: Send + Sync {
	/// Whether `(account, nonce)` has been consumed.
	fn is_consumed(&self, account: &Address, nonce: &U256) -> bool;

	/// Marks `(account, nonce)` consumed, failing if it already was.
	fn consume(&mut self, account: &Address, nonce: &U256) -> Result<(), NonceError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for nonce factory functions.
pub type NonceFactory = fn(&toml::Value) -> Result<Box<dyn NonceInterface>, NonceError>;

/// Registry trait for nonce implementations.
pub trait NonceRegistry: ImplementationRegistry<Factory = NonceFactory> {}

/// Get all registered nonce implementations.
///
/// Returns a vector of (name, factory) tuples for all available implementations.
pub fn get_all_implementations() -> Vec<(&'static str, NonceFactory)> {
	use implementations::{double_map, single_hash, slot_bitmap};

	vec![
		(double_map::Registry::NAME, double_map::Registry::factory()),
		(single_hash::Registry::NAME, single_hash::Registry::factory()),
		(slot_bitmap::Registry::NAME, slot_bitmap::Registry::factory()),
	]
}

/// Builds the implementation registered under `name` from its configuration.
pub fn create_nonce_backend(
	name: &str,
	config: &toml::Value,
) -> Result<Box<dyn NonceInterface>, NonceError> {
	let factory = get_all_implementations()
		.into_iter()
		.find(|(registered, _)| *registered == name)
		.map(|(_, factory)| factory)
		.ok_or_else(|| NonceError::UnknownImplementation(name.to_string()))?;
	factory(config)
}

/// Service that owns the active nonce backend.
pub struct NonceService {
	backend: Box<dyn NonceInterface>,
}

impl NonceService {
	pub fn new(backend: Box<dyn NonceInterface>) -> Self {
		Self { backend }
	}

	pub fn is_consumed(&self, account: &Address, nonce: &U256) -> bool {
		self.backend.is_consumed(account, nonce)
	}

	/// Consumes `(account, nonce)`; a second call for the same pair fails.
	pub fn consume(&mut self, account: &Address, nonce: &U256) -> Result<(), NonceError> {
		self.backend.consume(account, nonce)?;
		tracing::debug!(%account, %nonce, "Consumed nonce");
		Ok(())
	}
}
