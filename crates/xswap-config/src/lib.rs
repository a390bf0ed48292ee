//! Configuration module for the xSwap engine.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use alloy_primitives::{Address, U256};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the xSwap engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of the engine instance.
	pub engine: EngineConfig,
	/// Nonce storage scheme.
	#[serde(default)]
	pub nonces: NoncesConfig,
	/// Delegate registry identity.
	pub delegates: DelegatesConfig,
	/// Whitelists and their owner.
	pub access: AccessConfig,
	/// Built-in sub-protocols.
	#[serde(default)]
	pub protocols: ProtocolsConfig,
	/// Initial life-control state.
	#[serde(default)]
	pub life: LifeConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Identity of the engine instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Chain the engine executes steps for.
	pub chain_id: u64,
	/// Engine address; the verifying contract of every signature.
	pub address: String,
}

/// Nonce storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NoncesConfig {
	/// Which implementation to use.
	#[serde(default = "default_nonce_primary")]
	pub primary: String,
	/// Map of nonce implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl Default for NoncesConfig {
	fn default() -> Self {
		Self {
			primary: default_nonce_primary(),
			implementations: HashMap::new(),
		}
	}
}

fn default_nonce_primary() -> String {
	"slot_bitmap".to_string()
}

impl NoncesConfig {
	/// Configuration table of the primary implementation, empty when absent.
	pub fn primary_config(&self) -> toml::Value {
		self.implementations
			.get(&self.primary)
			.cloned()
			.unwrap_or_else(|| toml::Value::Table(toml::map::Map::new()))
	}
}

/// Delegate registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DelegatesConfig {
	/// Registry address, the CREATE2 deployer of every delegate.
	pub registry: String,
	/// Template every delegate is a minimal proxy of.
	pub template: String,
}

/// Whitelist configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessConfig {
	/// Account allowed to edit whitelists and control life state.
	pub owner: String,
	/// Extra callers allowed to withdraw from any delegate.
	#[serde(default)]
	pub withdraw_whitelist: Vec<String>,
	/// Accepted EIP-2612 style permit resolvers.
	#[serde(default)]
	pub permit_resolvers: Vec<String>,
	/// Accepted Dai-style permit resolvers.
	#[serde(default)]
	pub dai_permit_resolvers: Vec<String>,
	/// Accepted use protocols in addition to the built-in ones.
	#[serde(default)]
	pub use_protocols: Vec<String>,
}

/// Built-in sub-protocol configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProtocolsConfig {
	pub transfer: Option<TransferProtocolConfig>,
	pub gas_vendor: Option<GasVendorProtocolConfig>,
	pub bridge: Option<BridgeProtocolConfig>,
}

/// Plain transfer protocol.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferProtocolConfig {
	pub address: String,
}

/// Gas vendor protocol with a fixed fee quote.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasVendorProtocolConfig {
	pub address: String,
	/// Receiver of the gas fee.
	pub collector: String,
	/// Token the fee is charged in.
	pub fee_token: String,
	/// Fee amount as a decimal string.
	pub fee_amount: String,
}

/// Bridge protocol locking outputs for another chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeProtocolConfig {
	pub address: String,
	/// Account holding locked funds until they are released on the destination chain.
	pub vault: String,
}

/// Initial life-control state.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LifeConfig {
	#[serde(default)]
	pub paused: bool,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

/// Parses a `0x`-prefixed address, naming `field` on failure.
pub fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
	value.parse::<Address>().map_err(|e| {
		ConfigError::Validation(format!("Invalid address for {}: '{}' ({})", field, value, e))
	})
}

/// Parses a decimal or `0x` hexadecimal amount, naming `field` on failure.
pub fn parse_amount(field: &str, value: &str) -> Result<U256, ConfigError> {
	U256::from_str(value).map_err(|e| {
		ConfigError::Validation(format!("Invalid amount for {}: '{}' ({})", field, value, e))
	})
}

impl Config {
	/// Loads configuration from a file, following includes.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Engine address parsed from `engine.address`.
	pub fn engine_address(&self) -> Result<Address, ConfigError> {
		parse_address("engine.address", &self.engine.address)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.chain_id == 0 {
			return Err(ConfigError::Validation(
				"engine.chain_id must be greater than 0".into(),
			));
		}
		let engine = self.engine_address()?;
		if engine == Address::ZERO {
			return Err(ConfigError::Validation(
				"engine.address cannot be the zero address".into(),
			));
		}

		if self.nonces.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Nonce primary implementation cannot be empty".into(),
			));
		}
		if !self.nonces.implementations.is_empty()
			&& !self.nonces.implementations.contains_key(&self.nonces.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary nonce implementation '{}' not found in implementations",
				self.nonces.primary
			)));
		}

		let registry = parse_address("delegates.registry", &self.delegates.registry)?;
		parse_address("delegates.template", &self.delegates.template)?;
		if registry == engine {
			return Err(ConfigError::Validation(
				"delegates.registry must differ from engine.address".into(),
			));
		}

		parse_address("access.owner", &self.access.owner)?;
		for (field, list) in [
			("access.withdraw_whitelist", &self.access.withdraw_whitelist),
			("access.permit_resolvers", &self.access.permit_resolvers),
			(
				"access.dai_permit_resolvers",
				&self.access.dai_permit_resolvers,
			),
			("access.use_protocols", &self.access.use_protocols),
		] {
			for value in list {
				parse_address(field, value)?;
			}
		}

		if let Some(transfer) = &self.protocols.transfer {
			parse_address("protocols.transfer.address", &transfer.address)?;
		}
		if let Some(gas) = &self.protocols.gas_vendor {
			parse_address("protocols.gas_vendor.address", &gas.address)?;
			parse_address("protocols.gas_vendor.collector", &gas.collector)?;
			parse_address("protocols.gas_vendor.fee_token", &gas.fee_token)?;
			parse_amount("protocols.gas_vendor.fee_amount", &gas.fee_amount)?;
		}
		if let Some(bridge) = &self.protocols.bridge {
			parse_address("protocols.bridge.address", &bridge.address)?;
			parse_address("protocols.bridge.vault", &bridge.vault)?;
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation(
					"api.port must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
