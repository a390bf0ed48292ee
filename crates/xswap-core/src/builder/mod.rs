//! Builder for assembling a swap engine from configuration.
//!
//! Config selects the nonce scheme, the delegate registry identity, the
//! whitelists and the built-in protocols. Call targets and any custom permit
//! resolvers or protocols are supplied in code before `build`.

use crate::access::OwnableAccountWhitelist;
use crate::clock::{Clock, SystemClock};
use crate::engine::{event_bus::EventBus, EngineParts, SwapEngine};
use crate::life::SimpleLifeControl;
use crate::permit::{DaiPermitResolver, PermitResolver, SignaturePermitResolver};
use crate::protocols::{BridgeProtocol, GasFee, GasVendorProtocol, TransferProtocol, UseProtocol};
use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use xswap_call::{CallExecutor, CallTarget};
use xswap_config::{parse_address, parse_amount, Config, ConfigError};
use xswap_delegate::DelegateRegistry;
use xswap_nonce::{create_nonce_backend, NonceService};
use xswap_types::Ledger;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
}

impl From<ConfigError> for BuilderError {
	fn from(err: ConfigError) -> Self {
		BuilderError::Config(err.to_string())
	}
}

/// A built engine together with the owner-controlled handles around it.
pub struct EngineHandle {
	pub engine: Arc<SwapEngine>,
	pub owner: Address,
	pub life: Arc<SimpleLifeControl>,
	pub withdraw_whitelist: Arc<OwnableAccountWhitelist>,
	pub permit_resolver_whitelist: Arc<OwnableAccountWhitelist>,
	pub use_protocol_whitelist: Arc<OwnableAccountWhitelist>,
	/// Present when a gas vendor is configured; its owner updates the fee through it.
	pub gas_vendor: Option<Arc<GasVendorProtocol>>,
}

/// Builder for constructing a SwapEngine.
pub struct EngineBuilder {
	config: Config,
	clock: Option<Arc<dyn Clock>>,
	ledger: Ledger,
	event_capacity: usize,
	call_targets: Vec<(Address, Arc<dyn CallTarget>)>,
	permit_resolvers: Vec<(Address, Arc<dyn PermitResolver>)>,
	protocols: Vec<(Address, Arc<dyn UseProtocol>)>,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: None,
			ledger: Ledger::new(),
			event_capacity: 1000,
			call_targets: Vec::new(),
			permit_resolvers: Vec::new(),
			protocols: Vec::new(),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Starts the engine from existing balances instead of an empty ledger.
	pub fn with_ledger(mut self, ledger: Ledger) -> Self {
		self.ledger = ledger;
		self
	}

	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	pub fn with_call_target(mut self, address: Address, target: Arc<dyn CallTarget>) -> Self {
		self.call_targets.push((address, target));
		self
	}

	/// Registers and whitelists a custom permit resolver.
	pub fn with_permit_resolver(mut self, address: Address, resolver: Arc<dyn PermitResolver>) -> Self {
		self.permit_resolvers.push((address, resolver));
		self
	}

	/// Registers and whitelists a custom use protocol.
	pub fn with_protocol(mut self, address: Address, protocol: Arc<dyn UseProtocol>) -> Self {
		self.protocols.push((address, protocol));
		self
	}

	pub fn build(self) -> Result<EngineHandle, BuilderError> {
		let config = &self.config;
		let address = config.engine_address()?;
		let owner = parse_address("access.owner", &config.access.owner)?;

		let primary = &config.nonces.primary;
		let backend = create_nonce_backend(primary, &config.nonces.primary_config()).map_err(|e| {
			tracing::error!(component = "nonces", implementation = %primary, error = %e, "Failed to create nonce implementation");
			BuilderError::Config(format!(
				"Failed to create nonce implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "nonces", implementation = %primary, "Loaded");

		let delegates = DelegateRegistry::new(
			parse_address("delegates.registry", &config.delegates.registry)?,
			parse_address("delegates.template", &config.delegates.template)?,
		);
		tracing::info!(component = "delegates", registry = %delegates.address(), template = %delegates.template(), "Loaded");

		let withdraw_whitelist = Arc::new(OwnableAccountWhitelist::with_accounts(
			owner,
			std::iter::once(address)
				.map(Ok)
				.chain(parse_all("access.withdraw_whitelist", &config.access.withdraw_whitelist))
				.collect::<Result<Vec<_>, _>>()?,
		));

		let mut permit_resolvers: HashMap<Address, Arc<dyn PermitResolver>> = HashMap::new();
		let configured_resolvers =
			parse_all("access.permit_resolvers", &config.access.permit_resolvers)
				.collect::<Result<Vec<_>, _>>()?;
		for resolver in configured_resolvers {
			permit_resolvers.insert(resolver, Arc::new(SignaturePermitResolver));
		}
		for resolver in parse_all(
			"access.dai_permit_resolvers",
			&config.access.dai_permit_resolvers,
		) {
			permit_resolvers.insert(resolver?, Arc::new(DaiPermitResolver));
		}
		for (resolver_address, resolver) in self.permit_resolvers {
			permit_resolvers.insert(resolver_address, resolver);
		}
		let permit_resolver_whitelist = Arc::new(OwnableAccountWhitelist::with_accounts(
			owner,
			permit_resolvers.keys().copied(),
		));

		let mut protocols: HashMap<Address, Arc<dyn UseProtocol>> = HashMap::new();
		if let Some(transfer) = &config.protocols.transfer {
			let protocol_address = parse_address("protocols.transfer.address", &transfer.address)?;
			protocols.insert(protocol_address, Arc::new(TransferProtocol));
			tracing::info!(component = "protocols", implementation = "transfer", address = %protocol_address, "Loaded");
		}
		let gas_vendor = match &config.protocols.gas_vendor {
			Some(vendor) => {
				let protocol_address =
					parse_address("protocols.gas_vendor.address", &vendor.address)?;
				let protocol = Arc::new(GasVendorProtocol::new(
					owner,
					GasFee {
						token: parse_address("protocols.gas_vendor.fee_token", &vendor.fee_token)?,
						amount: parse_amount("protocols.gas_vendor.fee_amount", &vendor.fee_amount)?,
						collector: parse_address("protocols.gas_vendor.collector", &vendor.collector)?,
					},
				));
				protocols.insert(protocol_address, protocol.clone());
				tracing::info!(component = "protocols", implementation = "gas_vendor", address = %protocol_address, "Loaded");
				Some(protocol)
			},
			None => None,
		};
		if let Some(bridge) = &config.protocols.bridge {
			let protocol_address = parse_address("protocols.bridge.address", &bridge.address)?;
			let vault = parse_address("protocols.bridge.vault", &bridge.vault)?;
			protocols.insert(
				protocol_address,
				Arc::new(BridgeProtocol::new(vault, config.engine.chain_id)),
			);
			tracing::info!(component = "protocols", implementation = "bridge", address = %protocol_address, %vault, "Loaded");
		}
		for (protocol_address, protocol) in self.protocols {
			protocols.insert(protocol_address, protocol);
		}

		let listed_protocols = parse_all("access.use_protocols", &config.access.use_protocols)
			.collect::<Result<Vec<_>, _>>()?;
		for listed in &listed_protocols {
			if !protocols.contains_key(listed) {
				tracing::warn!(protocol = %listed, "Whitelisted use protocol has no implementation");
			}
		}
		let use_protocol_whitelist = Arc::new(OwnableAccountWhitelist::with_accounts(
			owner,
			protocols.keys().copied().chain(listed_protocols),
		));

		let life = Arc::new(SimpleLifeControl::new(owner));
		if config.life.paused {
			life.pause(&owner)
				.map_err(|e| BuilderError::Config(e.to_string()))?;
			tracing::warn!("Engine starts paused");
		}

		let mut executor = CallExecutor::new();
		for (target_address, target) in self.call_targets {
			executor.register_target(target_address, target);
		}

		let engine = SwapEngine::new(EngineParts {
			chain_id: config.engine.chain_id,
			address,
			ledger: self.ledger,
			nonces: NonceService::new(backend),
			delegates,
			executor,
			life: life.clone(),
			withdraw_whitelist: withdraw_whitelist.clone(),
			permit_resolver_whitelist: permit_resolver_whitelist.clone(),
			use_protocol_whitelist: use_protocol_whitelist.clone(),
			permit_resolvers,
			protocols,
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			event_bus: EventBus::new(self.event_capacity),
		});
		tracing::info!(chain_id = config.engine.chain_id, %address, "Engine built");

		Ok(EngineHandle {
			engine: Arc::new(engine),
			owner,
			life,
			withdraw_whitelist,
			permit_resolver_whitelist,
			use_protocol_whitelist,
			gas_vendor,
		})
	}
}

fn parse_all<'a>(
	field: &'a str,
	values: &'a [String],
) -> impl Iterator<Item = Result<Address, ConfigError>> + 'a {
	values.iter().map(move |value| parse_address(field, value))
}
