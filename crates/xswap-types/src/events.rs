//! Event types for observers of the engine.
//!
//! Events are published on the engine's event bus once the corresponding
//! state change is final. A failed invocation publishes nothing.

use crate::TokenAmount;
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all engine events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwapEvent {
	/// Events from swap step execution.
	Step(StepEvent),
	/// Events from the delegate registry.
	Delegate(DelegateEvent),
	/// Events about the engine's own holdings.
	Engine(EngineEvent),
}

/// Events related to swap step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepEvent {
	/// A step has been validated, converted and fully distributed.
	Executed {
		step_hash: B256,
		account: Address,
		nonce: U256,
		/// Realized amount per step output index.
		outputs: Vec<U256>,
		/// What each use reported back, in use order.
		use_outputs: Vec<Vec<TokenAmount>>,
	},
}

/// Events related to delegate accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DelegateEvent {
	/// A delegate has been materialized for an account.
	Deployed { account: Address, delegate: Address },
	/// Funds were withdrawn from a delegate.
	Withdrawn {
		account: Address,
		caller: Address,
		items: usize,
	},
}

/// Events related to funds held by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
	/// Retained funds were withdrawn by a whitelisted caller.
	Withdrawn { caller: Address, items: usize },
}
