//! Submissions accepted by the engine.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use xswap_types::{CallLeg, Permit, StealthSwap, Swap, SwapStep, TokenAmount};

/// Ordinary submission: one step of a fully signed swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapParams {
	pub swap: Swap,
	pub swap_signature: Bytes,
	/// Step of `swap` to execute.
	pub step_index: usize,
	pub permits: Vec<Permit>,
	/// Amount to pull for each step input.
	pub in_amounts: Vec<U256>,
	/// Conversion legs.
	pub call: Vec<CallLeg>,
	/// Runtime argument per use, in use order. Missing entries are empty.
	#[serde(default)]
	pub use_args: Vec<Bytes>,
}

/// Stealth submission: a step revealed against a signed commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StealthSwapParams {
	pub stealth_swap: StealthSwap,
	pub swap_signature: Bytes,
	pub step: SwapStep,
	pub permits: Vec<Permit>,
	pub in_amounts: Vec<U256>,
	pub call: Vec<CallLeg>,
	#[serde(default)]
	pub use_args: Vec<Bytes>,
}

/// Execution inputs shared by both submission kinds.
pub(crate) struct StepInput<'a> {
	pub permits: &'a [Permit],
	pub in_amounts: &'a [U256],
	pub call: &'a [CallLeg],
	pub use_args: &'a [Bytes],
}

/// Result of a settled step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
	pub step_hash: B256,
	/// Account the inputs were pulled from.
	pub payer: Address,
	/// Amount the conversion produced per step output, before capping.
	pub outputs: Vec<U256>,
	/// What each use reported back, in use order.
	pub use_outputs: Vec<Vec<TokenAmount>>,
}
