//! Signed swap data model.
//!
//! A user signs a [`Swap`] (or a [`StealthSwap`] commitment over step hashes)
//! describing bounded inputs, bounded outputs and the sub-protocol uses the
//! outputs are handed to. Relayers later submit one [`SwapStep`] at a time
//! together with the call legs that perform the actual conversion.

use alloy_primitives::{address, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel address standing for the chain's native coin.
pub const NATIVE_TOKEN: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Distribution amount meaning "everything that is left of the leg output".
pub const UNBOUNDED: U256 = U256::MAX;

/// Returns true when `token` is the native coin sentinel.
pub fn is_native(token: &Address) -> bool {
	*token == NATIVE_TOKEN
}

/// Violation of a [`TokenCheck`] bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenCheckError {
	#[error("insufficient token amount: {amount} < {min}")]
	Insufficient { amount: U256, min: U256 },
	#[error("excessive token amount: {amount} > {max}")]
	Excessive { amount: U256, max: U256 },
}

/// Bound on a quantity of one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCheck {
	pub token: Address,
	pub min_amount: U256,
	pub max_amount: U256,
}

impl TokenCheck {
	pub fn new(token: Address, min_amount: U256, max_amount: U256) -> Self {
		Self {
			token,
			min_amount,
			max_amount,
		}
	}

	/// A check that only accepts exactly `amount`.
	pub fn exact(token: Address, amount: U256) -> Self {
		Self::new(token, amount, amount)
	}

	/// Whether `min_amount <= max_amount`.
	pub fn is_well_formed(&self) -> bool {
		self.min_amount <= self.max_amount
	}

	/// Requires `amount` to lie within `min_amount..=max_amount`.
	pub fn check(&self, amount: U256) -> Result<(), TokenCheckError> {
		if amount < self.min_amount {
			return Err(TokenCheckError::Insufficient {
				amount,
				min: self.min_amount,
			});
		}
		if amount > self.max_amount {
			return Err(TokenCheckError::Excessive {
				amount,
				max: self.max_amount,
			});
		}
		Ok(())
	}

	/// Requires at least `min_amount` and caps the result at `max_amount`.
	pub fn cap(&self, amount: U256) -> Result<U256, TokenCheckError> {
		if amount < self.min_amount {
			return Err(TokenCheckError::Insufficient {
				amount,
				min: self.min_amount,
			});
		}
		Ok(amount.min(self.max_amount))
	}
}

/// Hand-off of a subset of step outputs to a sub-protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUse {
	/// Sub-protocol receiving the outputs.
	pub protocol: Address,
	/// Settlement network the protocol delivers to. Informational here.
	pub chain: u64,
	/// Destination account on the settlement network.
	pub account: Address,
	/// Indices into the step's `outs`.
	pub in_indices: Vec<usize>,
	/// What the protocol itself promises to deliver.
	pub outs: Vec<TokenCheck>,
	/// Opaque protocol arguments, covered by the signature.
	pub args: Bytes,
}

/// One authorized unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStep {
	pub chain: u64,
	/// Engine address the step is bound to (EIP-712 verifying contract).
	pub swapper: Address,
	pub account: Address,
	pub use_delegate: bool,
	pub nonce: U256,
	/// UNIX seconds, inclusive.
	pub deadline: u64,
	pub ins: Vec<TokenCheck>,
	pub outs: Vec<TokenCheck>,
	pub uses: Vec<TokenUse>,
}

impl SwapStep {
	/// Verifies the structural invariants of a step.
	///
	/// Every bound must be well formed and every use index must reference a
	/// declared output. Unused inputs and outputs are allowed.
	pub fn validate_shape(&self) -> Result<(), String> {
		if let Some(i) = self.ins.iter().position(|c| !c.is_well_formed()) {
			return Err(format!("input check {} has min > max", i));
		}
		if let Some(i) = self.outs.iter().position(|c| !c.is_well_formed()) {
			return Err(format!("output check {} has min > max", i));
		}
		for (u, token_use) in self.uses.iter().enumerate() {
			if let Some(index) = token_use
				.in_indices
				.iter()
				.find(|&&index| index >= self.outs.len())
			{
				return Err(format!(
					"use {} references output {} of {}",
					u,
					index,
					self.outs.len()
				));
			}
		}
		Ok(())
	}
}

/// Ordered multi-network route signed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
	pub steps: Vec<SwapStep>,
}

/// Commitment to an ordered list of step hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StealthSwap {
	pub chain: u64,
	pub swapper: Address,
	pub account: Address,
	pub step_hashes: Vec<B256>,
}

/// Signature-based allowance to resolve before pulling funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
	pub resolver: Address,
	pub token: Address,
	pub amount: U256,
	pub deadline: u64,
	pub signature: Bytes,
}

/// Token and amount pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAmount {
	pub token: Address,
	pub amount: U256,
}

impl TokenAmount {
	pub fn new(token: Address, amount: U256) -> Self {
		Self { token, amount }
	}
}

/// One withdrawal instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawItem {
	pub token: Address,
	pub amount: U256,
	pub to: Address,
}

/// Signed instruction to withdraw funds held by the engine or by a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
	pub chain: u64,
	/// Engine address the withdrawal is bound to.
	pub swapper: Address,
	/// Account whose delegate is drained; the zero address targets the engine's own holdings.
	pub account: Address,
	/// Nonce of the signer, drawn from the same space as step nonces.
	pub nonce: U256,
	/// UNIX seconds, inclusive.
	pub deadline: u64,
	pub items: Vec<WithdrawItem>,
}

/// Assignment of part of a leg output to an output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOut {
	pub out_index: usize,
	/// Exact amount, or [`UNBOUNDED`] for the remainder.
	pub amount: U256,
}

impl CallOut {
	pub fn new(out_index: usize, amount: U256) -> Self {
		Self { out_index, amount }
	}

	pub fn remainder(out_index: usize) -> Self {
		Self::new(out_index, UNBOUNDED)
	}
}

/// One external conversion call with its output distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLeg {
	pub in_token: Address,
	pub in_amount: U256,
	pub out_token: Address,
	pub outs: Vec<CallOut>,
	/// Zero address means no external call (pass-through leg).
	pub target: Address,
	pub data: Bytes,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn token(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	#[test]
	fn test_token_check_bounds() {
		let check = TokenCheck::new(token(1), U256::from(10), U256::from(20));

		assert!(check.check(U256::from(10)).is_ok());
		assert!(check.check(U256::from(20)).is_ok());
		assert_eq!(
			check.check(U256::from(9)),
			Err(TokenCheckError::Insufficient {
				amount: U256::from(9),
				min: U256::from(10)
			})
		);
		assert!(matches!(
			check.check(U256::from(21)),
			Err(TokenCheckError::Excessive { .. })
		));
	}

	#[test]
	fn test_token_check_cap() {
		let check = TokenCheck::new(token(1), U256::from(450), U256::from(500));

		assert_eq!(check.cap(U256::from(470)).unwrap(), U256::from(470));
		assert_eq!(check.cap(U256::from(730)).unwrap(), U256::from(500));
		assert!(check.cap(U256::from(449)).is_err());
	}

	#[test]
	fn test_step_shape_rejects_dangling_use_index() {
		let step = SwapStep {
			chain: 1,
			swapper: token(9),
			account: token(8),
			use_delegate: false,
			nonce: U256::from(1),
			deadline: 100,
			ins: vec![TokenCheck::exact(token(1), U256::from(5))],
			outs: vec![TokenCheck::exact(token(2), U256::from(5))],
			uses: vec![TokenUse {
				protocol: token(3),
				chain: 1,
				account: token(4),
				in_indices: vec![0, 1],
				outs: vec![],
				args: Bytes::new(),
			}],
		};

		let err = step.validate_shape().unwrap_err();
		assert!(err.contains("references output 1"));
	}

	#[test]
	fn test_step_serializes_camel_case() {
		let check = TokenCheck::exact(NATIVE_TOKEN, U256::from(1));
		let json = serde_json::to_value(&check).unwrap();
		assert!(json.get("minAmount").is_some());
		assert!(json.get("maxAmount").is_some());
	}
}
