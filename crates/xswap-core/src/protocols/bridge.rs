//! Protocol locking outputs in a bridge vault for delivery on another chain.
//!
//! Each amount handed over is paired with the destination-chain check at the
//! same position of `token_use.outs`. The protocol reports what the use's
//! account will receive on `token_use.chain`, capped at each check's maximum.

use super::{send, UseContext, UseProtocol};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use xswap_call::Revert;
use xswap_types::{TokenAmount, TokenUse};

#[derive(Debug, Clone, Copy)]
pub struct BridgeProtocol {
	vault: Address,
	chain_id: u64,
}

impl BridgeProtocol {
	/// Bridge locking into `vault` on the chain identified by `chain_id`.
	pub fn new(vault: Address, chain_id: u64) -> Self {
		Self { vault, chain_id }
	}

	pub fn vault(&self) -> Address {
		self.vault
	}
}

#[async_trait]
impl UseProtocol for BridgeProtocol {
	async fn use_protocol(
		&self,
		ctx: UseContext<'_>,
		token_use: &TokenUse,
		amounts: &[TokenAmount],
		_args: &Bytes,
	) -> Result<Vec<TokenAmount>, Revert> {
		if token_use.chain == self.chain_id {
			return Err(Revert(format!(
				"bridge destination {} is the source chain",
				token_use.chain
			)));
		}
		if token_use.outs.len() != amounts.len() {
			return Err(Revert(format!(
				"{} destination outputs for {} amounts",
				token_use.outs.len(),
				amounts.len()
			)));
		}

		let mut delivered = Vec::with_capacity(amounts.len());
		for (index, (amount, out)) in amounts.iter().zip(&token_use.outs).enumerate() {
			if amount.amount < out.min_amount {
				return Err(Revert(format!(
					"bridged amount {} of output {} below {}",
					amount.amount, index, out.min_amount
				)));
			}
			if !amount.amount.is_zero() {
				send(ctx.ledger, ctx.protocol, self.vault, amount)?;
			}
			delivered.push(TokenAmount::new(out.token, amount.amount.min(out.max_amount)));
		}

		tracing::debug!(
			vault = %self.vault,
			destination = token_use.chain,
			receiver = %token_use.account,
			"Locked outputs for bridging"
		);
		Ok(delivered)
	}
}
