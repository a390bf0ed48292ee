//! Protocol paying a relay gas fee out of step outputs.
//!
//! The vendor quotes a fee in one token. The fee goes to the quoted
//! collector and whatever is left is forwarded to the use's account. Only
//! the vendor's owner may change the quote.

use super::{send, UseContext, UseProtocol};
use crate::access::AccessError;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use xswap_call::Revert;
use xswap_types::{TokenAmount, TokenUse};

/// Fee quote of the gas vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasFee {
	pub token: Address,
	pub amount: U256,
	pub collector: Address,
}

#[derive(Debug)]
pub struct GasVendorProtocol {
	owner: Address,
	fee: RwLock<GasFee>,
}

impl GasVendorProtocol {
	pub fn new(owner: Address, fee: GasFee) -> Self {
		Self {
			owner,
			fee: RwLock::new(fee),
		}
	}

	pub fn owner(&self) -> Address {
		self.owner
	}

	pub fn gas_fee(&self) -> GasFee {
		*self.fee.read().unwrap_or_else(|e| e.into_inner())
	}

	/// Replaces the fee quote charged from the next use on.
	pub fn set_gas_fee(&self, caller: &Address, fee: GasFee) -> Result<(), AccessError> {
		if *caller != self.owner {
			return Err(AccessError::Unauthorized(*caller));
		}
		*self.fee.write().unwrap_or_else(|e| e.into_inner()) = fee;
		tracing::info!(token = %fee.token, amount = %fee.amount, collector = %fee.collector, "Updated gas fee");
		Ok(())
	}
}

#[async_trait]
impl UseProtocol for GasVendorProtocol {
	async fn use_protocol(
		&self,
		ctx: UseContext<'_>,
		token_use: &TokenUse,
		amounts: &[TokenAmount],
		_args: &Bytes,
	) -> Result<Vec<TokenAmount>, Revert> {
		let fee = self.gas_fee();
		let mut fee_due = fee.amount;
		let mut forwarded = Vec::with_capacity(amounts.len());

		for amount in amounts {
			let mut rest = *amount;
			if amount.token == fee.token && !fee_due.is_zero() {
				let paid = fee_due.min(amount.amount);
				send(
					ctx.ledger,
					ctx.protocol,
					fee.collector,
					&TokenAmount::new(fee.token, paid),
				)?;
				fee_due -= paid;
				rest.amount -= paid;
			}
			if !rest.amount.is_zero() {
				send(ctx.ledger, ctx.protocol, token_use.account, &rest)?;
				forwarded.push(rest);
			}
		}

		if !fee_due.is_zero() {
			return Err(Revert(format!(
				"insufficient gas fee: {} of {} unpaid",
				fee_due, fee.amount
			)));
		}

		tracing::debug!(collector = %fee.collector, fee = %fee.amount, "Paid gas fee");
		Ok(forwarded)
	}
}
