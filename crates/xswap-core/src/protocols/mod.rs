//! Sub-protocols receiving step outputs.
//!
//! Before a protocol is invoked the engine transfers the realized amounts to
//! the protocol's address; the protocol then disposes of them from there.

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use xswap_call::Revert;
use xswap_types::{Ledger, TokenAmount, TokenUse};

pub mod bridge;
pub mod gas_vendor;
pub mod transfer;

pub use bridge::BridgeProtocol;
pub use gas_vendor::{GasFee, GasVendorProtocol};
pub use transfer::TransferProtocol;

/// Environment handed to a protocol for one use.
pub struct UseContext<'a> {
	pub ledger: &'a mut Ledger,
	/// Engine invoking the protocol.
	pub caller: Address,
	/// Address of the protocol itself, holding the handed-over amounts.
	pub protocol: Address,
}

/// Final disposition of a subset of step outputs.
#[async_trait]
pub trait UseProtocol: Send + Sync {
	/// Consumes `amounts` for `token_use` and reports what it produced.
	///
	/// `args` is the relayer-supplied runtime argument; the signed arguments
	/// are in `token_use.args`.
	async fn use_protocol(
		&self,
		ctx: UseContext<'_>,
		token_use: &TokenUse,
		amounts: &[TokenAmount],
		args: &Bytes,
	) -> Result<Vec<TokenAmount>, Revert>;
}

pub(crate) fn send(
	ledger: &mut Ledger,
	from: Address,
	to: Address,
	amount: &TokenAmount,
) -> Result<(), Revert> {
	ledger
		.transfer(amount.token, from, to, amount.amount)
		.map_err(|e| Revert(e.to_string()))
}
