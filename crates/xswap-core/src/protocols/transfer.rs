//! Protocol that hands every amount to the use's account.

use super::{send, UseContext, UseProtocol};
use alloy_primitives::Bytes;
use async_trait::async_trait;
use xswap_call::Revert;
use xswap_types::{TokenAmount, TokenUse};

#[derive(Debug, Default, Clone, Copy)]
pub struct TransferProtocol;

#[async_trait]
impl UseProtocol for TransferProtocol {
	async fn use_protocol(
		&self,
		ctx: UseContext<'_>,
		token_use: &TokenUse,
		amounts: &[TokenAmount],
		_args: &Bytes,
	) -> Result<Vec<TokenAmount>, Revert> {
		for amount in amounts {
			send(ctx.ledger, ctx.protocol, token_use.account, amount)?;
		}
		Ok(amounts.to_vec())
	}
}
