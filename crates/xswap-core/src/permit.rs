//! Permit resolution.
//!
//! A permit turns an owner's signature into a ledger allowance just before
//! the engine pulls funds. Resolvers are consulted only when they are on the
//! engine's permit resolver whitelist. Permit nonces live in the ledger, so
//! a permit consumed by a step that is rolled back can be submitted again.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use xswap_call::Revert;
use xswap_signature::recover_signer;
use xswap_types::utils::{compute_domain_hash, compute_final_digest, Eip712AbiEncoder};
use xswap_types::Ledger;

/// Environment handed to a resolver.
pub struct PermitContext<'a> {
	pub ledger: &'a mut Ledger,
	pub chain_id: u64,
	/// Current UNIX time in seconds.
	pub now: u64,
}

/// Request to grant `spender` an allowance over `owner`'s `token`.
#[derive(Debug, Clone)]
pub struct PermitRequest<'a> {
	pub token: Address,
	pub owner: Address,
	pub spender: Address,
	pub amount: U256,
	pub deadline: u64,
	pub signature: &'a Bytes,
}

/// Adapter for one token-approval-by-signature scheme.
#[async_trait]
pub trait PermitResolver: Send + Sync {
	async fn resolve_permit(
		&self,
		ctx: PermitContext<'_>,
		request: PermitRequest<'_>,
	) -> Result<(), Revert>;
}

pub const PERMIT_TYPE: &str =
	"Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)";

pub const PERMIT_DOMAIN_NAME: &str = "xSwap Permit";

pub const DAI_PERMIT_TYPE: &str =
	"Permit(address holder,address spender,uint256 nonce,uint256 expiry,bool allowed)";

pub const DAI_PERMIT_DOMAIN_NAME: &str = "Dai Stablecoin";

/// Digest an owner signs to permit `spender`, scoped to the token as verifying contract.
pub fn permit_digest(
	chain_id: u64,
	token: &Address,
	owner: &Address,
	spender: &Address,
	amount: U256,
	nonce: U256,
	deadline: u64,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(PERMIT_TYPE.as_bytes()));
	enc.push_address(owner);
	enc.push_address(spender);
	enc.push_u256(amount);
	enc.push_u256(nonce);
	enc.push_u64(deadline);
	let domain = compute_domain_hash(PERMIT_DOMAIN_NAME, "1", chain_id, token);
	compute_final_digest(&domain, &keccak256(enc.finish()))
}

/// Digest a holder signs for a Dai-style all-or-nothing permit.
pub fn dai_permit_digest(
	chain_id: u64,
	token: &Address,
	holder: &Address,
	spender: &Address,
	nonce: U256,
	expiry: u64,
	allowed: bool,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(DAI_PERMIT_TYPE.as_bytes()));
	enc.push_address(holder);
	enc.push_address(spender);
	enc.push_u256(nonce);
	enc.push_u64(expiry);
	enc.push_bool(allowed);
	let domain = compute_domain_hash(DAI_PERMIT_DOMAIN_NAME, "1", chain_id, token);
	compute_final_digest(&domain, &keccak256(enc.finish()))
}

fn require_signer(digest: &B256, signature: &Bytes, owner: &Address) -> Result<(), Revert> {
	let signer = recover_signer(digest, signature).map_err(|e| Revert(e.to_string()))?;
	if signer != *owner {
		return Err(Revert("invalid permit signature".into()));
	}
	Ok(())
}

/// EIP-2612 style resolver with a sequential nonce per `(token, owner)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignaturePermitResolver;

#[async_trait]
impl PermitResolver for SignaturePermitResolver {
	async fn resolve_permit(
		&self,
		ctx: PermitContext<'_>,
		request: PermitRequest<'_>,
	) -> Result<(), Revert> {
		if request.deadline < ctx.now {
			return Err(Revert("permit expired".into()));
		}

		let nonce = ctx.ledger.permit_nonce(request.token, request.owner);
		let digest = permit_digest(
			ctx.chain_id,
			&request.token,
			&request.owner,
			&request.spender,
			request.amount,
			nonce,
			request.deadline,
		);
		require_signer(&digest, request.signature, &request.owner)?;

		ctx.ledger.use_permit_nonce(request.token, request.owner);
		ctx.ledger.approve(
			request.token,
			request.owner,
			request.spender,
			request.amount,
		);
		Ok(())
	}
}

/// Resolver for Dai-style permits, which only switch an unlimited allowance
/// on. The requested amount must therefore be `U256::MAX`; a zero deadline
/// never expires.
#[derive(Debug, Default, Clone, Copy)]
pub struct DaiPermitResolver;

#[async_trait]
impl PermitResolver for DaiPermitResolver {
	async fn resolve_permit(
		&self,
		ctx: PermitContext<'_>,
		request: PermitRequest<'_>,
	) -> Result<(), Revert> {
		if request.amount != U256::MAX {
			return Err(Revert(format!(
				"Dai permit grants an unlimited allowance, {} requested",
				request.amount
			)));
		}
		if request.deadline != 0 && request.deadline < ctx.now {
			return Err(Revert("permit expired".into()));
		}

		let nonce = ctx.ledger.permit_nonce(request.token, request.owner);
		let digest = dai_permit_digest(
			ctx.chain_id,
			&request.token,
			&request.owner,
			&request.spender,
			nonce,
			request.deadline,
			true,
		);
		require_signer(&digest, request.signature, &request.owner)?;

		ctx.ledger.use_permit_nonce(request.token, request.owner);
		ctx.ledger
			.approve(request.token, request.owner, request.spender, U256::MAX);
		Ok(())
	}
}
