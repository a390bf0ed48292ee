//! Signature validation for the xSwap engine.
//!
//! Users authorize work by signing EIP-712 typed data: either a full
//! [`Swap`] or a [`StealthSwap`] commitment listing step hashes only.
//! Administrators sign [`Withdrawal`]s the same way. This crate hashes
//! every form canonically and recovers the signer.

use alloy_primitives::{Address, PrimitiveSignature, B256};
use thiserror::Error;
use xswap_types::utils::{compute_domain_hash, compute_final_digest};
use xswap_types::{StealthSwap, Swap, SwapStep, Withdrawal};

pub mod hash;

pub use hash::{
	hash_stealth_swap, hash_swap, hash_swap_step, hash_token_check, hash_token_use, hash_withdrawal,
};

/// EIP-712 domain name shared by every xSwap signature.
pub const DOMAIN_NAME: &str = "xSwap";
/// EIP-712 domain version.
pub const DOMAIN_VERSION: &str = "1";

/// Errors that can occur during signature validation.
#[derive(Debug, Error)]
pub enum SignatureError {
	/// Signature bytes could not be parsed or recovered.
	#[error("Malformed signature: {0}")]
	Malformed(String),
	/// Recovered signer differs from the expected account.
	#[error("Signer mismatch: expected {expected}, recovered {recovered}")]
	SignerMismatch { expected: Address, recovered: Address },
	/// Step hash is not part of the signed stealth commitment.
	#[error("Step {0} is not committed to by the stealth swap")]
	StepNotCommitted(B256),
	/// A swap without steps has no domain to validate against.
	#[error("Swap has no steps")]
	EmptySwap,
}

/// Domain-bound digest of a full swap, scoped to its first step.
pub fn swap_digest(swap: &Swap) -> Result<B256, SignatureError> {
	let first = swap.steps.first().ok_or(SignatureError::EmptySwap)?;
	let domain = compute_domain_hash(DOMAIN_NAME, DOMAIN_VERSION, first.chain, &first.swapper);
	Ok(compute_final_digest(&domain, &hash_swap(swap)))
}

/// Domain-bound digest of a stealth commitment.
pub fn stealth_swap_digest(stealth: &StealthSwap) -> B256 {
	let domain = compute_domain_hash(
		DOMAIN_NAME,
		DOMAIN_VERSION,
		stealth.chain,
		&stealth.swapper,
	);
	compute_final_digest(&domain, &hash_stealth_swap(stealth))
}

/// Domain-bound digest of a withdrawal.
pub fn withdrawal_digest(withdrawal: &Withdrawal) -> B256 {
	let domain = compute_domain_hash(
		DOMAIN_NAME,
		DOMAIN_VERSION,
		withdrawal.chain,
		&withdrawal.swapper,
	);
	compute_final_digest(&domain, &hash_withdrawal(withdrawal))
}

/// Recovers the address that produced a 65-byte `r || s || v` signature over `digest`.
pub fn recover_signer(digest: &B256, signature: &[u8]) -> Result<Address, SignatureError> {
	let signature = PrimitiveSignature::try_from(signature)
		.map_err(|e| SignatureError::Malformed(e.to_string()))?;
	signature
		.recover_address_from_prehash(digest)
		.map_err(|e| SignatureError::Malformed(e.to_string()))
}

/// Validates user signatures over swaps and stealth commitments.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureValidator;

impl SignatureValidator {
	pub fn new() -> Self {
		Self
	}

	/// Requires `signature` to be `steps[0].account`'s signature over the whole swap.
	pub fn validate_swap_signature(
		&self,
		swap: &Swap,
		signature: &[u8],
	) -> Result<(), SignatureError> {
		let digest = swap_digest(swap)?;
		let expected = swap.steps[0].account;
		self.require_signer(&digest, signature, expected)
	}

	/// Requires `step` to be committed to by `stealth` and `signature` to be
	/// `stealth.account`'s signature over the commitment.
	pub fn validate_stealth_swap_step_signature(
		&self,
		step: &SwapStep,
		stealth: &StealthSwap,
		signature: &[u8],
	) -> Result<(), SignatureError> {
		let step_hash = hash_swap_step(step);
		if !stealth.step_hashes.contains(&step_hash) {
			return Err(SignatureError::StepNotCommitted(step_hash));
		}
		let digest = stealth_swap_digest(stealth);
		self.require_signer(&digest, signature, stealth.account)
	}

	/// Recovers who signed `withdrawal`; authorization is up to the caller.
	pub fn recover_withdrawal_signer(
		&self,
		withdrawal: &Withdrawal,
		signature: &[u8],
	) -> Result<Address, SignatureError> {
		recover_signer(&withdrawal_digest(withdrawal), signature)
	}

	fn require_signer(
		&self,
		digest: &B256,
		signature: &[u8],
		expected: Address,
	) -> Result<(), SignatureError> {
		let recovered = recover_signer(digest, signature)?;
		if recovered != expected {
			tracing::debug!(%expected, %recovered, "Signature recovered unexpected signer");
			return Err(SignatureError::SignerMismatch {
				expected,
				recovered,
			});
		}
		Ok(())
	}
}
