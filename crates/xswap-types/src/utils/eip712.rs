//! Generic EIP-712 utilities.
//!
//! These helpers provide:
//! - Domain hash computation
//! - Final digest computation (0x1901 || domainHash || structHash)
//! - A minimal ABI encoder for the field types used by the swap structs

use alloy_primitives::{keccak256, Address, B256, U256};

pub const DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Compute the EIP-712 domain hash
/// (keccak256(abi.encode(typeHash, nameHash, versionHash, chainId, verifyingContract))).
pub fn compute_domain_hash(
	name: &str,
	version: &str,
	chain_id: u64,
	verifying_contract: &Address,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
	enc.push_b256(&keccak256(name.as_bytes()));
	enc.push_b256(&keccak256(version.as_bytes()));
	enc.push_u64(chain_id);
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Hash of an array of already-hashed members (`keccak256(h0 || h1 || ...)`).
pub fn hash_array<I>(items: I) -> B256
where
	I: IntoIterator<Item = B256>,
{
	let mut enc = Eip712AbiEncoder::new();
	for item in items {
		enc.push_b256(&item);
	}
	keccak256(enc.finish())
}

/// Minimal ABI encoder for static words in EIP-712 struct hashing.
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Default for Eip712AbiEncoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		let word: [u8; 32] = v.to_be_bytes::<32>();
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u64(&mut self, v: u64) {
		self.push_u256(U256::from(v));
	}

	pub fn push_bool(&mut self, v: bool) {
		self.push_u64(u64::from(v));
	}

	/// Dynamic `bytes` are encoded as their keccak256 hash.
	pub fn push_bytes(&mut self, v: &[u8]) {
		self.push_b256(&keccak256(v));
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_words_are_left_padded() {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_address(&Address::repeat_byte(0xab));
		enc.push_bool(true);
		let buf = enc.finish();

		assert_eq!(buf.len(), 64);
		assert!(buf[..12].iter().all(|&b| b == 0));
		assert!(buf[12..32].iter().all(|&b| b == 0xab));
		assert_eq!(buf[63], 1);
	}

	#[test]
	fn test_domain_hash_depends_on_every_field() {
		let contract = Address::repeat_byte(1);
		let base = compute_domain_hash("xSwap", "1", 1, &contract);

		assert_ne!(base, compute_domain_hash("xSwap", "2", 1, &contract));
		assert_ne!(base, compute_domain_hash("xSwap", "1", 2, &contract));
		assert_ne!(
			base,
			compute_domain_hash("xSwap", "1", 1, &Address::repeat_byte(2))
		);
	}

	#[test]
	fn test_empty_array_hash() {
		assert_eq!(hash_array(std::iter::empty()), keccak256([]));
	}
}
