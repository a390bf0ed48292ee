//! Utility functions shared across the engine crates.

pub mod eip712;
pub mod formatting;

pub use eip712::{
	compute_domain_hash, compute_final_digest, hash_array, Eip712AbiEncoder, DOMAIN_TYPE,
};
pub use formatting::{truncate_id, with_0x_prefix};
