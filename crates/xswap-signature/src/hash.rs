//! Canonical EIP-712 struct hashing for swaps.
//!
//! Arrays are hashed member by member in order, so two values differing
//! only in element order produce different hashes.

use alloy_primitives::{keccak256, B256, U256};
use xswap_types::utils::{hash_array, Eip712AbiEncoder};
use xswap_types::{StealthSwap, Swap, SwapStep, TokenCheck, TokenUse, WithdrawItem, Withdrawal};

pub const TOKEN_CHECK_TYPE: &str = "TokenCheck(address token,uint256 minAmount,uint256 maxAmount)";

pub const TOKEN_USE_TYPE: &str = "TokenUse(address protocol,uint256 chain,address account,uint256[] inIndices,TokenCheck[] outs,bytes args)";

pub const SWAP_STEP_TYPE: &str = "SwapStep(uint256 chain,address swapper,address account,bool useDelegate,uint256 nonce,uint256 deadline,TokenCheck[] ins,TokenCheck[] outs,TokenUse[] uses)";

pub const SWAP_TYPE: &str = "Swap(SwapStep[] steps)";

pub const STEALTH_SWAP_TYPE: &str =
	"StealthSwap(uint256 chain,address swapper,address account,bytes32[] stepHashes)";

pub const WITHDRAW_ITEM_TYPE: &str = "WithdrawItem(address token,uint256 amount,address to)";

pub const WITHDRAWAL_TYPE: &str = "Withdrawal(uint256 chain,address swapper,address account,uint256 nonce,uint256 deadline,WithdrawItem[] items)";

/// Full encoded type: the primary type followed by referenced types in
/// alphabetical order.
fn encode_type(primary: &str, referenced: &[&str]) -> B256 {
	let mut full = String::from(primary);
	for r in referenced {
		full.push_str(r);
	}
	keccak256(full.as_bytes())
}

pub fn token_check_type_hash() -> B256 {
	encode_type(TOKEN_CHECK_TYPE, &[])
}

pub fn token_use_type_hash() -> B256 {
	encode_type(TOKEN_USE_TYPE, &[TOKEN_CHECK_TYPE])
}

pub fn swap_step_type_hash() -> B256 {
	encode_type(SWAP_STEP_TYPE, &[TOKEN_CHECK_TYPE, TOKEN_USE_TYPE])
}

pub fn swap_type_hash() -> B256 {
	encode_type(
		SWAP_TYPE,
		&[SWAP_STEP_TYPE, TOKEN_CHECK_TYPE, TOKEN_USE_TYPE],
	)
}

pub fn stealth_swap_type_hash() -> B256 {
	encode_type(STEALTH_SWAP_TYPE, &[])
}

pub fn withdrawal_type_hash() -> B256 {
	encode_type(WITHDRAWAL_TYPE, &[WITHDRAW_ITEM_TYPE])
}

pub fn hash_token_check(check: &TokenCheck) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&token_check_type_hash());
	enc.push_address(&check.token);
	enc.push_u256(check.min_amount);
	enc.push_u256(check.max_amount);
	keccak256(enc.finish())
}

fn hash_token_checks(checks: &[TokenCheck]) -> B256 {
	hash_array(checks.iter().map(hash_token_check))
}

pub fn hash_token_use(token_use: &TokenUse) -> B256 {
	let indices = hash_array(
		token_use
			.in_indices
			.iter()
			.map(|&index| B256::from(U256::from(index).to_be_bytes::<32>())),
	);

	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&token_use_type_hash());
	enc.push_address(&token_use.protocol);
	enc.push_u64(token_use.chain);
	enc.push_address(&token_use.account);
	enc.push_b256(&indices);
	enc.push_b256(&hash_token_checks(&token_use.outs));
	enc.push_bytes(&token_use.args);
	keccak256(enc.finish())
}

/// Struct hash of a single step. Stealth commitments list these hashes.
pub fn hash_swap_step(step: &SwapStep) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&swap_step_type_hash());
	enc.push_u64(step.chain);
	enc.push_address(&step.swapper);
	enc.push_address(&step.account);
	enc.push_bool(step.use_delegate);
	enc.push_u256(step.nonce);
	enc.push_u64(step.deadline);
	enc.push_b256(&hash_token_checks(&step.ins));
	enc.push_b256(&hash_token_checks(&step.outs));
	enc.push_b256(&hash_array(step.uses.iter().map(hash_token_use)));
	keccak256(enc.finish())
}

pub fn hash_swap(swap: &Swap) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&swap_type_hash());
	enc.push_b256(&hash_array(swap.steps.iter().map(hash_swap_step)));
	keccak256(enc.finish())
}

pub fn hash_stealth_swap(stealth: &StealthSwap) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&stealth_swap_type_hash());
	enc.push_u64(stealth.chain);
	enc.push_address(&stealth.swapper);
	enc.push_address(&stealth.account);
	enc.push_b256(&hash_array(stealth.step_hashes.iter().copied()));
	keccak256(enc.finish())
}

fn hash_withdraw_item(item: &WithdrawItem) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&encode_type(WITHDRAW_ITEM_TYPE, &[]));
	enc.push_address(&item.token);
	enc.push_u256(item.amount);
	enc.push_address(&item.to);
	keccak256(enc.finish())
}

pub fn hash_withdrawal(withdrawal: &Withdrawal) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&withdrawal_type_hash());
	enc.push_u64(withdrawal.chain);
	enc.push_address(&withdrawal.swapper);
	enc.push_address(&withdrawal.account);
	enc.push_u256(withdrawal.nonce);
	enc.push_u64(withdrawal.deadline);
	enc.push_b256(&hash_array(withdrawal.items.iter().map(hash_withdraw_item)));
	keccak256(enc.finish())
}
