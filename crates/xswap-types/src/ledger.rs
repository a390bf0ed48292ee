//! Token ledger the engine settles against.
//!
//! The ledger tracks balances, allowances and signature-permit nonces for
//! every token, including the native coin (see [`crate::NATIVE_TOKEN`]).
//! Every write is journaled so a
//! failed invocation can be reverted to a [`Checkpoint`], giving the
//! all-or-nothing semantics an on-chain transaction would have.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
	/// Holder does not own enough of the token.
	#[error("Insufficient balance of {token} for {holder}: {available} < {required}")]
	InsufficientBalance {
		token: Address,
		holder: Address,
		available: U256,
		required: U256,
	},
	/// Spender has not been approved for enough of the owner's token.
	#[error("Insufficient allowance of {token} from {owner} to {spender}: {available} < {required}")]
	InsufficientAllowance {
		token: Address,
		owner: Address,
		spender: Address,
		available: U256,
		required: U256,
	},
	/// Crediting would overflow a balance.
	#[error("Balance overflow of {token} for {holder}")]
	Overflow { token: Address, holder: Address },
}

type BalanceKey = (Address, Address);
type AllowanceKey = (Address, Address, Address);
type PermitNonceKey = (Address, Address);

#[derive(Debug, Clone)]
enum JournalEntry {
	Balance {
		key: BalanceKey,
		previous: Option<U256>,
	},
	Allowance {
		key: AllowanceKey,
		previous: Option<U256>,
	},
	PermitNonce {
		key: PermitNonceKey,
		previous: Option<U256>,
	},
}

/// Position in the ledger journal that can be reverted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// In-memory token state with a write journal.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
	balances: HashMap<BalanceKey, U256>,
	allowances: HashMap<AllowanceKey, U256>,
	permit_nonces: HashMap<PermitNonceKey, U256>,
	journal: Vec<JournalEntry>,
}

impl Ledger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
		self.balances
			.get(&(token, holder))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
		self.allowances
			.get(&(token, owner, spender))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	/// Next nonce `owner` must sign in a permit for `token`.
	pub fn permit_nonce(&self, token: Address, owner: Address) -> U256 {
		self.permit_nonces
			.get(&(token, owner))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	/// Returns the current permit nonce of `owner` on `token` and advances it.
	pub fn use_permit_nonce(&mut self, token: Address, owner: Address) -> U256 {
		let key = (token, owner);
		let current = self.permit_nonce(token, owner);
		let previous = self.permit_nonces.insert(key, current + U256::from(1));
		self.journal.push(JournalEntry::PermitNonce { key, previous });
		current
	}

	/// Sets the allowance of `spender` over `owner`'s `token` to `amount`.
	pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
		self.set_allowance((token, owner, spender), amount);
	}

	/// Creates `amount` of `token` out of thin air for `holder`.
	pub fn mint(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), LedgerError> {
		self.credit(token, holder, amount)
	}

	/// Moves `amount` of `token` from `from` to `to`.
	pub fn transfer(
		&mut self,
		token: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), LedgerError> {
		if amount.is_zero() || from == to {
			return self.require_balance(token, from, amount);
		}
		self.debit(token, from, amount)?;
		self.credit(token, to, amount)
	}

	/// Moves `amount` of `token` from `owner` to `to`, spending `spender`'s allowance.
	pub fn transfer_from(
		&mut self,
		token: Address,
		spender: Address,
		owner: Address,
		to: Address,
		amount: U256,
	) -> Result<(), LedgerError> {
		let available = self.allowance(token, owner, spender);
		if available < amount {
			return Err(LedgerError::InsufficientAllowance {
				token,
				owner,
				spender,
				available,
				required: amount,
			});
		}
		if available != U256::MAX {
			self.set_allowance((token, owner, spender), available - amount);
		}
		self.transfer(token, owner, to, amount)
	}

	/// Returns the current journal position.
	pub fn checkpoint(&self) -> Checkpoint {
		Checkpoint(self.journal.len())
	}

	/// Undoes every write made after `checkpoint`.
	pub fn revert_to(&mut self, checkpoint: Checkpoint) {
		while self.journal.len() > checkpoint.0 {
			let Some(entry) = self.journal.pop() else {
				break;
			};
			match entry {
				JournalEntry::Balance { key, previous } => restore(&mut self.balances, key, previous),
				JournalEntry::Allowance { key, previous } => {
					restore(&mut self.allowances, key, previous)
				},
				JournalEntry::PermitNonce { key, previous } => {
					restore(&mut self.permit_nonces, key, previous)
				},
			}
		}
	}

	/// Makes every journaled write permanent.
	pub fn commit(&mut self) {
		self.journal.clear();
	}

	fn require_balance(&self, token: Address, holder: Address, amount: U256) -> Result<(), LedgerError> {
		let available = self.balance_of(token, holder);
		if available < amount {
			return Err(LedgerError::InsufficientBalance {
				token,
				holder,
				available,
				required: amount,
			});
		}
		Ok(())
	}

	fn debit(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), LedgerError> {
		self.require_balance(token, holder, amount)?;
		let available = self.balance_of(token, holder);
		self.set_balance((token, holder), available - amount);
		Ok(())
	}

	fn credit(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), LedgerError> {
		let updated = self
			.balance_of(token, holder)
			.checked_add(amount)
			.ok_or(LedgerError::Overflow { token, holder })?;
		self.set_balance((token, holder), updated);
		Ok(())
	}

	fn set_balance(&mut self, key: BalanceKey, value: U256) {
		let previous = self.balances.insert(key, value);
		self.journal.push(JournalEntry::Balance { key, previous });
	}

	fn set_allowance(&mut self, key: AllowanceKey, value: U256) {
		let previous = self.allowances.insert(key, value);
		self.journal.push(JournalEntry::Allowance { key, previous });
	}
}

fn restore<K: std::hash::Hash + Eq>(map: &mut HashMap<K, U256>, key: K, previous: Option<U256>) {
	match previous {
		Some(value) => {
			map.insert(key, value);
		},
		None => {
			map.remove(&key);
		},
	}
}
