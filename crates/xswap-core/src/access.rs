//! Owner-gated account whitelists.

use alloy_primitives::Address;
use std::collections::BTreeSet;
use std::sync::RwLock;
use thiserror::Error;
use xswap_types::AccountWhitelist;

/// Errors from owner-gated administration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
	#[error("Caller {0} is not the owner")]
	Unauthorized(Address),
	#[error("Operations are terminated")]
	Terminated,
}

/// In-memory whitelist only its owner may edit.
#[derive(Debug)]
pub struct OwnableAccountWhitelist {
	owner: Address,
	accounts: RwLock<BTreeSet<Address>>,
}

impl OwnableAccountWhitelist {
	pub fn new(owner: Address) -> Self {
		Self::with_accounts(owner, [])
	}

	pub fn with_accounts(owner: Address, accounts: impl IntoIterator<Item = Address>) -> Self {
		Self {
			owner,
			accounts: RwLock::new(accounts.into_iter().collect()),
		}
	}

	pub fn owner(&self) -> Address {
		self.owner
	}

	/// Adds `account`; returns false when it was already present.
	pub fn add(&self, caller: &Address, account: Address) -> Result<bool, AccessError> {
		self.require_owner(caller)?;
		let added = self
			.accounts
			.write()
			.unwrap_or_else(|e| e.into_inner())
			.insert(account);
		if added {
			tracing::info!(%account, "Added account to whitelist");
		}
		Ok(added)
	}

	/// Removes `account`; returns false when it was absent.
	pub fn remove(&self, caller: &Address, account: &Address) -> Result<bool, AccessError> {
		self.require_owner(caller)?;
		let removed = self
			.accounts
			.write()
			.unwrap_or_else(|e| e.into_inner())
			.remove(account);
		if removed {
			tracing::info!(%account, "Removed account from whitelist");
		}
		Ok(removed)
	}

	/// Whitelisted accounts in ascending order.
	pub fn accounts(&self) -> Vec<Address> {
		self.accounts
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.iter()
			.copied()
			.collect()
	}

	fn require_owner(&self, caller: &Address) -> Result<(), AccessError> {
		if *caller != self.owner {
			return Err(AccessError::Unauthorized(*caller));
		}
		Ok(())
	}
}

impl AccountWhitelist for OwnableAccountWhitelist {
	fn contains(&self, account: &Address) -> bool {
		self.accounts
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.contains(account)
	}
}
