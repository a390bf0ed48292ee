//! Delegate registry for the xSwap engine.
//!
//! A delegate is a per-account holding address whose identity can be
//! computed before it exists. Addresses follow CREATE2 over the registry
//! address with the owning account as salt and an EIP-1167 minimal proxy
//! of the delegate template as init code. Predicting and deploying are
//! independent facts: funds sent to a predicted address do not deploy it.

use alloy_primitives::{hex, keccak256, Address, B256};
use std::collections::HashMap;
use thiserror::Error;
use xswap_types::{AccountWhitelist, Ledger, LedgerError, WithdrawItem};

const PROXY_PREFIX: [u8; 20] = hex!("3d602d80600a3d3981f3363d3d373d3d3d363d73");
const PROXY_SUFFIX: [u8; 15] = hex!("5af43d82803e903d91602b57fd5bf3");

/// Errors that can occur during delegate operations.
#[derive(Debug, Error)]
pub enum DelegateError {
	/// Caller is neither the owner nor whitelisted.
	#[error("Caller {caller} may not withdraw from the delegate of {account}")]
	Unauthorized { caller: Address, account: Address },
	/// No delegate has been deployed for the account.
	#[error("Delegate of {0} is not deployed")]
	NotDeployed(Address),
	/// Ledger rejected a withdrawal item.
	#[error("Withdrawal failed: {0}")]
	Ledger(#[from] LedgerError),
}

/// Materialized delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegateRecord {
	pub address: Address,
	pub owner: Address,
}

/// Result of a deploy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
	pub delegate: Address,
	/// False when the delegate already existed.
	pub created: bool,
}

/// EIP-1167 minimal proxy creation code pointing at `template`.
pub fn proxy_init_code(template: &Address) -> Vec<u8> {
	let mut code = Vec::with_capacity(55);
	code.extend_from_slice(&PROXY_PREFIX);
	code.extend_from_slice(template.as_slice());
	code.extend_from_slice(&PROXY_SUFFIX);
	code
}

/// Registry of per-account delegates.
#[derive(Debug, Clone)]
pub struct DelegateRegistry {
	address: Address,
	template: Address,
	init_code_hash: B256,
	delegates: HashMap<Address, DelegateRecord>,
}

impl DelegateRegistry {
	/// Creates a registry identified by `address` cloning `template`.
	pub fn new(address: Address, template: Address) -> Self {
		Self {
			address,
			template,
			init_code_hash: keccak256(proxy_init_code(&template)),
			delegates: HashMap::new(),
		}
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn template(&self) -> Address {
		self.template
	}

	/// Deterministic delegate address of `account`.
	pub fn predict(&self, account: &Address) -> Address {
		self.address
			.create2(account.into_word(), self.init_code_hash)
	}

	pub fn is_deployed(&self, account: &Address) -> bool {
		self.delegates.contains_key(account)
	}

	pub fn record(&self, account: &Address) -> Option<&DelegateRecord> {
		self.delegates.get(account)
	}

	/// Materializes the delegate of `account`, owned by `account`.
	///
	/// Deploying twice returns the existing delegate unchanged.
	pub fn deploy(&mut self, account: &Address) -> Deployment {
		if let Some(record) = self.delegates.get(account) {
			return Deployment {
				delegate: record.address,
				created: false,
			};
		}

		let delegate = self.predict(account);
		self.delegates.insert(
			*account,
			DelegateRecord {
				address: delegate,
				owner: *account,
			},
		);
		tracing::debug!(%account, %delegate, "Deployed delegate");
		Deployment {
			delegate,
			created: true,
		}
	}

	/// Forgets the delegate of `account` again, for deployments made by an
	/// invocation that is being rolled back.
	pub fn undeploy(&mut self, account: &Address) -> bool {
		self.delegates.remove(account).is_some()
	}

	/// Moves funds out of the delegate of `account`.
	///
	/// `caller` must be the delegate owner or on `whitelist`. Items are applied
	/// in order; if any fails none take effect.
	pub fn withdraw(
		&self,
		ledger: &mut Ledger,
		caller: &Address,
		account: &Address,
		items: &[WithdrawItem],
		whitelist: &dyn AccountWhitelist,
	) -> Result<(), DelegateError> {
		let record = self
			.delegates
			.get(account)
			.ok_or(DelegateError::NotDeployed(*account))?;

		if *caller != record.owner && !whitelist.contains(caller) {
			return Err(DelegateError::Unauthorized {
				caller: *caller,
				account: *account,
			});
		}

		let checkpoint = ledger.checkpoint();
		for item in items {
			if let Err(e) = ledger.transfer(item.token, record.address, item.to, item.amount) {
				ledger.revert_to(checkpoint);
				return Err(e.into());
			}
		}

		tracing::debug!(%account, %caller, items = items.len(), "Withdrew from delegate");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use xswap_types::EmptyWhitelist;

	struct Listed(Address);

	impl AccountWhitelist for Listed {
		fn contains(&self, account: &Address) -> bool {
			*account == self.0
		}
	}

	fn addr(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	fn registry() -> DelegateRegistry {
		DelegateRegistry::new(addr(0xde), addr(0x7e))
	}

	#[test]
	fn test_proxy_init_code_layout() {
		let code = proxy_init_code(&addr(0x7e));
		assert_eq!(code.len(), 55);
		assert_eq!(&code[20..40], addr(0x7e).as_slice());
	}

	#[test]
	fn test_predict_is_stable_and_account_specific() {
		let mut registry = registry();
		let account = addr(1);
		let predicted = registry.predict(&account);

		assert_eq!(predicted, registry.predict(&account));
		assert_ne!(predicted, registry.predict(&addr(2)));
		assert_ne!(
			predicted,
			DelegateRegistry::new(addr(0xdf), addr(0x7e)).predict(&account)
		);

		registry.deploy(&account);
		assert_eq!(predicted, registry.predict(&account));
	}

	#[test]
	fn test_funding_does_not_deploy() {
		let mut registry = registry();
		let mut ledger = Ledger::new();
		let account = addr(1);
		ledger
			.mint(addr(9), registry.predict(&account), U256::from(5))
			.unwrap();

		assert!(!registry.is_deployed(&account));
		let deployment = registry.deploy(&account);
		assert!(deployment.created);
		assert!(registry.is_deployed(&account));
	}

	#[test]
	fn test_deploy_is_idempotent() {
		let mut registry = registry();
		let first = registry.deploy(&addr(1));
		let second = registry.deploy(&addr(1));

		assert_eq!(first.delegate, second.delegate);
		assert!(!second.created);
		assert_eq!(registry.record(&addr(1)).unwrap().owner, addr(1));
	}

	#[test]
	fn test_undeploy_restores_address() {
		let mut registry = registry();
		let first = registry.deploy(&addr(1));

		assert!(registry.undeploy(&addr(1)));
		assert!(!registry.is_deployed(&addr(1)));
		assert!(!registry.undeploy(&addr(1)));

		let again = registry.deploy(&addr(1));
		assert!(again.created);
		assert_eq!(again.delegate, first.delegate);
	}

	#[test]
	fn test_withdraw_authorization() {
		let mut registry = registry();
		let mut ledger = Ledger::new();
		let account = addr(1);
		let delegate = registry.deploy(&account).delegate;
		ledger.mint(addr(9), delegate, U256::from(100)).unwrap();
		let items = [WithdrawItem {
			token: addr(9),
			amount: U256::from(10),
			to: addr(5),
		}];

		let result = registry.withdraw(&mut ledger, &addr(3), &account, &items, &EmptyWhitelist);
		assert!(matches!(result, Err(DelegateError::Unauthorized { .. })));

		registry
			.withdraw(&mut ledger, &account, &account, &items, &EmptyWhitelist)
			.unwrap();
		registry
			.withdraw(&mut ledger, &addr(3), &account, &items, &Listed(addr(3)))
			.unwrap();

		assert_eq!(ledger.balance_of(addr(9), addr(5)), U256::from(20));
		assert_eq!(ledger.balance_of(addr(9), delegate), U256::from(80));
	}

	#[test]
	fn test_failed_withdraw_leaves_no_partial_effect() {
		let mut registry = registry();
		let mut ledger = Ledger::new();
		let account = addr(1);
		let delegate = registry.deploy(&account).delegate;
		ledger.mint(addr(9), delegate, U256::from(10)).unwrap();
		let items = [
			WithdrawItem {
				token: addr(9),
				amount: U256::from(6),
				to: addr(5),
			},
			WithdrawItem {
				token: addr(9),
				amount: U256::from(6),
				to: addr(5),
			},
		];

		let result = registry.withdraw(&mut ledger, &account, &account, &items, &EmptyWhitelist);
		assert!(matches!(result, Err(DelegateError::Ledger(_))));
		assert_eq!(ledger.balance_of(addr(9), delegate), U256::from(10));
	}

	#[test]
	fn test_withdraw_requires_deployment() {
		let registry = registry();
		let mut ledger = Ledger::new();
		let result = registry.withdraw(&mut ledger, &addr(1), &addr(1), &[], &EmptyWhitelist);
		assert!(matches!(result, Err(DelegateError::NotDeployed(_))));
	}
}
