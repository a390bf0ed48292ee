//! Capability checks consumed by engine components.

use alloy_primitives::Address;

/// Membership query over a set of accounts.
pub trait AccountWhitelist: Send + Sync {
	fn contains(&self, account: &Address) -> bool;
}

/// Whitelist that contains nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyWhitelist;

impl AccountWhitelist for EmptyWhitelist {
	fn contains(&self, _account: &Address) -> bool {
		false
	}
}
