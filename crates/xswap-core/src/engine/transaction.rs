//! Journaled scope of one step.

use super::write;
use alloy_primitives::Address;
use std::sync::RwLock;
use tokio::sync::MutexGuard;
use xswap_delegate::DelegateRegistry;
use xswap_types::{Checkpoint, Ledger};

/// Exclusive ledger access for one step, rolled back unless committed.
///
/// Dropping an uncommitted transaction reverts every ledger write made since
/// [`StepTransaction::begin`] and forgets a delegate deployed on the way. An
/// error return and a step future dropped at an await point (timeout, client
/// disconnect) unwind the same way.
pub(super) struct StepTransaction<'a> {
	ledger: MutexGuard<'a, Ledger>,
	checkpoint: Checkpoint,
	delegates: &'a RwLock<DelegateRegistry>,
	account: Address,
	deployed: Option<Address>,
	committed: bool,
}

impl<'a> StepTransaction<'a> {
	pub(super) fn begin(
		ledger: MutexGuard<'a, Ledger>,
		delegates: &'a RwLock<DelegateRegistry>,
		account: Address,
	) -> Self {
		let checkpoint = ledger.checkpoint();
		Self {
			ledger,
			checkpoint,
			delegates,
			account,
			deployed: None,
			committed: false,
		}
	}

	pub(super) fn ledger(&mut self) -> &mut Ledger {
		&mut self.ledger
	}

	/// Deploys the delegate of the step account, remembering a fresh deployment.
	pub(super) fn deploy_delegate(&mut self) -> Address {
		let deployment = write(self.delegates).deploy(&self.account);
		if deployment.created {
			self.deployed = Some(deployment.delegate);
		}
		deployment.delegate
	}

	/// Makes the step's writes final. Returns the delegate the step deployed, if any.
	pub(super) fn commit(mut self) -> Option<Address> {
		self.ledger.commit();
		self.committed = true;
		self.deployed
	}
}

impl Drop for StepTransaction<'_> {
	fn drop(&mut self) {
		if self.committed {
			return;
		}
		self.ledger.revert_to(self.checkpoint);
		if self.deployed.is_some() {
			write(self.delegates).undeploy(&self.account);
		}
		tracing::debug!(account = %self.account, "Rolled back step");
	}
}
