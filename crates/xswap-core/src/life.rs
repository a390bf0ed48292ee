//! Pause and terminate gate for engine operations.

use crate::access::AccessError;
use alloy_primitives::Address;
use serde::Serialize;
use std::sync::RwLock;

/// Gate deciding whether swaps may run.
pub trait LifeControl: Send + Sync {
	fn paused(&self) -> bool;

	fn terminated(&self) -> bool;

	fn operations_allowed(&self) -> bool {
		!self.paused() && !self.terminated()
	}
}

/// Snapshot of the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifeState {
	pub paused: bool,
	pub terminated: bool,
}

/// Owner-controlled gate. Termination is permanent.
#[derive(Debug)]
pub struct SimpleLifeControl {
	owner: Address,
	state: RwLock<LifeState>,
}

impl SimpleLifeControl {
	pub fn new(owner: Address) -> Self {
		Self {
			owner,
			state: RwLock::new(LifeState::default()),
		}
	}

	pub fn state(&self) -> LifeState {
		*self.state.read().unwrap_or_else(|e| e.into_inner())
	}

	pub fn pause(&self, caller: &Address) -> Result<(), AccessError> {
		self.update(caller, |state| state.paused = true)?;
		tracing::warn!(%caller, "Operations paused");
		Ok(())
	}

	pub fn unpause(&self, caller: &Address) -> Result<(), AccessError> {
		self.update(caller, |state| state.paused = false)?;
		tracing::info!(%caller, "Operations unpaused");
		Ok(())
	}

	pub fn terminate(&self, caller: &Address) -> Result<(), AccessError> {
		self.update(caller, |state| state.terminated = true)?;
		tracing::warn!(%caller, "Operations terminated");
		Ok(())
	}

	fn update(&self, caller: &Address, apply: impl FnOnce(&mut LifeState)) -> Result<(), AccessError> {
		if *caller != self.owner {
			return Err(AccessError::Unauthorized(*caller));
		}
		let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
		if state.terminated {
			return Err(AccessError::Terminated);
		}
		apply(&mut state);
		Ok(())
	}
}

impl LifeControl for SimpleLifeControl {
	fn paused(&self) -> bool {
		self.state().paused
	}

	fn terminated(&self) -> bool {
		self.state().terminated
	}
}
