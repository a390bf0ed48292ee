//! Non-reentrant invocation flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// Flag rejecting nested or concurrent entry.
#[derive(Debug, Default)]
pub struct ReentrancyLock {
	entered: AtomicBool,
}

impl ReentrancyLock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Enters the lock, or returns `None` when it is already held.
	///
	/// The lock is released when the returned guard is dropped, including on
	/// early return and unwinding.
	pub fn enter(&self) -> Option<ReentrancyGuard<'_>> {
		self.entered
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| ReentrancyGuard { lock: self })
	}

	pub fn is_entered(&self) -> bool {
		self.entered.load(Ordering::Acquire)
	}
}

/// Held while an invocation is in progress.
#[derive(Debug)]
pub struct ReentrancyGuard<'a> {
	lock: &'a ReentrancyLock,
}

impl Drop for ReentrancyGuard<'_> {
	fn drop(&mut self) {
		self.lock.entered.store(false, Ordering::Release);
	}
}
