//! Generic call execution for the xSwap engine.
//!
//! The executor runs an ordered list of [`CallLeg`]s. Each leg hands its
//! input to an opaque [`CallTarget`], measures how much of the output token
//! the holder gained, and distributes that delta across output indices.
//! Fixed amounts are assigned in order; an [`UNBOUNDED`] entry absorbs
//! whatever the fixed amounts of the same leg leave over. Delta claimed by
//! no entry stays with the holder.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use xswap_types::{is_native, CallLeg, Ledger, LedgerError, ReentrancyLock, UNBOUNDED};

/// Errors that can occur during call execution.
#[derive(Debug, Error)]
pub enum CallError {
	/// The external call reverted, is unknown, or lost output tokens.
	#[error("Call of leg {leg} failed: {reason}")]
	CallFailed { leg: usize, reason: String },
	/// A fixed distribution amount exceeded the leg's remaining delta.
	#[error("Insufficient call output in leg {leg}: {requested} requested, {remaining} remaining")]
	InsufficientCallOutput {
		leg: usize,
		requested: U256,
		remaining: U256,
	},
	/// The executor is already running.
	#[error("Call executor re-entered")]
	Reentrancy,
	/// Input could not be made available to the target.
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
}

/// Reason an external call reverted.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct Revert(pub String);

/// Environment handed to a target for the duration of one call.
pub struct CallContext<'a> {
	pub ledger: &'a mut Ledger,
	/// Account invoking the target and receiving its output.
	pub caller: Address,
	/// Address of the target itself.
	pub target: Address,
}

/// Opaque external call target.
///
/// A target pulls approved input from `caller` and pays output back to it.
#[async_trait]
pub trait CallTarget: Send + Sync {
	async fn call(&self, ctx: CallContext<'_>, data: &Bytes) -> Result<(), Revert>;
}

/// Executes call legs against registered targets.
#[derive(Default)]
pub struct CallExecutor {
	targets: HashMap<Address, Arc<dyn CallTarget>>,
	lock: ReentrancyLock,
}

impl CallExecutor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes `target` callable at `address`.
	pub fn register_target(&mut self, address: Address, target: Arc<dyn CallTarget>) {
		self.targets.insert(address, target);
	}

	pub fn has_target(&self, address: &Address) -> bool {
		self.targets.contains_key(address)
	}

	/// Runs `legs` in order on behalf of `holder`.
	///
	/// Returns the amount assigned to each output index, sized to the highest
	/// referenced index. Effects are not reverted here on failure; callers
	/// own the ledger checkpoint.
	pub async fn execute(
		&self,
		ledger: &mut Ledger,
		holder: Address,
		legs: &[CallLeg],
	) -> Result<Vec<U256>, CallError> {
		let _guard = self.lock.enter().ok_or(CallError::Reentrancy)?;

		let size = legs
			.iter()
			.flat_map(|leg| leg.outs.iter())
			.map(|out| out.out_index + 1)
			.max()
			.unwrap_or(0);
		let mut amounts = vec![U256::ZERO; size];

		for (index, leg) in legs.iter().enumerate() {
			let delta = self.run_leg(ledger, holder, index, leg).await?;
			distribute(index, leg, delta, &mut amounts)?;
			tracing::debug!(
				leg = index,
				target = %leg.target,
				%delta,
				"Executed call leg"
			);
		}

		Ok(amounts)
	}

	async fn run_leg(
		&self,
		ledger: &mut Ledger,
		holder: Address,
		index: usize,
		leg: &CallLeg,
	) -> Result<U256, CallError> {
		if leg.target == Address::ZERO {
			let available = ledger.balance_of(leg.in_token, holder);
			if available < leg.in_amount {
				return Err(CallError::CallFailed {
					leg: index,
					reason: format!("pass-through needs {} but holder has {}", leg.in_amount, available),
				});
			}
			return Ok(if leg.out_token == leg.in_token {
				leg.in_amount
			} else {
				U256::ZERO
			});
		}

		let target = self
			.targets
			.get(&leg.target)
			.ok_or_else(|| CallError::CallFailed {
				leg: index,
				reason: format!("no code at {}", leg.target),
			})?;

		if is_native(&leg.in_token) {
			ledger.transfer(leg.in_token, holder, leg.target, leg.in_amount)?;
		} else {
			ledger.approve(leg.in_token, holder, leg.target, leg.in_amount);
		}

		let before = ledger.balance_of(leg.out_token, holder);
		let result = target
			.call(
				CallContext {
					ledger: &mut *ledger,
					caller: holder,
					target: leg.target,
				},
				&leg.data,
			)
			.await;

		if !is_native(&leg.in_token) {
			ledger.approve(leg.in_token, holder, leg.target, U256::ZERO);
		}

		result.map_err(|revert| CallError::CallFailed {
			leg: index,
			reason: revert.0,
		})?;

		let after = ledger.balance_of(leg.out_token, holder);
		after.checked_sub(before).ok_or_else(|| CallError::CallFailed {
			leg: index,
			reason: format!("output balance decreased from {} to {}", before, after),
		})
	}
}

/// Splits `delta` across the leg's outs into `amounts`.
fn distribute(
	index: usize,
	leg: &CallLeg,
	delta: U256,
	amounts: &mut [U256],
) -> Result<(), CallError> {
	let mut remaining = delta;
	let mut remainder_index = None;

	for out in &leg.outs {
		if out.amount == UNBOUNDED {
			remainder_index.get_or_insert(out.out_index);
			continue;
		}
		remaining = remaining
			.checked_sub(out.amount)
			.ok_or(CallError::InsufficientCallOutput {
				leg: index,
				requested: out.amount,
				remaining,
			})?;
		credit(index, amounts, out.out_index, out.amount)?;
	}

	if let Some(out_index) = remainder_index {
		credit(index, amounts, out_index, remaining)?;
	}
	Ok(())
}

fn credit(leg: usize, amounts: &mut [U256], out_index: usize, amount: U256) -> Result<(), CallError> {
	amounts[out_index] = amounts[out_index]
		.checked_add(amount)
		.ok_or_else(|| CallError::CallFailed {
			leg,
			reason: format!("output {} overflows", out_index),
		})?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use xswap_types::{CallOut, NATIVE_TOKEN};

	/// Pulls `take` of the input token and pays `give` of the output token.
	struct Dex {
		in_token: Address,
		take: U256,
		out_token: Address,
		give: U256,
	}

	#[async_trait]
	impl CallTarget for Dex {
		async fn call(&self, ctx: CallContext<'_>, _data: &Bytes) -> Result<(), Revert> {
			if !is_native(&self.in_token) {
				ctx.ledger
					.transfer_from(self.in_token, ctx.target, ctx.caller, ctx.target, self.take)
					.map_err(|e| Revert(e.to_string()))?;
			}
			ctx.ledger
				.transfer(self.out_token, ctx.target, ctx.caller, self.give)
				.map_err(|e| Revert(e.to_string()))
		}
	}

	struct Reverting;

	#[async_trait]
	impl CallTarget for Reverting {
		async fn call(&self, _ctx: CallContext<'_>, _data: &Bytes) -> Result<(), Revert> {
			Err(Revert("always".to_string()))
		}
	}

	fn addr(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	const HOLDER: Address = Address::new([0xee; 20]);

	fn leg(in_token: Address, in_amount: u64, out_token: Address, target: Address, outs: Vec<CallOut>) -> CallLeg {
		CallLeg {
			in_token,
			in_amount: U256::from(in_amount),
			out_token,
			outs,
			target,
			data: Bytes::new(),
		}
	}

	fn dex_executor(dex: Dex, ledger: &mut Ledger) -> (CallExecutor, Address) {
		let address = addr(0xd0);
		ledger.mint(dex.out_token, address, U256::from(10_000)).unwrap();
		let mut executor = CallExecutor::new();
		executor.register_target(address, Arc::new(dex));
		(executor, address)
	}

	#[tokio::test]
	async fn test_unbounded_takes_entire_delta() {
		let mut ledger = Ledger::new();
		ledger.mint(addr(0xa), HOLDER, U256::from(90)).unwrap();
		let (executor, dex) = dex_executor(
			Dex {
				in_token: addr(0xa),
				take: U256::from(90),
				out_token: addr(0xb),
				give: U256::from(270),
			},
			&mut ledger,
		);

		let amounts = executor
			.execute(
				&mut ledger,
				HOLDER,
				&[leg(addr(0xa), 90, addr(0xb), dex, vec![CallOut::remainder(0)])],
			)
			.await
			.unwrap();

		assert_eq!(amounts, vec![U256::from(270)]);
		assert_eq!(ledger.balance_of(addr(0xa), HOLDER), U256::ZERO);
		assert_eq!(ledger.allowance(addr(0xa), HOLDER, dex), U256::ZERO);
	}

	#[tokio::test]
	async fn test_remainder_absorbs_what_fixed_amounts_leave() {
		let mut ledger = Ledger::new();
		ledger.mint(NATIVE_TOKEN, HOLDER, U256::from(15)).unwrap();
		let executor = CallExecutor::new();

		let amounts = executor
			.execute(
				&mut ledger,
				HOLDER,
				&[leg(
					NATIVE_TOKEN,
					15,
					NATIVE_TOKEN,
					Address::ZERO,
					vec![
						CallOut::new(2, U256::from(9)),
						CallOut::remainder(0),
						CallOut::new(1, U256::from(1)),
						CallOut::new(1, U256::from(3)),
					],
				)],
			)
			.await
			.unwrap();

		assert_eq!(amounts, vec![U256::from(2), U256::from(4), U256::from(9)]);
		assert_eq!(ledger.balance_of(NATIVE_TOKEN, HOLDER), U256::from(15));
	}

	#[tokio::test]
	async fn test_indices_accumulate_across_legs() {
		let mut ledger = Ledger::new();
		ledger.mint(NATIVE_TOKEN, HOLDER, U256::from(10)).unwrap();
		let executor = CallExecutor::new();

		let legs = [
			leg(NATIVE_TOKEN, 4, NATIVE_TOKEN, Address::ZERO, vec![CallOut::remainder(0)]),
			leg(NATIVE_TOKEN, 6, NATIVE_TOKEN, Address::ZERO, vec![CallOut::new(0, U256::from(5))]),
		];
		let amounts = executor.execute(&mut ledger, HOLDER, &legs).await.unwrap();

		assert_eq!(amounts, vec![U256::from(9)]);
	}

	#[tokio::test]
	async fn test_fixed_amount_above_delta_fails() {
		let mut ledger = Ledger::new();
		ledger.mint(NATIVE_TOKEN, HOLDER, U256::from(5)).unwrap();
		let executor = CallExecutor::new();

		let result = executor
			.execute(
				&mut ledger,
				HOLDER,
				&[leg(
					NATIVE_TOKEN,
					5,
					NATIVE_TOKEN,
					Address::ZERO,
					vec![CallOut::new(0, U256::from(3)), CallOut::new(1, U256::from(3))],
				)],
			)
			.await;

		assert!(matches!(
			result,
			Err(CallError::InsufficientCallOutput { leg: 0, .. })
		));
	}

	#[tokio::test]
	async fn test_native_input_is_sent_to_target() {
		let mut ledger = Ledger::new();
		ledger.mint(NATIVE_TOKEN, HOLDER, U256::from(9)).unwrap();
		let (executor, dex) = dex_executor(
			Dex {
				in_token: NATIVE_TOKEN,
				take: U256::from(9),
				out_token: addr(0xb),
				give: U256::from(270),
			},
			&mut ledger,
		);

		let amounts = executor
			.execute(
				&mut ledger,
				HOLDER,
				&[leg(NATIVE_TOKEN, 9, addr(0xb), dex, vec![CallOut::remainder(0)])],
			)
			.await
			.unwrap();

		assert_eq!(amounts[0], U256::from(270));
		assert_eq!(ledger.balance_of(NATIVE_TOKEN, dex), U256::from(9));
	}

	#[tokio::test]
	async fn test_unclaimed_delta_stays_with_holder() {
		let mut ledger = Ledger::new();
		ledger.mint(addr(0xa), HOLDER, U256::from(1)).unwrap();
		let (executor, dex) = dex_executor(
			Dex {
				in_token: addr(0xa),
				take: U256::from(1),
				out_token: addr(0xb),
				give: U256::from(50),
			},
			&mut ledger,
		);

		let amounts = executor
			.execute(
				&mut ledger,
				HOLDER,
				&[leg(addr(0xa), 1, addr(0xb), dex, vec![CallOut::new(0, U256::from(20))])],
			)
			.await
			.unwrap();

		assert_eq!(amounts, vec![U256::from(20)]);
		assert_eq!(ledger.balance_of(addr(0xb), HOLDER), U256::from(50));
	}

	#[tokio::test]
	async fn test_revert_and_unknown_target_fail() {
		let mut ledger = Ledger::new();
		ledger.mint(addr(0xa), HOLDER, U256::from(1)).unwrap();
		let mut executor = CallExecutor::new();
		executor.register_target(addr(0xd1), Arc::new(Reverting));

		let reverted = executor
			.execute(
				&mut ledger,
				HOLDER,
				&[leg(addr(0xa), 1, addr(0xb), addr(0xd1), vec![])],
			)
			.await;
		assert!(matches!(reverted, Err(CallError::CallFailed { leg: 0, .. })));
		assert_eq!(ledger.allowance(addr(0xa), HOLDER, addr(0xd1)), U256::ZERO);

		let unknown = executor
			.execute(
				&mut ledger,
				HOLDER,
				&[leg(addr(0xa), 1, addr(0xb), addr(0xd2), vec![])],
			)
			.await;
		assert!(matches!(unknown, Err(CallError::CallFailed { .. })));
	}
}
