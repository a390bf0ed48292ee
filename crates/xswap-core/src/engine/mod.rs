//! Swap engine orchestrating one authorized step end to end.
//!
//! A step moves through `Validated -> Funded -> Converted -> Distributed ->
//! Settled`. Every ledger write made after validation is journaled; any
//! failure reverts the journal, forgets a delegate deployed on the way and
//! leaves the nonce unconsumed, so a failed invocation has no observable
//! effect.
//!
//! Independent invocations are serialized on the ledger lock. Only entry
//! from inside a running invocation, such as a call target calling back into
//! the engine, is refused with [`SwapError::Reentrancy`].

pub mod event_bus;
pub mod params;
mod transaction;

use crate::clock::Clock;
use crate::error::SwapError;
use crate::life::{LifeControl, LifeState};
use crate::permit::{PermitContext, PermitRequest, PermitResolver};
use crate::protocols::{UseContext, UseProtocol};
use alloy_primitives::{Address, Bytes, B256, U256};
use event_bus::EventBus;
use params::StepInput;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use transaction::StepTransaction;
use xswap_call::CallExecutor;
use xswap_delegate::DelegateRegistry;
use xswap_nonce::NonceService;
use xswap_signature::{hash_swap_step, SignatureValidator};
use xswap_types::{
	truncate_id, AccountWhitelist, CallLeg, DelegateEvent, EngineEvent, Ledger, StepEvent,
	SwapEvent, SwapStep, TokenAmount, WithdrawItem, Withdrawal,
};

pub use params::{StealthSwapParams, StepOutcome, SwapParams};

tokio::task_local! {
	static ENGINE_ENTERED: ();
}

/// Runs `operation` as an engine entry point, refusing entry from within one.
async fn non_reentrant<T>(
	operation: impl Future<Output = Result<T, SwapError>>,
) -> Result<T, SwapError> {
	if ENGINE_ENTERED.try_with(|_| ()).is_ok() {
		return Err(SwapError::Reentrancy);
	}
	ENGINE_ENTERED.scope((), operation).await
}

/// Everything an engine is assembled from.
pub struct EngineParts {
	pub chain_id: u64,
	/// Engine address: verifying contract of signatures and holder of funds in flight.
	pub address: Address,
	pub ledger: Ledger,
	pub nonces: NonceService,
	pub delegates: DelegateRegistry,
	pub executor: CallExecutor,
	pub life: Arc<dyn LifeControl>,
	/// Callers allowed to withdraw engine holdings and from any delegate. Must contain the engine.
	pub withdraw_whitelist: Arc<dyn AccountWhitelist>,
	pub permit_resolver_whitelist: Arc<dyn AccountWhitelist>,
	pub use_protocol_whitelist: Arc<dyn AccountWhitelist>,
	pub permit_resolvers: HashMap<Address, Arc<dyn PermitResolver>>,
	pub protocols: HashMap<Address, Arc<dyn UseProtocol>>,
	pub clock: Arc<dyn Clock>,
	pub event_bus: EventBus,
}

/// Executes signed swap steps against the ledger.
pub struct SwapEngine {
	chain_id: u64,
	address: Address,
	validator: SignatureValidator,
	executor: CallExecutor,
	ledger: Mutex<Ledger>,
	nonces: RwLock<NonceService>,
	delegates: RwLock<DelegateRegistry>,
	life: Arc<dyn LifeControl>,
	withdraw_whitelist: Arc<dyn AccountWhitelist>,
	permit_resolver_whitelist: Arc<dyn AccountWhitelist>,
	use_protocol_whitelist: Arc<dyn AccountWhitelist>,
	permit_resolvers: HashMap<Address, Arc<dyn PermitResolver>>,
	protocols: HashMap<Address, Arc<dyn UseProtocol>>,
	clock: Arc<dyn Clock>,
	event_bus: EventBus,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
	lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
	lock.write().unwrap_or_else(|e| e.into_inner())
}

impl SwapEngine {
	pub fn new(parts: EngineParts) -> Self {
		Self {
			chain_id: parts.chain_id,
			address: parts.address,
			validator: SignatureValidator::new(),
			executor: parts.executor,
			ledger: Mutex::new(parts.ledger),
			nonces: RwLock::new(parts.nonces),
			delegates: RwLock::new(parts.delegates),
			life: parts.life,
			withdraw_whitelist: parts.withdraw_whitelist,
			permit_resolver_whitelist: parts.permit_resolver_whitelist,
			use_protocol_whitelist: parts.use_protocol_whitelist,
			permit_resolvers: parts.permit_resolvers,
			protocols: parts.protocols,
			clock: parts.clock,
			event_bus: parts.event_bus,
		}
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn life_state(&self) -> LifeState {
		LifeState {
			paused: self.life.paused(),
			terminated: self.life.terminated(),
		}
	}

	/// Executes `params.swap.steps[params.step_index]`.
	pub async fn swap(&self, params: &SwapParams) -> Result<StepOutcome, SwapError> {
		non_reentrant(self.run_swap(params)).await
	}

	/// Executes a step revealed against a signed stealth commitment.
	pub async fn swap_stealth(&self, params: &StealthSwapParams) -> Result<StepOutcome, SwapError> {
		non_reentrant(self.run_stealth_swap(params)).await
	}

	pub fn is_delegate_deployed(&self, account: &Address) -> bool {
		read(&self.delegates).is_deployed(account)
	}

	pub fn predict_delegate_deploy(&self, account: &Address) -> Address {
		read(&self.delegates).predict(account)
	}

	/// Deploys the delegate of `account`, returning its address.
	pub async fn deploy_delegate(&self, account: &Address) -> Result<Address, SwapError> {
		non_reentrant(async {
			let _ledger = self.ledger.lock().await;
			let deployment = write(&self.delegates).deploy(account);
			if deployment.created {
				self.publish_deployed(account, deployment.delegate);
			}
			Ok(deployment.delegate)
		})
		.await
	}

	/// Withdraws funds retained by the engine on behalf of a whitelisted `caller`.
	pub async fn withdraw(&self, caller: &Address, items: &[WithdrawItem]) -> Result<(), SwapError> {
		non_reentrant(self.settle_withdrawal(caller, &Address::ZERO, items, None)).await
	}

	/// Withdraws from the delegate of `account` on behalf of `caller`.
	pub async fn withdraw_delegate(
		&self,
		caller: &Address,
		account: &Address,
		items: &[WithdrawItem],
	) -> Result<(), SwapError> {
		non_reentrant(self.settle_withdrawal(caller, account, items, None)).await
	}

	/// Executes a withdrawal authorized by its signer, returning the signer.
	///
	/// The signer is the caller of [`SwapEngine::withdraw`] when
	/// `withdrawal.account` is zero and of [`SwapEngine::withdraw_delegate`]
	/// otherwise. Its nonce is consumed together with the transfers.
	pub async fn withdraw_signed(
		&self,
		withdrawal: &Withdrawal,
		signature: &[u8],
	) -> Result<Address, SwapError> {
		non_reentrant(async {
			if withdrawal.chain != self.chain_id || withdrawal.swapper != self.address {
				return Err(SwapError::InvalidSignature(format!(
					"withdrawal bound to chain {} swapper {}",
					withdrawal.chain, withdrawal.swapper
				)));
			}
			let now = self.clock.now();
			if now > withdrawal.deadline {
				return Err(SwapError::WithdrawalExpired {
					deadline: withdrawal.deadline,
					now,
				});
			}
			let caller = self
				.validator
				.recover_withdrawal_signer(withdrawal, signature)?;

			self.settle_withdrawal(
				&caller,
				&withdrawal.account,
				&withdrawal.items,
				Some(withdrawal.nonce),
			)
			.await?;
			Ok(caller)
		})
		.await
	}

	pub fn is_nonce_consumed(&self, account: &Address, nonce: &U256) -> bool {
		read(&self.nonces).is_consumed(account, nonce)
	}

	pub async fn balance_of(&self, token: Address, holder: Address) -> U256 {
		self.ledger.lock().await.balance_of(token, holder)
	}

	/// Applies `f` to the ledger outside of any step and commits its writes.
	pub async fn with_ledger<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
		let mut ledger = self.ledger.lock().await;
		let result = f(&mut ledger);
		ledger.commit();
		result
	}

	async fn run_swap(&self, params: &SwapParams) -> Result<StepOutcome, SwapError> {
		let step = params.swap.steps.get(params.step_index).ok_or_else(|| {
			SwapError::InvalidParams(format!(
				"step index {} out of {} steps",
				params.step_index,
				params.swap.steps.len()
			))
		})?;

		self.check_deadline(step)?;
		self.check_operations()?;
		self.check_step_target(step)?;
		self.validator
			.validate_swap_signature(&params.swap, &params.swap_signature)?;
		if step.account != params.swap.steps[0].account {
			return Err(SwapError::InvalidSignature(format!(
				"step account {} is not the signer {}",
				step.account, params.swap.steps[0].account
			)));
		}

		self.execute_step(
			step,
			StepInput {
				permits: &params.permits,
				in_amounts: &params.in_amounts,
				call: &params.call,
				use_args: &params.use_args,
			},
		)
		.await
	}

	async fn run_stealth_swap(&self, params: &StealthSwapParams) -> Result<StepOutcome, SwapError> {
		let step = &params.step;
		let stealth = &params.stealth_swap;

		self.check_deadline(step)?;
		self.check_operations()?;
		if stealth.chain != self.chain_id || stealth.swapper != self.address {
			return Err(SwapError::InvalidSignature(format!(
				"commitment bound to chain {} swapper {}",
				stealth.chain, stealth.swapper
			)));
		}
		self.check_step_target(step)?;
		self.validator.validate_stealth_swap_step_signature(
			step,
			stealth,
			&params.swap_signature,
		)?;
		if step.account != stealth.account {
			return Err(SwapError::InvalidSignature(format!(
				"step account {} is not the signer {}",
				step.account, stealth.account
			)));
		}

		self.execute_step(
			step,
			StepInput {
				permits: &params.permits,
				in_amounts: &params.in_amounts,
				call: &params.call,
				use_args: &params.use_args,
			},
		)
		.await
	}

	/// Moves withdrawn items out of the engine (zero `account`) or out of the
	/// delegate of `account`, consuming `nonce` of `caller` when given.
	async fn settle_withdrawal(
		&self,
		caller: &Address,
		account: &Address,
		items: &[WithdrawItem],
		nonce: Option<U256>,
	) -> Result<(), SwapError> {
		let mut ledger = self.ledger.lock().await;
		if let Some(nonce) = nonce {
			if self.is_nonce_consumed(caller, &nonce) {
				return Err(SwapError::InvalidNonce {
					account: *caller,
					nonce,
				});
			}
		}

		let checkpoint = ledger.checkpoint();
		let moved = if account.is_zero() {
			self.withdraw_retained(&mut ledger, caller, items)
		} else {
			read(&self.delegates)
				.withdraw(
					&mut ledger,
					caller,
					account,
					items,
					self.withdraw_whitelist.as_ref(),
				)
				.map_err(SwapError::from)
		};
		let settled = moved.and_then(|()| match nonce {
			Some(nonce) => write(&self.nonces)
				.consume(caller, &nonce)
				.map_err(|_| SwapError::InvalidNonce {
					account: *caller,
					nonce,
				}),
			None => Ok(()),
		});
		if let Err(e) = settled {
			ledger.revert_to(checkpoint);
			tracing::warn!(%caller, %account, error = %e, "Withdrawal refused");
			return Err(e);
		}
		ledger.commit();
		drop(ledger);

		let event = if account.is_zero() {
			SwapEvent::Engine(EngineEvent::Withdrawn {
				caller: *caller,
				items: items.len(),
			})
		} else {
			SwapEvent::Delegate(DelegateEvent::Withdrawn {
				account: *account,
				caller: *caller,
				items: items.len(),
			})
		};
		self.event_bus.publish(event);
		Ok(())
	}

	fn withdraw_retained(
		&self,
		ledger: &mut Ledger,
		caller: &Address,
		items: &[WithdrawItem],
	) -> Result<(), SwapError> {
		if !self.withdraw_whitelist.contains(caller) {
			return Err(SwapError::Unauthorized(format!(
				"{} may not withdraw engine funds",
				caller
			)));
		}
		for item in items {
			ledger.transfer(item.token, self.address, item.to, item.amount)?;
		}
		tracing::info!(%caller, items = items.len(), "Withdrew engine funds");
		Ok(())
	}

	fn publish_deployed(&self, account: &Address, delegate: Address) {
		self.event_bus
			.publish(SwapEvent::Delegate(DelegateEvent::Deployed {
				account: *account,
				delegate,
			}));
	}

	fn check_deadline(&self, step: &SwapStep) -> Result<(), SwapError> {
		let now = self.clock.now();
		if now > step.deadline {
			return Err(SwapError::StepExpired {
				deadline: step.deadline,
				now,
			});
		}
		Ok(())
	}

	fn check_operations(&self) -> Result<(), SwapError> {
		if !self.life.operations_allowed() {
			return Err(SwapError::OperationsHalted);
		}
		Ok(())
	}

	fn check_step_target(&self, step: &SwapStep) -> Result<(), SwapError> {
		if step.chain != self.chain_id || step.swapper != self.address {
			return Err(SwapError::InvalidSignature(format!(
				"step bound to chain {} swapper {}",
				step.chain, step.swapper
			)));
		}
		Ok(())
	}

	async fn execute_step(
		&self,
		step: &SwapStep,
		input: StepInput<'_>,
	) -> Result<StepOutcome, SwapError> {
		step.validate_shape().map_err(SwapError::InvalidParams)?;
		if input.in_amounts.len() != step.ins.len() {
			return Err(SwapError::InvalidParams(format!(
				"{} input amounts for {} inputs",
				input.in_amounts.len(),
				step.ins.len()
			)));
		}

		let step_hash = hash_swap_step(step);
		let step_id = truncate_id(&step_hash.to_string());

		let mut tx = StepTransaction::begin(self.ledger.lock().await, &self.delegates, step.account);
		if self.is_nonce_consumed(&step.account, &step.nonce) {
			return Err(SwapError::InvalidNonce {
				account: step.account,
				nonce: step.nonce,
			});
		}
		tracing::info!(step = %step_id, account = %step.account, nonce = %step.nonce, "Validated step");

		let result = self
			.run_step(&mut tx, step, step_hash, &input)
			.await
			.and_then(|outcome| {
				write(&self.nonces)
					.consume(&step.account, &step.nonce)
					.map(|()| outcome)
					.map_err(|_| SwapError::InvalidNonce {
						account: step.account,
						nonce: step.nonce,
					})
			});
		let outcome = match result {
			Ok(outcome) => outcome,
			Err(e) => {
				tracing::warn!(step = %step_id, error = %e, "Step aborted");
				return Err(e);
			},
		};
		let deployed = tx.commit();

		if let Some(delegate) = deployed {
			self.publish_deployed(&step.account, delegate);
		}
		tracing::info!(step = %step_id, payer = %outcome.payer, "Settled step");
		self.event_bus
			.publish(SwapEvent::Step(StepEvent::Executed {
				step_hash,
				account: step.account,
				nonce: step.nonce,
				outputs: outcome.outputs.clone(),
				use_outputs: outcome.use_outputs.clone(),
			}));
		Ok(outcome)
	}

	async fn run_step(
		&self,
		tx: &mut StepTransaction<'_>,
		step: &SwapStep,
		step_hash: B256,
		input: &StepInput<'_>,
	) -> Result<StepOutcome, SwapError> {
		for (index, (check, amount)) in step.ins.iter().zip(input.in_amounts).enumerate() {
			check
				.check(*amount)
				.map_err(|source| SwapError::AmountOutOfBounds { index, source })?;
		}

		let payer = if step.use_delegate {
			tx.deploy_delegate()
		} else {
			step.account
		};

		self.resolve_permits(tx.ledger(), payer, input).await?;
		let pulled = self.pull_inputs(tx.ledger(), step, payer, input.in_amounts)?;
		tracing::debug!(%payer, tokens = pulled.len(), "Funded step");

		self.check_legs(step, input.call, &pulled)?;
		let mut outputs = self
			.executor
			.execute(tx.ledger(), self.address, input.call)
			.await?;
		outputs.resize(step.outs.len(), U256::ZERO);
		tracing::debug!(legs = input.call.len(), "Converted step inputs");

		let use_outputs = self
			.distribute(tx.ledger(), step, &outputs, input.use_args)
			.await?;

		Ok(StepOutcome {
			step_hash,
			payer,
			outputs,
			use_outputs,
		})
	}

	async fn resolve_permits(
		&self,
		ledger: &mut Ledger,
		owner: Address,
		input: &StepInput<'_>,
	) -> Result<(), SwapError> {
		for permit in input.permits {
			if !self.permit_resolver_whitelist.contains(&permit.resolver) {
				return Err(SwapError::UnknownPermitResolver(permit.resolver));
			}
			let resolver = self
				.permit_resolvers
				.get(&permit.resolver)
				.ok_or(SwapError::UnknownPermitResolver(permit.resolver))?;

			resolver
				.resolve_permit(
					PermitContext {
						ledger: &mut *ledger,
						chain_id: self.chain_id,
						now: self.clock.now(),
					},
					PermitRequest {
						token: permit.token,
						owner,
						spender: self.address,
						amount: permit.amount,
						deadline: permit.deadline,
						signature: &permit.signature,
					},
				)
				.await
				.map_err(|revert| {
					SwapError::AllowanceInsufficient(format!(
						"permit via {} failed: {}",
						permit.resolver, revert
					))
				})?;
		}
		Ok(())
	}

	/// Moves the declared input amounts from `payer` to the engine.
	fn pull_inputs(
		&self,
		ledger: &mut Ledger,
		step: &SwapStep,
		payer: Address,
		in_amounts: &[U256],
	) -> Result<HashMap<Address, U256>, SwapError> {
		let mut pulled: HashMap<Address, U256> = HashMap::new();
		for (check, amount) in step.ins.iter().zip(in_amounts) {
			let total = pulled.entry(check.token).or_insert(U256::ZERO);
			*total = total.saturating_add(*amount);
		}

		if step.use_delegate {
			let items: Vec<WithdrawItem> = step
				.ins
				.iter()
				.zip(in_amounts)
				.filter(|(_, amount)| !amount.is_zero())
				.map(|(check, amount)| WithdrawItem {
					token: check.token,
					amount: *amount,
					to: self.address,
				})
				.collect();
			read(&self.delegates).withdraw(
				ledger,
				&self.address,
				&step.account,
				&items,
				self.withdraw_whitelist.as_ref(),
			)?;
		} else {
			for (check, amount) in step.ins.iter().zip(in_amounts) {
				ledger.transfer_from(check.token, self.address, payer, self.address, *amount)?;
			}
		}

		Ok(pulled)
	}

	/// Requires every leg to call a registered target, to write only
	/// declared outputs of the matching token, and to spend no more of a
	/// token than the step pulled.
	fn check_legs(
		&self,
		step: &SwapStep,
		legs: &[CallLeg],
		pulled: &HashMap<Address, U256>,
	) -> Result<(), SwapError> {
		let mut used: HashMap<Address, U256> = HashMap::new();

		for (index, leg) in legs.iter().enumerate() {
			if leg.target != Address::ZERO && !self.executor.has_target(&leg.target) {
				return Err(SwapError::CallFailed(format!(
					"leg {} calls unknown target {}",
					index, leg.target
				)));
			}
			for out in &leg.outs {
				let declared = step.outs.get(out.out_index).ok_or_else(|| {
					SwapError::CallFailed(format!(
						"leg {} writes undeclared output {}",
						index, out.out_index
					))
				})?;
				if declared.token != leg.out_token {
					return Err(SwapError::CallFailed(format!(
						"leg {} produces {} but output {} is {}",
						index, leg.out_token, out.out_index, declared.token
					)));
				}
			}

			let total = used.entry(leg.in_token).or_insert(U256::ZERO);
			*total = total.saturating_add(leg.in_amount);
		}

		for (token, used) in used {
			let available = pulled.get(&token).copied().unwrap_or(U256::ZERO);
			if used > available {
				return Err(SwapError::CallInputExceedsPulled {
					token,
					used,
					pulled: available,
				});
			}
		}
		Ok(())
	}

	/// Pays realized outputs to each use in order.
	///
	/// An output below its minimum fails the step; above its maximum it is
	/// capped and the excess stays with the engine. The first use that
	/// references an output receives all of it. Outputs referenced by no use
	/// stay with the engine.
	async fn distribute(
		&self,
		ledger: &mut Ledger,
		step: &SwapStep,
		outputs: &[U256],
		use_args: &[Bytes],
	) -> Result<Vec<Vec<TokenAmount>>, SwapError> {
		let mut claimed = vec![false; step.outs.len()];
		let mut use_outputs = Vec::with_capacity(step.uses.len());

		for (use_index, token_use) in step.uses.iter().enumerate() {
			if !self.use_protocol_whitelist.contains(&token_use.protocol) {
				return Err(SwapError::UnknownProtocol(token_use.protocol));
			}
			let protocol = self
				.protocols
				.get(&token_use.protocol)
				.ok_or(SwapError::UnknownProtocol(token_use.protocol))?;

			let mut amounts = Vec::with_capacity(token_use.in_indices.len());
			for &index in &token_use.in_indices {
				let check = &step.outs[index];
				let realized = check.cap(outputs[index]).map_err(|_| {
					SwapError::InsufficientOutAmount {
						index,
						amount: outputs[index],
						min: check.min_amount,
					}
				})?;
				let amount = if claimed[index] { U256::ZERO } else { realized };
				claimed[index] = true;
				amounts.push(TokenAmount::new(check.token, amount));
			}

			for amount in amounts.iter().filter(|a| !a.amount.is_zero()) {
				ledger.transfer(amount.token, self.address, token_use.protocol, amount.amount)?;
			}

			let args = use_args.get(use_index).cloned().unwrap_or_default();
			let produced = protocol
				.use_protocol(
					UseContext {
						ledger: &mut *ledger,
						caller: self.address,
						protocol: token_use.protocol,
					},
					token_use,
					&amounts,
					&args,
				)
				.await
				.map_err(|revert| SwapError::UseFailed {
					index: use_index,
					reason: revert.0,
				})?;

			tracing::debug!(
				use_index,
				protocol = %token_use.protocol,
				receiver = %token_use.account,
				"Distributed outputs to use"
			);
			use_outputs.push(produced);
		}

		Ok(use_outputs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::access::OwnableAccountWhitelist;
	use crate::clock::ManualClock;
	use crate::life::SimpleLifeControl;
	use crate::permit::{permit_digest, SignaturePermitResolver};
	use crate::protocols::{BridgeProtocol, GasFee, GasVendorProtocol, TransferProtocol};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use async_trait::async_trait;
	use std::sync::{OnceLock, Weak};
	use std::time::Duration;
	use xswap_call::{CallContext, CallTarget, Revert};
	use xswap_nonce::create_nonce_backend;
	use xswap_signature::{stealth_swap_digest, swap_digest, withdrawal_digest};
	use xswap_types::{CallOut, Permit, StealthSwap, Swap, TokenCheck, TokenUse, NATIVE_TOKEN};

	const USER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const OTHER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

	const CHAIN: u64 = 31337;
	const NOW: u64 = 1_700_000_000;
	const ENGINE: Address = Address::new([0x51; 20]);
	const OWNER: Address = Address::new([0x0f; 20]);
	const REGISTRY: Address = Address::new([0xe7; 20]);
	const TEMPLATE: Address = Address::new([0x9f; 20]);
	const TOKEN_A: Address = Address::new([0x0a; 20]);
	const TOKEN_B: Address = Address::new([0x0b; 20]);
	const TOKEN_C: Address = Address::new([0x0c; 20]);
	const TOKEN_D: Address = Address::new([0x0d; 20]);
	const DEX_B: Address = Address::new([0xd0; 20]);
	const DEX_C: Address = Address::new([0xd1; 20]);
	const SLOW_DEX: Address = Address::new([0xd2; 20]);
	const REENTRANT: Address = Address::new([0xd3; 20]);
	const DEX_BA: Address = Address::new([0xd4; 20]);
	const DEX_NATIVE: Address = Address::new([0xd5; 20]);
	const TRANSFER: Address = Address::new([0x70; 20]);
	const GAS_VENDOR: Address = Address::new([0x71; 20]);
	const RESOLVER: Address = Address::new([0x72; 20]);
	const BRIDGE: Address = Address::new([0x73; 20]);
	const VAULT: Address = Address::new([0xb7; 20]);
	const COLLECTOR: Address = Address::new([0xde; 20]);

	/// Pulls its approved input and pays a fixed amount of output.
	struct Dex {
		in_token: Address,
		out_token: Address,
		give: U256,
	}

	#[async_trait]
	impl CallTarget for Dex {
		async fn call(&self, ctx: CallContext<'_>, _data: &Bytes) -> Result<(), Revert> {
			let approved = ctx.ledger.allowance(self.in_token, ctx.caller, ctx.target);
			ctx.ledger
				.transfer_from(self.in_token, ctx.target, ctx.caller, ctx.target, approved)
				.map_err(|e| Revert(e.to_string()))?;
			ctx.ledger
				.transfer(self.out_token, ctx.target, ctx.caller, self.give)
				.map_err(|e| Revert(e.to_string()))
		}
	}

	/// Takes its input, then pays 470 TOKEN_B only after `delay`.
	struct SlowDex {
		delay: Duration,
	}

	#[async_trait]
	impl CallTarget for SlowDex {
		async fn call(&self, ctx: CallContext<'_>, _data: &Bytes) -> Result<(), Revert> {
			let approved = ctx.ledger.allowance(TOKEN_A, ctx.caller, ctx.target);
			ctx.ledger
				.transfer_from(TOKEN_A, ctx.target, ctx.caller, ctx.target, approved)
				.map_err(|e| Revert(e.to_string()))?;
			tokio::time::sleep(self.delay).await;
			ctx.ledger
				.transfer(TOKEN_B, ctx.target, ctx.caller, U256::from(470))
				.map_err(|e| Revert(e.to_string()))
		}
	}

	/// Submits another step to the engine it is registered with.
	struct Reentrant {
		engine: Arc<OnceLock<Weak<SwapEngine>>>,
	}

	#[async_trait]
	impl CallTarget for Reentrant {
		async fn call(&self, _ctx: CallContext<'_>, _data: &Bytes) -> Result<(), Revert> {
			let engine = self
				.engine
				.get()
				.and_then(Weak::upgrade)
				.ok_or_else(|| Revert("engine dropped".into()))?;
			engine
				.swap(&params(step(2)))
				.await
				.map(|_| ())
				.map_err(|e| Revert(e.kind().to_string()))
		}
	}

	fn signer(key: &str) -> PrivateKeySigner {
		key.parse().unwrap()
	}

	fn sign(key: &str, digest: &B256) -> Bytes {
		Bytes::from(signer(key).sign_hash_sync(digest).unwrap().as_bytes().to_vec())
	}

	fn user() -> Address {
		signer(USER_KEY).address()
	}

	/// Whitelisted withdrawer.
	fn admin() -> Address {
		signer(OTHER_KEY).address()
	}

	struct Env {
		engine: Arc<SwapEngine>,
		clock: Arc<ManualClock>,
		life: Arc<SimpleLifeControl>,
		gas_vendor: Arc<GasVendorProtocol>,
	}

	async fn env(give_b: u64, give_c: u64) -> Env {
		let clock = Arc::new(ManualClock::new(NOW));
		let life = Arc::new(SimpleLifeControl::new(OWNER));

		let mut executor = CallExecutor::new();
		executor.register_target(
			DEX_B,
			Arc::new(Dex {
				in_token: TOKEN_A,
				out_token: TOKEN_B,
				give: U256::from(give_b),
			}),
		);
		executor.register_target(
			DEX_C,
			Arc::new(Dex {
				in_token: TOKEN_A,
				out_token: TOKEN_C,
				give: U256::from(give_c),
			}),
		);
		executor.register_target(
			SLOW_DEX,
			Arc::new(SlowDex {
				delay: Duration::from_millis(200),
			}),
		);
		let slot = Arc::new(OnceLock::new());
		executor.register_target(
			REENTRANT,
			Arc::new(Reentrant {
				engine: slot.clone(),
			}),
		);
		executor.register_target(
			DEX_BA,
			Arc::new(Dex {
				in_token: TOKEN_B,
				out_token: TOKEN_A,
				give: U256::from(610),
			}),
		);
		executor.register_target(
			DEX_NATIVE,
			Arc::new(Dex {
				in_token: NATIVE_TOKEN,
				out_token: NATIVE_TOKEN,
				give: U256::from(142),
			}),
		);

		let mut permit_resolvers: HashMap<Address, Arc<dyn PermitResolver>> = HashMap::new();
		permit_resolvers.insert(RESOLVER, Arc::new(SignaturePermitResolver));

		let gas_vendor = Arc::new(GasVendorProtocol::new(
			OWNER,
			GasFee {
				token: TOKEN_C,
				amount: U256::from(77),
				collector: COLLECTOR,
			},
		));
		let mut protocols: HashMap<Address, Arc<dyn UseProtocol>> = HashMap::new();
		protocols.insert(TRANSFER, Arc::new(TransferProtocol));
		protocols.insert(GAS_VENDOR, gas_vendor.clone());
		protocols.insert(BRIDGE, Arc::new(BridgeProtocol::new(VAULT, CHAIN)));

		let empty = toml::Value::Table(toml::map::Map::new());
		let engine = Arc::new(SwapEngine::new(EngineParts {
			chain_id: CHAIN,
			address: ENGINE,
			ledger: Ledger::new(),
			nonces: NonceService::new(create_nonce_backend("slot_bitmap", &empty).unwrap()),
			delegates: DelegateRegistry::new(REGISTRY, TEMPLATE),
			executor,
			life: life.clone(),
			withdraw_whitelist: Arc::new(OwnableAccountWhitelist::with_accounts(
				OWNER,
				[ENGINE, admin()],
			)),
			permit_resolver_whitelist: Arc::new(OwnableAccountWhitelist::with_accounts(
				OWNER,
				[RESOLVER],
			)),
			use_protocol_whitelist: Arc::new(OwnableAccountWhitelist::with_accounts(
				OWNER,
				[TRANSFER, GAS_VENDOR, BRIDGE],
			)),
			permit_resolvers,
			protocols,
			clock: clock.clone(),
			event_bus: EventBus::new(16),
		}));
		let _ = slot.set(Arc::downgrade(&engine));

		let user = user();
		engine
			.with_ledger(|ledger| {
				ledger.mint(TOKEN_A, user, U256::from(1000)).unwrap();
				ledger.mint(TOKEN_B, DEX_B, U256::from(10_000)).unwrap();
				ledger.mint(TOKEN_C, DEX_C, U256::from(10_000)).unwrap();
				ledger.mint(TOKEN_B, SLOW_DEX, U256::from(10_000)).unwrap();
				ledger.mint(TOKEN_A, DEX_BA, U256::from(10_000)).unwrap();
				ledger.mint(NATIVE_TOKEN, DEX_NATIVE, U256::from(10_000)).unwrap();
			})
			.await;

		Env {
			engine,
			clock,
			life,
			gas_vendor,
		}
	}

	async fn approve_engine(engine: &SwapEngine) {
		let user = user();
		engine
			.with_ledger(|ledger| ledger.approve(TOKEN_A, user, ENGINE, U256::MAX))
			.await;
	}

	fn transfer_use(protocol: Address, in_indices: Vec<usize>) -> TokenUse {
		TokenUse {
			protocol,
			chain: CHAIN,
			account: user(),
			in_indices,
			outs: vec![],
			args: Bytes::new(),
		}
	}

	fn step(nonce: u64) -> SwapStep {
		SwapStep {
			chain: CHAIN,
			swapper: ENGINE,
			account: user(),
			use_delegate: false,
			nonce: U256::from(nonce),
			deadline: NOW + 600,
			ins: vec![TokenCheck::exact(TOKEN_A, U256::from(140))],
			outs: vec![TokenCheck::new(TOKEN_B, U256::from(450), U256::from(500))],
			uses: vec![transfer_use(TRANSFER, vec![0])],
		}
	}

	fn leg(in_amount: u64, out_token: Address, target: Address, out_index: usize) -> CallLeg {
		CallLeg {
			in_token: TOKEN_A,
			in_amount: U256::from(in_amount),
			out_token,
			outs: vec![CallOut::remainder(out_index)],
			target,
			data: Bytes::new(),
		}
	}

	fn params(step: SwapStep) -> SwapParams {
		let in_amounts = step.ins.iter().map(|check| check.max_amount).collect();
		let swap = Swap { steps: vec![step] };
		let swap_signature = sign(USER_KEY, &swap_digest(&swap).unwrap());
		SwapParams {
			swap,
			swap_signature,
			step_index: 0,
			permits: vec![],
			in_amounts,
			call: vec![leg(140, TOKEN_B, DEX_B, 0)],
			use_args: vec![],
		}
	}

	#[tokio::test]
	async fn test_swap_pays_output_to_use_account() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;
		let mut events = env.engine.event_bus().subscribe();

		let outcome = env.engine.swap(&params(step(1))).await.unwrap();

		assert_eq!(outcome.payer, user());
		assert_eq!(outcome.outputs, vec![U256::from(470)]);
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(860));
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
		assert_eq!(env.engine.balance_of(TOKEN_A, DEX_B).await, U256::from(140));
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::ZERO);
		assert!(env.engine.is_nonce_consumed(&user(), &U256::from(1)));

		match events.try_recv().unwrap() {
			SwapEvent::Step(StepEvent::Executed { nonce, .. }) => assert_eq!(nonce, U256::from(1)),
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_output_below_minimum_rolls_back() {
		let env = env(449, 0).await;
		approve_engine(&env.engine).await;
		let mut events = env.engine.event_bus().subscribe();

		let result = env.engine.swap(&params(step(1))).await;

		assert!(matches!(
			result,
			Err(SwapError::InsufficientOutAmount { index: 0, amount, min })
				if amount == U256::from(449) && min == U256::from(450)
		));
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1000));
		assert_eq!(env.engine.balance_of(TOKEN_B, DEX_B).await, U256::from(10_000));
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::ZERO);
		assert!(!env.engine.is_nonce_consumed(&user(), &U256::from(1)));
		assert!(events.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_output_above_maximum_is_capped() {
		let env = env(730, 0).await;
		approve_engine(&env.engine).await;

		let outcome = env.engine.swap(&params(step(1))).await.unwrap();

		assert_eq!(outcome.outputs, vec![U256::from(730)]);
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(500));
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::from(230));
	}

	#[tokio::test]
	async fn test_replayed_step_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;
		let params = params(step(7));

		env.engine.swap(&params).await.unwrap();
		let result = env.engine.swap(&params).await;

		assert!(matches!(result, Err(SwapError::InvalidNonce { .. })));
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
	}

	#[tokio::test]
	async fn test_deadline_is_inclusive() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		env.clock.set(NOW + 601);
		let result = env.engine.swap(&params(step(1))).await;
		assert!(matches!(
			result,
			Err(SwapError::StepExpired { deadline, now }) if deadline == NOW + 600 && now == NOW + 601
		));

		env.clock.set(NOW + 600);
		assert!(env.engine.swap(&params(step(1))).await.is_ok());
	}

	#[tokio::test]
	async fn test_paused_engine_halts_swaps() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		env.life.pause(&OWNER).unwrap();
		let result = env.engine.swap(&params(step(1))).await;
		assert!(matches!(result, Err(SwapError::OperationsHalted)));
		assert!(env.engine.life_state().paused);

		env.life.unpause(&OWNER).unwrap();
		assert!(env.engine.swap(&params(step(1))).await.is_ok());
	}

	#[tokio::test]
	async fn test_tampered_or_foreign_signature_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut tampered = params(step(1));
		tampered.swap.steps[0].outs[0].min_amount = U256::ZERO;
		assert!(matches!(
			env.engine.swap(&tampered).await,
			Err(SwapError::InvalidSignature(_))
		));

		let mut foreign = params(step(1));
		foreign.swap_signature = sign(OTHER_KEY, &swap_digest(&foreign.swap).unwrap());
		assert!(matches!(
			env.engine.swap(&foreign).await,
			Err(SwapError::InvalidSignature(_))
		));
	}

	#[tokio::test]
	async fn test_step_of_another_account_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut second = step(2);
		second.account = signer(OTHER_KEY).address();
		let swap = Swap {
			steps: vec![step(1), second],
		};
		let mut params = params(step(1));
		params.swap_signature = sign(USER_KEY, &swap_digest(&swap).unwrap());
		params.swap = swap;
		params.step_index = 1;

		assert!(matches!(
			env.engine.swap(&params).await,
			Err(SwapError::InvalidSignature(_))
		));
	}

	#[tokio::test]
	async fn test_step_for_other_engine_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut foreign = step(1);
		foreign.swapper = Address::repeat_byte(0x52);
		assert!(matches!(
			env.engine.swap(&params(foreign)).await,
			Err(SwapError::InvalidSignature(_))
		));
	}

	#[tokio::test]
	async fn test_delegate_funded_step_deploys_delegate() {
		let env = env(470, 0).await;
		let delegate = env.engine.predict_delegate_deploy(&user());
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_A, delegate, U256::from(140)))
			.await
			.unwrap();
		assert!(!env.engine.is_delegate_deployed(&user()));
		let mut events = env.engine.event_bus().subscribe();

		let mut delegated = step(1);
		delegated.use_delegate = true;
		let outcome = env.engine.swap(&params(delegated)).await.unwrap();

		assert_eq!(outcome.payer, delegate);
		assert!(env.engine.is_delegate_deployed(&user()));
		assert_eq!(env.engine.balance_of(TOKEN_A, delegate).await, U256::ZERO);
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1000));
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
		assert!(matches!(
			events.try_recv().unwrap(),
			SwapEvent::Delegate(DelegateEvent::Deployed { delegate: d, .. }) if d == delegate
		));
	}

	#[tokio::test]
	async fn test_failed_delegate_step_undoes_deployment() {
		let env = env(449, 0).await;
		let delegate = env.engine.predict_delegate_deploy(&user());
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_A, delegate, U256::from(140)))
			.await
			.unwrap();

		let mut events = env.engine.event_bus().subscribe();

		let mut delegated = step(1);
		delegated.use_delegate = true;
		assert!(env.engine.swap(&params(delegated)).await.is_err());

		assert!(!env.engine.is_delegate_deployed(&user()));
		assert_eq!(env.engine.balance_of(TOKEN_A, delegate).await, U256::from(140));
		assert!(events.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_owner_withdraws_from_delegate() {
		let env = env(0, 0).await;
		let delegate = env.engine.deploy_delegate(&user()).await.unwrap();
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_A, delegate, U256::from(50)))
			.await
			.unwrap();
		let items = [WithdrawItem {
			token: TOKEN_A,
			amount: U256::from(50),
			to: user(),
		}];

		let stranger = Address::repeat_byte(0x99);
		assert!(matches!(
			env.engine.withdraw_delegate(&stranger, &user(), &items).await,
			Err(SwapError::Unauthorized(_))
		));

		env.engine
			.withdraw_delegate(&user(), &user(), &items)
			.await
			.unwrap();
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1050));
	}

	#[tokio::test]
	async fn test_transfer_and_gas_vendor_uses() {
		let env = env(470, 120).await;
		approve_engine(&env.engine).await;

		let mut split = step(1);
		split.ins.push(TokenCheck::exact(TOKEN_A, U256::from(60)));
		split
			.outs
			.push(TokenCheck::new(TOKEN_C, U256::ZERO, U256::from(100)));
		split.uses.push(transfer_use(GAS_VENDOR, vec![1]));
		let mut params = params(split);
		params.call.push(leg(60, TOKEN_C, DEX_C, 1));

		let outcome = env.engine.swap(&params).await.unwrap();

		assert_eq!(outcome.outputs, vec![U256::from(470), U256::from(120)]);
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(800));
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
		assert_eq!(env.engine.balance_of(TOKEN_C, COLLECTOR).await, U256::from(77));
		assert_eq!(env.engine.balance_of(TOKEN_C, user()).await, U256::from(23));
		assert_eq!(env.engine.balance_of(TOKEN_C, ENGINE).await, U256::from(20));
	}

	#[tokio::test]
	async fn test_output_shared_by_two_uses_is_paid_once() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut shared = step(1);
		shared.uses.push(transfer_use(TRANSFER, vec![0]));
		let outcome = env.engine.swap(&params(shared)).await.unwrap();

		assert_eq!(outcome.use_outputs[0][0].amount, U256::from(470));
		assert_eq!(outcome.use_outputs[1][0].amount, U256::ZERO);
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
	}

	#[tokio::test]
	async fn test_unknown_protocol_rolls_back() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let unknown = Address::repeat_byte(0x98);
		let mut bad = step(1);
		bad.uses = vec![transfer_use(unknown, vec![0])];

		let result = env.engine.swap(&params(bad)).await;

		assert!(matches!(result, Err(SwapError::UnknownProtocol(p)) if p == unknown));
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1000));
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_legs_cannot_spend_retained_funds() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_A, ENGINE, U256::from(1000)))
			.await
			.unwrap();

		let mut greedy = params(step(1));
		greedy.call = vec![leg(200, TOKEN_B, DEX_B, 0)];
		let result = env.engine.swap(&greedy).await;

		assert!(matches!(result, Err(SwapError::CallInputExceedsPulled { .. })));
		assert_eq!(result.unwrap_err().kind(), "AmountOutOfBounds");
		assert_eq!(env.engine.balance_of(TOKEN_A, ENGINE).await, U256::from(1000));
	}

	#[tokio::test]
	async fn test_input_outside_bounds_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut params = params(step(1));
		params.in_amounts = vec![U256::from(141)];

		assert!(matches!(
			env.engine.swap(&params).await,
			Err(SwapError::AmountOutOfBounds { index: 0, .. })
		));
	}

	#[tokio::test]
	async fn test_missing_allowance_is_reported() {
		let env = env(470, 0).await;

		let result = env.engine.swap(&params(step(1))).await;
		assert!(matches!(result, Err(SwapError::AllowanceInsufficient(_))));
	}

	#[tokio::test]
	async fn test_permit_grants_allowance() {
		let env = env(470, 0).await;
		let deadline = NOW + 100;
		let digest = permit_digest(
			CHAIN,
			&TOKEN_A,
			&user(),
			&ENGINE,
			U256::from(140),
			U256::ZERO,
			deadline,
		);

		let mut params = params(step(1));
		params.permits = vec![Permit {
			resolver: RESOLVER,
			token: TOKEN_A,
			amount: U256::from(140),
			deadline,
			signature: sign(USER_KEY, &digest),
		}];

		env.engine.swap(&params).await.unwrap();
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
	}

	#[tokio::test]
	async fn test_unlisted_permit_resolver_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut params = params(step(1));
		params.permits = vec![Permit {
			resolver: Address::repeat_byte(0x97),
			token: TOKEN_A,
			amount: U256::from(140),
			deadline: NOW,
			signature: Bytes::new(),
		}];

		assert!(matches!(
			env.engine.swap(&params).await,
			Err(SwapError::UnknownPermitResolver(_))
		));
	}

	#[tokio::test]
	async fn test_stealth_swap_executes_committed_step() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let committed = step(1);
		let stealth_swap = StealthSwap {
			chain: CHAIN,
			swapper: ENGINE,
			account: user(),
			step_hashes: vec![hash_swap_step(&step(5)), hash_swap_step(&committed)],
		};
		let swap_signature = sign(USER_KEY, &stealth_swap_digest(&stealth_swap));
		let mut params = StealthSwapParams {
			stealth_swap,
			swap_signature,
			step: step(2),
			permits: vec![],
			in_amounts: vec![U256::from(140)],
			call: vec![leg(140, TOKEN_B, DEX_B, 0)],
			use_args: vec![],
		};

		assert!(matches!(
			env.engine.swap_stealth(&params).await,
			Err(SwapError::InvalidSignature(_))
		));

		params.step = committed;
		let outcome = env.engine.swap_stealth(&params).await.unwrap();
		assert_eq!(outcome.step_hash, params.stealth_swap.step_hashes[1]);
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
	}

	#[tokio::test]
	async fn test_stealth_commitment_for_other_engine_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		for (chain, swapper) in [(CHAIN + 1, ENGINE), (CHAIN, Address::repeat_byte(0x52))] {
			let stealth_swap = StealthSwap {
				chain,
				swapper,
				account: user(),
				step_hashes: vec![hash_swap_step(&step(1))],
			};
			let swap_signature = sign(USER_KEY, &stealth_swap_digest(&stealth_swap));
			let params = StealthSwapParams {
				stealth_swap,
				swap_signature,
				step: step(1),
				permits: vec![],
				in_amounts: vec![U256::from(140)],
				call: vec![leg(140, TOKEN_B, DEX_B, 0)],
				use_args: vec![],
			};

			assert!(matches!(
				env.engine.swap_stealth(&params).await,
				Err(SwapError::InvalidSignature(reason)) if reason.contains("commitment bound")
			));
		}
		assert!(!env.engine.is_nonce_consumed(&user(), &U256::from(1)));
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1000));
	}

	#[tokio::test(start_paused = true)]
	async fn test_abandoned_step_is_rolled_back() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut slow = params(step(1));
		slow.call = vec![leg(140, TOKEN_B, SLOW_DEX, 0)];
		let abandoned =
			tokio::time::timeout(Duration::from_millis(20), env.engine.swap(&slow)).await;

		assert!(abandoned.is_err());
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1000));
		assert_eq!(env.engine.balance_of(TOKEN_A, SLOW_DEX).await, U256::ZERO);
		assert_eq!(env.engine.balance_of(TOKEN_A, ENGINE).await, U256::ZERO);
		assert!(!env.engine.is_nonce_consumed(&user(), &U256::from(1)));

		env.engine.swap(&params(step(1))).await.unwrap();
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(860));
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
	}

	#[tokio::test]
	async fn test_permit_of_failed_step_can_be_resubmitted() {
		let env = env(470, 0).await;
		let deadline = NOW + 100;
		let permit = Permit {
			resolver: RESOLVER,
			token: TOKEN_A,
			amount: U256::from(140),
			deadline,
			signature: sign(
				USER_KEY,
				&permit_digest(
					CHAIN,
					&TOKEN_A,
					&user(),
					&ENGINE,
					U256::from(140),
					U256::ZERO,
					deadline,
				),
			),
		};

		let mut failing = step(1);
		failing.uses = vec![transfer_use(Address::repeat_byte(0x98), vec![0])];
		let mut failing = params(failing);
		failing.permits = vec![permit.clone()];
		assert!(matches!(
			env.engine.swap(&failing).await,
			Err(SwapError::UnknownProtocol(_))
		));

		let mut valid = params(step(1));
		valid.permits = vec![permit];
		env.engine.swap(&valid).await.unwrap();
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(470));
	}

	#[tokio::test]
	async fn test_bridge_use_reports_destination_outputs() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut bridged = step(1);
		bridged.uses = vec![TokenUse {
			protocol: BRIDGE,
			chain: 56,
			account: user(),
			in_indices: vec![0],
			outs: vec![TokenCheck::new(TOKEN_D, U256::from(440), U256::from(460))],
			args: Bytes::new(),
		}];
		let outcome = env.engine.swap(&params(bridged)).await.unwrap();

		assert_eq!(
			outcome.use_outputs,
			vec![vec![TokenAmount::new(TOKEN_D, U256::from(460))]]
		);
		assert_eq!(env.engine.balance_of(TOKEN_B, VAULT).await, U256::from(470));
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_unused_output_stays_with_engine() {
		let env = env(450, 0).await;
		let delegate = env.engine.predict_delegate_deploy(&user());
		env.engine
			.with_ledger(|ledger| {
				ledger.mint(TOKEN_A, delegate, U256::from(145))?;
				ledger.mint(TOKEN_B, delegate, U256::from(1040))?;
				ledger.mint(NATIVE_TOKEN, delegate, U256::from(240))
			})
			.await
			.unwrap();
		env.gas_vendor
			.set_gas_fee(
				&OWNER,
				GasFee {
					token: NATIVE_TOKEN,
					amount: U256::from(77),
					collector: COLLECTOR,
				},
			)
			.unwrap();

		let another = Address::repeat_byte(0xa7);
		let beef = Address::repeat_byte(0xbe);
		let code = Address::repeat_byte(0xc0);
		let receiving = |protocol: Address, account: Address, in_index: usize| TokenUse {
			account,
			..transfer_use(protocol, vec![in_index])
		};
		let mut rich = step(420);
		rich.use_delegate = true;
		rich.ins = vec![
			TokenCheck::exact(NATIVE_TOKEN, U256::from(100)),
			TokenCheck::exact(TOKEN_B, U256::from(300)),
			TokenCheck::new(TOKEN_A, U256::from(130), U256::from(150)),
			TokenCheck::new(NATIVE_TOKEN, U256::from(130), U256::from(150)),
			TokenCheck::new(TOKEN_B, U256::from(340), U256::from(400)),
			TokenCheck::new(TOKEN_B, U256::from(340), U256::from(400)),
		];
		rich.outs = vec![
			TokenCheck::new(TOKEN_B, U256::from(450), U256::from(500)),
			TokenCheck::new(NATIVE_TOKEN, U256::ZERO, U256::from(100)),
			TokenCheck::new(TOKEN_A, U256::from(110), U256::from(160)),
			TokenCheck::new(TOKEN_A, U256::from(450), U256::from(500)),
			TokenCheck::new(NATIVE_TOKEN, U256::from(50), U256::from(100)),
		];
		rich.uses = vec![
			receiving(TRANSFER, another, 0),
			receiving(GAS_VENDOR, user(), 1),
			receiving(TRANSFER, beef, 3),
			receiving(TRANSFER, code, 2),
		];

		let mut params = params(rich);
		params.in_amounts = [100u64, 300, 145, 140, 340, 400]
			.into_iter()
			.map(U256::from)
			.collect();
		params.call = vec![
			leg(145, TOKEN_B, DEX_B, 0),
			CallLeg {
				in_token: TOKEN_B,
				in_amount: U256::from(1040),
				out_token: TOKEN_A,
				outs: vec![CallOut::new(2, U256::from(110)), CallOut::remainder(3)],
				target: DEX_BA,
				data: Bytes::new(),
			},
			CallLeg {
				in_token: NATIVE_TOKEN,
				in_amount: U256::from(240),
				out_token: NATIVE_TOKEN,
				outs: vec![CallOut::new(1, U256::from(87)), CallOut::remainder(4)],
				target: DEX_NATIVE,
				data: Bytes::new(),
			},
		];

		let outcome = env.engine.swap(&params).await.unwrap();

		assert_eq!(
			outcome.outputs,
			[450u64, 87, 110, 500, 55].map(U256::from).to_vec()
		);
		assert_eq!(env.engine.balance_of(TOKEN_B, another).await, U256::from(450));
		assert_eq!(env.engine.balance_of(TOKEN_A, beef).await, U256::from(500));
		assert_eq!(env.engine.balance_of(TOKEN_A, code).await, U256::from(110));
		assert_eq!(env.engine.balance_of(NATIVE_TOKEN, COLLECTOR).await, U256::from(77));
		assert_eq!(env.engine.balance_of(NATIVE_TOKEN, user()).await, U256::from(10));
		assert_eq!(env.engine.balance_of(NATIVE_TOKEN, ENGINE).await, U256::from(55));
		for token in [TOKEN_A, TOKEN_B, NATIVE_TOKEN] {
			assert_eq!(env.engine.balance_of(token, delegate).await, U256::ZERO);
		}
		assert_eq!(env.engine.balance_of(TOKEN_A, ENGINE).await, U256::ZERO);
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_whitelisted_caller_withdraws_engine_funds() {
		let env = env(0, 0).await;
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_B, ENGINE, U256::from(230)))
			.await
			.unwrap();
		let mut events = env.engine.event_bus().subscribe();
		let items = [WithdrawItem {
			token: TOKEN_B,
			amount: U256::from(230),
			to: admin(),
		}];

		assert!(matches!(
			env.engine.withdraw(&user(), &items).await,
			Err(SwapError::Unauthorized(_))
		));

		env.engine.withdraw(&admin(), &items).await.unwrap();
		assert_eq!(env.engine.balance_of(TOKEN_B, admin()).await, U256::from(230));
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::ZERO);
		assert!(matches!(
			events.try_recv().unwrap(),
			SwapEvent::Engine(EngineEvent::Withdrawn { caller, items: 1 }) if caller == admin()
		));
	}

	#[tokio::test]
	async fn test_partial_engine_withdrawal_is_reverted() {
		let env = env(0, 0).await;
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_B, ENGINE, U256::from(230)))
			.await
			.unwrap();
		let items = [
			WithdrawItem {
				token: TOKEN_B,
				amount: U256::from(230),
				to: admin(),
			},
			WithdrawItem {
				token: TOKEN_C,
				amount: U256::from(1),
				to: admin(),
			},
		];

		assert!(matches!(
			env.engine.withdraw(&admin(), &items).await,
			Err(SwapError::InsufficientBalance(_))
		));
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::from(230));
		assert_eq!(env.engine.balance_of(TOKEN_B, admin()).await, U256::ZERO);
	}

	fn withdrawal(account: Address, nonce: u64, items: Vec<WithdrawItem>) -> Withdrawal {
		Withdrawal {
			chain: CHAIN,
			swapper: ENGINE,
			account,
			nonce: U256::from(nonce),
			deadline: NOW + 60,
			items,
		}
	}

	#[tokio::test]
	async fn test_signed_withdrawal_consumes_nonce() {
		let env = env(0, 0).await;
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_B, ENGINE, U256::from(230)))
			.await
			.unwrap();
		let retained = withdrawal(
			Address::ZERO,
			4,
			vec![WithdrawItem {
				token: TOKEN_B,
				amount: U256::from(100),
				to: admin(),
			}],
		);

		let by_user = sign(USER_KEY, &withdrawal_digest(&retained));
		assert!(matches!(
			env.engine.withdraw_signed(&retained, &by_user).await,
			Err(SwapError::Unauthorized(_))
		));
		assert!(!env.engine.is_nonce_consumed(&user(), &U256::from(4)));

		let by_admin = sign(OTHER_KEY, &withdrawal_digest(&retained));
		let signer = env.engine.withdraw_signed(&retained, &by_admin).await.unwrap();
		assert_eq!(signer, admin());
		assert!(env.engine.is_nonce_consumed(&admin(), &U256::from(4)));
		assert_eq!(env.engine.balance_of(TOKEN_B, admin()).await, U256::from(100));

		assert!(matches!(
			env.engine.withdraw_signed(&retained, &by_admin).await,
			Err(SwapError::InvalidNonce { .. })
		));
		assert_eq!(env.engine.balance_of(TOKEN_B, ENGINE).await, U256::from(130));

		let late = withdrawal(Address::ZERO, 5, retained.items.clone());
		env.clock.set(NOW + 61);
		assert!(matches!(
			env.engine
				.withdraw_signed(&late, &sign(OTHER_KEY, &withdrawal_digest(&late)))
				.await,
			Err(SwapError::WithdrawalExpired { .. })
		));
	}

	#[tokio::test]
	async fn test_signed_withdrawal_from_own_delegate() {
		let env = env(0, 0).await;
		let delegate = env.engine.deploy_delegate(&user()).await.unwrap();
		env.engine
			.with_ledger(|ledger| ledger.mint(TOKEN_A, delegate, U256::from(50)))
			.await
			.unwrap();
		let own = withdrawal(
			user(),
			1,
			vec![WithdrawItem {
				token: TOKEN_A,
				amount: U256::from(50),
				to: user(),
			}],
		);

		env.engine
			.withdraw_signed(&own, &sign(USER_KEY, &withdrawal_digest(&own)))
			.await
			.unwrap();

		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1050));
		assert_eq!(env.engine.balance_of(TOKEN_A, delegate).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_call_back_into_engine_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut nested = params(step(1));
		nested.call = vec![leg(140, TOKEN_B, REENTRANT, 0)];
		let result = env.engine.swap(&nested).await;

		assert!(matches!(&result, Err(SwapError::CallFailed(reason)) if reason.contains("Reentrancy")));
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1000));
		assert!(!env.engine.is_nonce_consumed(&user(), &U256::from(1)));
		assert!(!env.engine.is_nonce_consumed(&user(), &U256::from(2)));
	}

	#[tokio::test]
	async fn test_independent_swaps_are_serialized() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;
		let first = params(step(1));
		let second = params(step(2));

		let (first, second) = tokio::join!(env.engine.swap(&first), env.engine.swap(&second));

		assert!(first.is_ok());
		assert!(second.is_ok());
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(720));
		assert_eq!(env.engine.balance_of(TOKEN_B, user()).await, U256::from(940));
	}

	#[tokio::test]
	async fn test_leg_to_unknown_target_is_rejected() {
		let env = env(470, 0).await;
		approve_engine(&env.engine).await;

		let mut params = params(step(1));
		params.call = vec![leg(140, TOKEN_B, Address::repeat_byte(0x96), 0)];

		assert!(matches!(
			env.engine.swap(&params).await,
			Err(SwapError::CallFailed(reason)) if reason.contains("unknown target")
		));
		assert_eq!(env.engine.balance_of(TOKEN_A, user()).await, U256::from(1000));
	}
}
