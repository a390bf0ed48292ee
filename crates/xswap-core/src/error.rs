//! Failure reasons of a swap invocation.
//!
//! Every failure aborts the invocation as a whole; none is retried.

use alloy_primitives::{Address, U256};
use thiserror::Error;
use xswap_call::CallError;
use xswap_delegate::DelegateError;
use xswap_signature::SignatureError;
use xswap_types::{LedgerError, TokenCheckError};

/// Errors that can occur while executing a step.
#[derive(Debug, Error)]
pub enum SwapError {
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	#[error("Nonce {nonce} of {account} already consumed")]
	InvalidNonce { account: Address, nonce: U256 },
	#[error("Step expired at {deadline}, now {now}")]
	StepExpired { deadline: u64, now: u64 },
	#[error("Withdrawal expired at {deadline}, now {now}")]
	WithdrawalExpired { deadline: u64, now: u64 },
	#[error("Operations halted")]
	OperationsHalted,
	#[error("Input {index} out of bounds: {source}")]
	AmountOutOfBounds {
		index: usize,
		#[source]
		source: TokenCheckError,
	},
	#[error("Call inputs of {token} exceed pulled amount: {used} > {pulled}")]
	CallInputExceedsPulled {
		token: Address,
		used: U256,
		pulled: U256,
	},
	#[error("Allowance insufficient: {0}")]
	AllowanceInsufficient(String),
	#[error("Insufficient balance: {0}")]
	InsufficientBalance(String),
	#[error("Call failed: {0}")]
	CallFailed(String),
	#[error("Insufficient call output: {0}")]
	InsufficientCallOutput(String),
	#[error("Insufficient out amount for output {index}: {amount} < {min}")]
	InsufficientOutAmount { index: usize, amount: U256, min: U256 },
	#[error("Use {index} failed: {reason}")]
	UseFailed { index: usize, reason: String },
	#[error("Unauthorized: {0}")]
	Unauthorized(String),
	#[error("Unknown use protocol {0}")]
	UnknownProtocol(Address),
	#[error("Unknown permit resolver {0}")]
	UnknownPermitResolver(Address),
	#[error("Engine entered from within one of its own calls")]
	Reentrancy,
	#[error("Invalid params: {0}")]
	InvalidParams(String),
}

impl SwapError {
	/// Stable identifier of the failure kind.
	pub fn kind(&self) -> &'static str {
		match self {
			SwapError::InvalidSignature(_) => "InvalidSignature",
			SwapError::InvalidNonce { .. } => "InvalidNonce",
			SwapError::StepExpired { .. } => "StepExpired",
			SwapError::WithdrawalExpired { .. } => "WithdrawalExpired",
			SwapError::OperationsHalted => "OperationsHalted",
			SwapError::AmountOutOfBounds { .. } | SwapError::CallInputExceedsPulled { .. } => {
				"AmountOutOfBounds"
			},
			SwapError::AllowanceInsufficient(_) => "AllowanceInsufficient",
			SwapError::InsufficientBalance(_) => "InsufficientBalance",
			SwapError::CallFailed(_) => "CallFailed",
			SwapError::InsufficientCallOutput(_) => "InsufficientCallOutput",
			SwapError::InsufficientOutAmount { .. } => "InsufficientOutAmount",
			SwapError::UseFailed { .. } => "UseFailed",
			SwapError::Unauthorized(_) => "Unauthorized",
			SwapError::UnknownProtocol(_) => "UnknownProtocol",
			SwapError::UnknownPermitResolver(_) => "UnknownPermitResolver",
			SwapError::Reentrancy => "Reentrancy",
			SwapError::InvalidParams(_) => "InvalidParams",
		}
	}
}

impl From<SignatureError> for SwapError {
	fn from(err: SignatureError) -> Self {
		SwapError::InvalidSignature(err.to_string())
	}
}

impl From<LedgerError> for SwapError {
	fn from(err: LedgerError) -> Self {
		match err {
			LedgerError::InsufficientAllowance { .. } => {
				SwapError::AllowanceInsufficient(err.to_string())
			},
			LedgerError::InsufficientBalance { .. } | LedgerError::Overflow { .. } => {
				SwapError::InsufficientBalance(err.to_string())
			},
		}
	}
}

impl From<CallError> for SwapError {
	fn from(err: CallError) -> Self {
		match err {
			CallError::InsufficientCallOutput { .. } => {
				SwapError::InsufficientCallOutput(err.to_string())
			},
			CallError::Reentrancy => SwapError::Reentrancy,
			CallError::Ledger(inner) => inner.into(),
			CallError::CallFailed { .. } => SwapError::CallFailed(err.to_string()),
		}
	}
}

impl From<DelegateError> for SwapError {
	fn from(err: DelegateError) -> Self {
		match err {
			DelegateError::Ledger(inner) => inner.into(),
			DelegateError::Unauthorized { .. } | DelegateError::NotDeployed(_) => {
				SwapError::Unauthorized(err.to_string())
			},
		}
	}
}
