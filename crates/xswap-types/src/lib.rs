//! Common types module for the xSwap engine.
//!
//! This module defines the data model shared by every engine component:
//! signed swap descriptions, the token ledger the engine settles against,
//! events, and the configuration validation framework.

/// Capability traits such as account whitelists.
pub mod access;
/// Event types published by the engine.
pub mod events;
/// Non-reentrant invocation guard.
pub mod guard;
/// Token ledger with journaled rollback.
pub mod ledger;
/// Registry trait for named, config-selected implementations.
pub mod registry;
/// Signed swap data model (steps, token checks, uses, permits, call legs).
pub mod swap;
/// Utility functions for hashing and formatting.
pub mod utils;
/// Configuration validation types for implementation-specific settings.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use access::{AccountWhitelist, EmptyWhitelist};
pub use events::*;
pub use guard::{ReentrancyGuard, ReentrancyLock};
pub use ledger::{Checkpoint, Ledger, LedgerError};
pub use registry::ImplementationRegistry;
pub use swap::*;
pub use utils::{truncate_id, with_0x_prefix};
pub use validation::*;
