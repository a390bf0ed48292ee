//! Core swap engine.
//!
//! Wires the nonce registry, signature validation, delegate registry and call
//! executor into a [`SwapEngine`] that executes one signed swap step per
//! invocation with all-or-nothing semantics.

pub mod access;
pub mod builder;
pub mod clock;
pub mod engine;
pub mod error;
pub mod life;
pub mod permit;
pub mod protocols;

pub use access::{AccessError, OwnableAccountWhitelist};
pub use builder::{BuilderError, EngineBuilder, EngineHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::event_bus::EventBus;
pub use engine::{EngineParts, StealthSwapParams, StepOutcome, SwapEngine, SwapParams};
pub use error::SwapError;
pub use life::{LifeControl, LifeState, SimpleLifeControl};
pub use permit::{
	DaiPermitResolver, PermitContext, PermitRequest, PermitResolver, SignaturePermitResolver,
};
pub use protocols::{
	BridgeProtocol, GasFee, GasVendorProtocol, TransferProtocol, UseContext, UseProtocol,
};
