//! Registry trait for self-registering implementations.
//!
//! Pluggable backends (for example nonce schemes) declare the name they are
//! selected by in configuration and the factory that builds them.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. `"slot_bitmap"` for `nonces.implementations.slot_bitmap`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
