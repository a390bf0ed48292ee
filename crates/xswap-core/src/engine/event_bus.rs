//! Broadcast channel for engine events.

use tokio::sync::broadcast;
use xswap_types::SwapEvent;

/// Cloneable handle publishing [`SwapEvent`]s to every subscriber.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<SwapEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
		self.sender.subscribe()
	}

	/// Publishes `event`. Having no subscribers is not an error.
	pub fn publish(&self, event: SwapEvent) {
		if self.sender.send(event).is_err() {
			tracing::trace!("Event published without subscribers");
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
