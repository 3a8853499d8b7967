//! Process-local topic-keyed rendezvous with single-slot buffering.
//!
//! Control messages (`new` / `delete` / `deactivate`) and inbound push
//! payloads (`push:{test_id}`) share the same bus. Publishers never block:
//! a publish into an occupied slot is dropped. Consumers block up to a
//! deadline. Topics are created lazily from either side, so a consumer may
//! subscribe before the first publish.

// std
use std::collections::HashMap;
// crates.io
use tokio::{
	sync::{Mutex, RwLock, mpsc},
	time,
};
// self
use crate::_prelude::*;

/// Control topic announcing a new or replaced test (JSON-encoded [`crate::Test`]).
pub const TOPIC_NEW: &str = "new";
/// Control topic announcing a removed test (payload: the test id).
pub const TOPIC_DELETE: &str = "delete";
/// Control topic announcing a deactivated test (payload: the test id).
pub const TOPIC_DEACTIVATE: &str = "deactivate";

/// Single-slot channel pair backing one topic.
#[derive(Clone, Debug)]
struct TopicSlot {
	tx: mpsc::Sender<Vec<u8>>,
	rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}
impl TopicSlot {
	fn new() -> Self {
		let (tx, rx) = mpsc::channel(1);

		Self { tx, rx: Arc::new(Mutex::new(rx)) }
	}
}

/// Topic registry shared by the scheduler, the push endpoints, and the admin
/// surface.
#[derive(Clone, Debug, Default)]
pub struct Bus {
	topics: Arc<RwLock<HashMap<String, TopicSlot>>>,
}
impl Bus {
	/// Create an empty bus.
	pub fn new() -> Self {
		Self::default()
	}

	async fn slot(&self, topic: &str) -> TopicSlot {
		{
			let topics = self.topics.read().await;

			if let Some(slot) = topics.get(topic) {
				return slot.clone();
			}
		}

		let mut topics = self.topics.write().await;

		topics.entry(topic.to_string()).or_insert_with(TopicSlot::new).clone()
	}

	/// Publish without blocking; [`Error::QueueFull`] when the slot is
	/// occupied, [`Error::TopicClosed`] when it raced with a close.
	pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
		let slot = self.slot(topic).await;

		match slot.tx.try_send(payload) {
			Ok(()) => Ok(()),
			Err(mpsc::error::TrySendError::Full(_)) => Err(Error::QueueFull),
			Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::TopicClosed),
		}
	}

	/// Await the next payload on a topic for at most `timeout`.
	///
	/// Returns [`Error::PushTimedOut`] on deadline and [`Error::TopicClosed`]
	/// once the topic has been closed.
	pub async fn next(&self, topic: &str, timeout: Duration) -> Result<Vec<u8>> {
		// Hold only the receiver half across the await; keeping the slot's
		// sender alive here would stop `close` from waking this waiter.
		let rx = self.slot(topic).await.rx.clone();
		let mut rx = rx.lock().await;

		match time::timeout(timeout, rx.recv()).await {
			Ok(Some(payload)) => Ok(payload),
			Ok(None) => Err(Error::TopicClosed),
			Err(_) => Err(Error::PushTimedOut),
		}
	}

	/// Remove a topic and wake any waiter with [`Error::TopicClosed`].
	pub async fn close(&self, topic: &str) -> Result<()> {
		let mut topics = self.topics.write().await;

		topics.remove(topic).map(|_| ()).ok_or(Error::NotFound)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn publish_then_next_delivers_the_payload() {
		let bus = Bus::new();

		bus.publish("push:t1", b"{\"ok\":true}".to_vec()).await.expect("publish");

		let payload = bus.next("push:t1", Duration::from_millis(100)).await.expect("next");

		assert_eq!(payload, b"{\"ok\":true}");
	}

	#[tokio::test]
	async fn second_publish_into_an_occupied_slot_is_dropped() {
		let bus = Bus::new();

		bus.publish("push:t1", b"first".to_vec()).await.expect("publish");

		assert!(matches!(bus.publish("push:t1", b"second".to_vec()).await, Err(Error::QueueFull)));
		assert_eq!(
			bus.next("push:t1", Duration::from_millis(100)).await.expect("next"),
			b"first"
		);
	}

	#[tokio::test]
	async fn next_times_out_without_a_publish() {
		let bus = Bus::new();

		assert!(matches!(
			bus.next("push:t1", Duration::from_millis(20)).await,
			Err(Error::PushTimedOut)
		));
	}

	#[tokio::test]
	async fn close_wakes_a_blocked_waiter() {
		let bus = Bus::new();
		let waiter = {
			let bus = bus.clone();

			tokio::spawn(async move { bus.next("push:t1", Duration::from_secs(5)).await })
		};

		// Let the waiter park on the topic before closing it.
		time::sleep(Duration::from_millis(20)).await;
		bus.close("push:t1").await.expect("close");

		assert!(matches!(waiter.await.expect("join"), Err(Error::TopicClosed)));
	}

	#[tokio::test]
	async fn closing_an_unknown_topic_reports_not_found() {
		let bus = Bus::new();

		assert!(matches!(bus.close("missing").await, Err(Error::NotFound)));
	}
}
