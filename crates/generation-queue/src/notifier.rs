use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

use super::job::{JobId, JobState};

/// Something observable changed, observers are expected to re-read what they display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
	/// A job was added to or removed from the active queue.
	ActiveQueue,
	/// A history entry was recorded or removed, or the history was cleared.
	History,
	/// A tracked job changed its state.
	JobState { job_id: JobId, state: JobState },
	/// The subscription lagged behind and this many notifications were dropped.
	Missed(u64),
}

/// Publishes [`Change`]s to any number of independent observers.
#[derive(Debug, Clone)]
pub struct Notifier {
	tx: broadcast::Sender<Change>,
}

impl Notifier {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));

		Self { tx }
	}

	/// Start observing changes. Dropping the [`Subscription`] unsubscribes.
	#[must_use]
	pub fn subscribe(&self) -> Subscription {
		Subscription {
			rx: self.tx.subscribe(),
		}
	}

	#[must_use]
	pub fn observers_count(&self) -> usize {
		self.tx.receiver_count()
	}

	pub(crate) fn notify(&self, change: Change) {
		if self.tx.send(change).is_err() {
			trace!(?change, "No observers for change");
		}
	}
}

#[derive(Debug)]
pub struct Subscription {
	rx: broadcast::Receiver<Change>,
}

impl Subscription {
	/// Wait for the next change, `None` means the publisher side is gone.
	pub async fn recv(&mut self) -> Option<Change> {
		match self.rx.recv().await {
			Ok(change) => Some(change),
			Err(RecvError::Lagged(missed)) => {
				warn!(%missed, "Change observer lagged behind;");
				Some(Change::Missed(missed))
			}
			Err(RecvError::Closed) => None,
		}
	}

	/// Explicit form of dropping the subscription.
	pub fn unsubscribe(self) {}
}
