use std::sync::Arc;

use async_channel as chan;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::{
	error::Error,
	job::{Job, JobState},
	message::RunnerMessage,
	notifier::{Change, Notifier},
};

/// Every job ever admitted, in admission order, regardless of it still being queued or not.
///
/// Entries are only lost through [`History::remove`] and [`History::clear`].
#[derive(Debug, Clone)]
pub struct History {
	entries: Arc<RwLock<Vec<Arc<Job>>>>,
	notifier: Notifier,
	runner_tx: chan::Sender<RunnerMessage>,
}

impl History {
	pub(crate) fn new(notifier: Notifier, runner_tx: chan::Sender<RunnerMessage>) -> Self {
		Self {
			entries: Arc::default(),
			notifier,
			runner_tx,
		}
	}

	/// Only called by the scheduler runner on admission.
	pub(crate) async fn record(&self, job: Arc<Job>) {
		trace!(job_id = %job.id(), "Recording job on history");
		self.entries.write().await.push(job);

		self.notifier.notify(Change::History);
	}

	/// Remove a single entry, leaving the job itself untouched, even if it is still running.
	pub async fn remove(&self, index: usize) -> Result<Arc<Job>, Error> {
		let job = {
			let mut entries = self.entries.write().await;

			if index >= entries.len() {
				return Err(Error::HistoryIndexOutOfBounds {
					index,
					len: entries.len(),
				});
			}

			entries.remove(index)
		};

		trace!(job_id = %job.id(), %index, "Removed job from history");
		self.notifier.notify(Change::History);

		Ok(job)
	}

	/// Empty the history, but first cancel every job still waiting to run and stop the running one,
	/// so no job keeps going after nobody can see it anymore.
	///
	/// The cancellations are announced by the scheduler once it drops those jobs from its queue.
	pub async fn clear(&self) {
		let mut canceled_any = false;

		let cleared = {
			let mut entries = self.entries.write().await;

			// Waiting jobs go first, otherwise stopping the running one could let the scheduler
			// dispatch the next before we get to cancel it
			for job in entries.iter() {
				// A ready job is mid dispatch, its start becomes a no-op once canceled
				if matches!(job.state(), JobState::Idle | JobState::Ready) {
					canceled_any |= job.cancel();
				}
			}

			for job in entries.iter() {
				if job.state() == JobState::InProgress {
					job.stop();
				}
			}

			let cleared = entries.len();
			entries.clear();
			cleared
		};

		debug!(%cleared, "History cleared");
		self.notifier.notify(Change::History);

		if canceled_any && self.runner_tx.send(RunnerMessage::Reevaluate).await.is_err() {
			warn!("Scheduler runner is gone, canceled jobs will stay queued");
		}
	}

	/// Entries that ran until a terminal state: completed, stopped or error.
	pub async fn completed(&self) -> Vec<Arc<Job>> {
		self.entries
			.read()
			.await
			.iter()
			.filter(|job| job.state().is_finished())
			.cloned()
			.collect()
	}

	pub async fn entries(&self) -> Vec<Arc<Job>> {
		self.entries.read().await.clone()
	}

	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}
