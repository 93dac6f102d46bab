use std::sync::{Arc, Mutex, PoisonError};

use async_channel as chan;
use tokio::{spawn, sync::oneshot, task::JoinHandle};
use tracing::{error, info, instrument, warn, Instrument};

use super::{
	config::SchedulerConfig,
	error::Error,
	history::History,
	job::{Job, JobId},
	message::RunnerMessage,
	notifier::{Notifier, Subscription},
	runner::{run, Runner},
};

/// Admits jobs into a FIFO active queue and runs them one at a time.
///
/// Build a single instance when the process starts and hand it (or an `Arc` of it) to whoever needs
/// to admit, cancel or observe jobs. All operations are message passing to a runner task that owns
/// the queue, so none of them wait on a job's execution.
#[derive(Debug)]
pub struct Scheduler {
	msgs_tx: chan::Sender<RunnerMessage>,
	history: History,
	notifier: Notifier,
	runner_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
	/// Spawn the scheduler runner, must be called from within a tokio runtime
	#[must_use]
	pub fn new(config: &SchedulerConfig) -> Self {
		let (msgs_tx, msgs_rx) = chan::bounded(config.messages_capacity.max(1));

		let notifier = Notifier::new(config.notifications_capacity);
		let history = History::new(notifier.clone(), msgs_tx.clone());

		let runner = Runner::new(history.clone(), notifier.clone(), msgs_tx.clone());

		let runner_handle = spawn(run(runner, msgs_rx).in_current_span());

		Self {
			msgs_tx,
			history,
			notifier,
			runner_handle: Mutex::new(Some(runner_handle)),
		}
	}

	/// Append a job to the end of the active queue and record it on the history.
	///
	/// Returns as soon as the job is queued, the job runs whenever every job admitted before it
	/// is done.
	///
	/// # Panics
	///
	/// Panics only happen if internal channels are unexpectedly closed, i.e. after shutdown
	#[instrument(skip(self, job), fields(job_id = %job.id()), err)]
	pub async fn admit(&self, job: Arc<Job>) -> Result<(), Error> {
		self.request("admit", |ack| RunnerMessage::Admit { job, ack })
			.await
	}

	/// Remove a queued job that didn't run yet, marking it as canceled.
	///
	/// A job that is already running can't be canceled, it gets a stop request instead. Returns
	/// `false` if the job isn't queued.
	///
	/// # Panics
	///
	/// Panics only happen if internal channels are unexpectedly closed, i.e. after shutdown
	#[instrument(skip(self))]
	pub async fn cancel(&self, job_id: JobId) -> bool {
		self.request("cancel", |ack| RunnerMessage::Cancel { job_id, ack })
			.await
	}

	/// Cancel every queued job that is still idle, running jobs are left alone.
	///
	/// # Panics
	///
	/// Panics only happen if internal channels are unexpectedly closed, i.e. after shutdown
	#[instrument(skip(self))]
	pub async fn cancel_all_idle(&self) -> Vec<JobId> {
		self.request("cancel all idle", |ack| RunnerMessage::CancelAllIdle { ack })
			.await
	}

	/// Forward a stop request to a queued job, it only has effect if the job is running.
	///
	/// # Panics
	///
	/// Panics only happen if internal channels are unexpectedly closed, i.e. after shutdown
	#[instrument(skip(self))]
	pub async fn stop(&self, job_id: JobId) -> bool {
		self.request("stop", |ack| RunnerMessage::Stop { job_id, ack })
			.await
	}

	/// The active queue, in dispatch order.
	///
	/// # Panics
	///
	/// Panics only happen if internal channels are unexpectedly closed, i.e. after shutdown
	pub async fn active_jobs(&self) -> Vec<Arc<Job>> {
		self.request("active jobs", |ack| RunnerMessage::ActiveJobs { ack })
			.await
	}

	#[must_use]
	pub const fn history(&self) -> &History {
		&self.history
	}

	/// Observe changes of the active queue, the history and the state of tracked jobs.
	#[must_use]
	pub fn subscribe(&self) -> Subscription {
		self.notifier.subscribe()
	}

	#[must_use]
	pub const fn notifier(&self) -> &Notifier {
		&self.notifier
	}

	/// Cancel idle jobs, ask the running one to stop and wait for the runner to exit.
	pub async fn shutdown(&self) {
		let maybe_handle = self
			.runner_handle
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();

		if let Some(handle) = maybe_handle {
			let (ack_tx, ack_rx) = oneshot::channel();

			if self
				.msgs_tx
				.send(RunnerMessage::Shutdown(ack_tx))
				.await
				.is_ok() && ack_rx.await.is_err()
			{
				warn!("Scheduler runner exited before acknowledging shutdown");
			}

			if let Err(e) = handle.await {
				if e.is_panic() {
					error!(?e, "Scheduler runner panicked;");
				}
			}

			info!("Scheduler gracefully shutdown");
		} else {
			warn!("Trying to shutdown a scheduler that was already shutdown");
		}
	}

	async fn request<T>(
		&self,
		request: &'static str,
		msg: impl FnOnce(oneshot::Sender<T>) -> RunnerMessage + Send,
	) -> T {
		let (ack_tx, ack_rx) = oneshot::channel();

		self.msgs_tx
			.send(msg(ack_tx))
			.await
			.unwrap_or_else(|_| {
				panic!("runner msgs channel unexpectedly closed on {request} request")
			});

		ack_rx
			.await
			.unwrap_or_else(|_| panic!("ack channel closed before receiving {request} response"))
	}
}

impl Drop for Scheduler {
	fn drop(&mut self) {
		// Ends the runner loop even if `shutdown` was never called
		self.msgs_tx.close();
	}
}
