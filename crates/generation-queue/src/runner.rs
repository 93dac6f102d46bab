use std::{
	collections::{HashMap, VecDeque},
	pin::pin,
	sync::Arc,
};

use async_channel as chan;
use futures::StreamExt;
use tokio::{spawn, sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, trace, warn, Instrument};

use super::{
	error::Error,
	history::History,
	job::{Job, JobId, JobState},
	message::RunnerMessage,
	notifier::{Change, Notifier},
};

/// Owner of the active queue. Lives in a single tokio task, so every structural change to the
/// queue is serialized by the message stream.
pub(crate) struct Runner {
	queue: VecDeque<Arc<Job>>,
	/// Forwarders of the dispatched jobs' state changes. A job stays here until its forwarder
	/// delivers the terminal state, even if the job already left the queue.
	subscriptions: HashMap<JobId, (Arc<Job>, JoinHandle<()>)>,
	is_dispatching: bool,
	history: History,
	notifier: Notifier,
	msgs_tx: chan::Sender<RunnerMessage>,
}

impl Runner {
	pub(crate) fn new(
		history: History,
		notifier: Notifier,
		msgs_tx: chan::Sender<RunnerMessage>,
	) -> Self {
		Self {
			queue: VecDeque::new(),
			subscriptions: HashMap::new(),
			is_dispatching: false,
			history,
			notifier,
			msgs_tx,
		}
	}

	async fn admit(&mut self, job: Arc<Job>) -> Result<(), Error> {
		let job_id = job.id();

		let state = job.state();
		if state != JobState::Idle {
			return Err(Error::NotIdle { id: job_id, state });
		}

		if self.position(job_id).is_some() {
			return Err(Error::AlreadyAdmitted(job_id));
		}

		trace!(%job_id, queue_len = self.queue.len(), "Admitting job");

		self.queue.push_back(Arc::clone(&job));
		self.history.record(job).await;
		self.notifier.notify(Change::ActiveQueue);

		self.dispatch_next();

		Ok(())
	}

	fn cancel(&mut self, job_id: JobId) -> bool {
		let Some(idx) = self.position(job_id) else {
			trace!(%job_id, "Job is not queued, nothing to cancel");
			return false;
		};

		let job = Arc::clone(&self.queue[idx]);

		match job.state() {
			JobState::InProgress => {
				debug!(%job_id, "Job is already running, cancel becomes a stop request");
				job.stop()
			}

			state if state.is_terminal() => {
				self.remove_at(idx);
				self.notifier.notify(Change::ActiveQueue);
				self.dispatch_next();
				false
			}

			_ => {
				let canceled = job.cancel();

				self.remove_at(idx);
				self.notifier.notify(Change::ActiveQueue);

				self.dispatch_next();

				canceled
			}
		}
	}

	fn cancel_all_idle(&mut self) -> Vec<JobId> {
		let mut canceled = Vec::new();

		self.queue.retain(|job| {
			if job.state() == JobState::Idle && job.cancel() {
				canceled.push(job.id());
				false
			} else {
				true
			}
		});

		debug!(canceled_count = canceled.len(), "Canceled all idle jobs");

		if !canceled.is_empty() {
			for &job_id in &canceled {
				self.notifier.notify(Change::JobState {
					job_id,
					state: JobState::Canceled,
				});
			}
			self.notifier.notify(Change::ActiveQueue);
		}

		self.dispatch_next();

		canceled
	}

	fn stop(&self, job_id: JobId) -> bool {
		self.position(job_id).map_or_else(
			|| {
				trace!(%job_id, "Job is not queued, nothing to stop");
				false
			},
			|idx| self.queue[idx].stop(),
		)
	}

	fn job_state_changed(&mut self, job_id: JobId, state: JobState) {
		if !self.subscriptions.contains_key(&job_id) {
			trace!(%job_id, %state, "Dropping state change of a job that is no longer tracked");
			return;
		}

		self.notifier.notify(Change::JobState { job_id, state });

		if state.is_terminal() {
			debug!(%job_id, %state, "Dispatched job reached a terminal state");

			// The forwarder exits by itself after sending a terminal state
			self.subscriptions.remove(&job_id);

			if let Some(idx) = self.position(job_id) {
				self.queue.remove(idx);
				self.notifier.notify(Change::ActiveQueue);
			}

			self.dispatch_next();
		}
	}

	/// Advances the queue head, starting at most one job.
	///
	/// There is no timeout here: a job that never reaches a terminal state keeps the whole queue
	/// waiting until someone stops it.
	fn dispatch_next(&mut self) {
		assert!(
			!self.is_dispatching,
			"the dispatch loop must never run concurrently with itself"
		);
		self.is_dispatching = true;

		let mut queue_changed = false;

		while let Some(head) = self.queue.front().map(Arc::clone) {
			let state = head.state();

			if state.is_terminal() {
				trace!(job_id = %head.id(), %state, "Removing terminal job from queue head");
				self.remove_at(0);
				queue_changed = true;
				continue;
			}

			if state != JobState::Idle {
				trace!(job_id = %head.id(), %state, "A dispatched job is still outstanding");
				break;
			}

			// Both fail only if the job got canceled in the meantime, in which case we look at the
			// head again and remove it
			if !head.try_mark_ready() {
				continue;
			}

			self.notifier.notify(Change::JobState {
				job_id: head.id(),
				state: JobState::Ready,
			});

			self.subscribe(&head);

			if head.start() {
				debug!(job_id = %head.id(), "Dispatched job");
				break;
			}

			// Canceled between ready and start, so the forwarder has nothing left to deliver and
			// the removal of the head announces the cancellation instead
			if let Some((_, forwarder)) = self.subscriptions.remove(&head.id()) {
				forwarder.abort();
			}
		}

		self.is_dispatching = false;

		if queue_changed {
			self.notifier.notify(Change::ActiveQueue);
		}
	}

	fn subscribe(&mut self, job: &Arc<Job>) {
		let mut events_rx = job.subscribe();

		let forwarder = spawn({
			let job = Arc::clone(job);
			let msgs_tx = self.msgs_tx.clone();

			async move {
				loop {
					let state = match events_rx.recv().await {
						Ok(state) => state,
						Err(RecvError::Lagged(missed)) => {
							warn!(
								job_id = %job.id(),
								%missed,
								"Lagged behind job state changes, resyncing with current state;"
							);
							job.state()
						}
						Err(RecvError::Closed) => break,
					};

					if msgs_tx
						.send(RunnerMessage::JobStateChanged {
							job_id: job.id(),
							state,
						})
						.await
						.is_err()
					{
						trace!(job_id = %job.id(), "Runner is gone, dropping job state forwarder");
						break;
					}

					if state.is_terminal() {
						break;
					}
				}
			}
			.in_current_span()
		});

		if let Some((_, old_forwarder)) = self
			.subscriptions
			.insert(job.id(), (Arc::clone(job), forwarder))
		{
			warn!(job_id = %job.id(), "Job was subscribed twice;");
			old_forwarder.abort();
		}
	}

	/// Removes a terminal job from the queue.
	///
	/// Jobs that were never started have no forwarder, so their terminal state is announced here.
	/// A dispatched job keeps its forwarder, which still owes the runner its terminal state.
	fn remove_at(&mut self, idx: usize) {
		let Some(job) = self.queue.remove(idx) else {
			return;
		};

		if self.subscriptions.contains_key(&job.id()) {
			trace!(job_id = %job.id(), "Terminal state will be announced by the job's forwarder");
			return;
		}

		let state = job.state();
		if state.is_terminal() {
			self.notifier.notify(Change::JobState {
				job_id: job.id(),
				state,
			});
		}
	}

	/// Drops every canceled job from the queue, e.g. after a history clear canceled them.
	fn prune_canceled(&mut self) {
		let mut pruned = false;
		let mut idx = 0;

		while idx < self.queue.len() {
			if self.queue[idx].state() == JobState::Canceled {
				self.remove_at(idx);
				pruned = true;
			} else {
				idx += 1;
			}
		}

		if pruned {
			self.notifier.notify(Change::ActiveQueue);
		}

		self.dispatch_next();
	}

	fn position(&self, job_id: JobId) -> Option<usize> {
		self.queue.iter().position(|job| job.id() == job_id)
	}

	fn shutdown(&mut self) {
		for job in self.queue.drain(..) {
			match job.state() {
				JobState::Idle => {
					job.cancel();
				}
				JobState::InProgress => {
					job.stop();
				}
				_ => {}
			}

			let state = job.state();
			if state.is_terminal() && !self.subscriptions.contains_key(&job.id()) {
				self.notifier.notify(Change::JobState {
					job_id: job.id(),
					state,
				});
			}
		}

		// Terminal states the forwarders didn't deliver yet are announced here. A job that is still
		// stopping ends without anyone being told.
		for (job_id, (job, forwarder)) in self.subscriptions.drain() {
			forwarder.abort();

			let state = job.state();
			if state.is_terminal() {
				self.notifier.notify(Change::JobState { job_id, state });
			}
		}

		self.notifier.notify(Change::ActiveQueue);
	}
}

pub(crate) async fn run(mut runner: Runner, msgs_rx: chan::Receiver<RunnerMessage>) {
	let mut msg_stream = pin!(msgs_rx);
	let mut shutdown_ack = None;

	trace!("Scheduler runner starting...");

	while let Some(msg) = msg_stream.next().await {
		match msg {
			RunnerMessage::Admit { job, ack } => {
				if ack.send(runner.admit(job).await).is_err() {
					warn!("Admit ack channel closed before sending response");
				}
			}

			RunnerMessage::Cancel { job_id, ack } => {
				if ack.send(runner.cancel(job_id)).is_err() {
					warn!("Cancel ack channel closed before sending response");
				}
			}

			RunnerMessage::CancelAllIdle { ack } => {
				if ack.send(runner.cancel_all_idle()).is_err() {
					warn!("Cancel all idle ack channel closed before sending response");
				}
			}

			RunnerMessage::Stop { job_id, ack } => {
				if ack.send(runner.stop(job_id)).is_err() {
					warn!("Stop ack channel closed before sending response");
				}
			}

			RunnerMessage::ActiveJobs { ack } => {
				if ack.send(runner.queue.iter().cloned().collect()).is_err() {
					warn!("Active jobs ack channel closed before sending response");
				}
			}

			RunnerMessage::JobStateChanged { job_id, state } => {
				runner.job_state_changed(job_id, state);
			}

			RunnerMessage::Reevaluate => runner.prune_canceled(),

			RunnerMessage::Shutdown(ack) => {
				shutdown_ack = Some(ack);
				break;
			}
		}
	}

	runner.shutdown();

	if let Some(ack) = shutdown_ack {
		if ack.send(()).is_err() {
			warn!("Shutdown ack channel closed before sending response");
		}
	}

	trace!("Scheduler runner stopped");
}
