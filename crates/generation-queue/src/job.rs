use std::{
	fmt,
	future::{Future, IntoFuture},
	panic::AssertUnwindSafe,
	pin::Pin,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	task::{Context, Poll},
};

use async_channel as chan;
use async_trait::async_trait;
use downcast_rs::{impl_downcast, Downcast};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::{spawn, sync::broadcast};
use tracing::{error, trace, warn, Instrument};
use uuid::Uuid;

use super::error::JobError;

/// A unique identifier for a job using the [`uuid`](https://docs.rs/uuid) crate.
pub type JobId = Uuid;

const JOB_EVENTS_CAPACITY: usize = 16;

/// Every state a job goes through.
///
/// ```text
/// idle ──> ready ──> inProgress ──> completed | error | stopped
///   │        │
///   └────────┴──> canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
	/// Admitted and waiting for its turn.
	Idle,
	/// Picked as head of the queue and about to be started.
	Ready,
	/// The job body is running.
	InProgress,
	Completed,
	Error,
	/// Halted mid-flight on request.
	Stopped,
	/// Removed from the queue before it got to run.
	Canceled,
}

impl JobState {
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(
			self,
			Self::Completed | Self::Error | Self::Stopped | Self::Canceled
		)
	}

	/// Terminal states that can only be reached by actually running the job body.
	#[must_use]
	pub const fn is_finished(self) -> bool {
		matches!(self, Self::Completed | Self::Error | Self::Stopped)
	}

	#[must_use]
	pub const fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Idle, Self::Ready | Self::Canceled)
				| (Self::Ready, Self::InProgress | Self::Canceled)
				| (
					Self::InProgress,
					Self::Completed | Self::Error | Self::Stopped
				)
		)
	}
}

impl fmt::Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Idle => "idle",
			Self::Ready => "ready",
			Self::InProgress => "inProgress",
			Self::Completed => "completed",
			Self::Error => "error",
			Self::Stopped => "stopped",
			Self::Canceled => "canceled",
		})
	}
}

/// A trait that represents any kind of output that a job can return.
///
/// The user will downcast it to the concrete type that the job body returns.
pub trait AnyJobOutput: Send + Downcast + 'static {}

impl fmt::Debug for Box<dyn AnyJobOutput> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<AnyJobOutput>")
	}
}

impl_downcast!(AnyJobOutput);

/// Blanket implementation for all types that implements `Send + 'static`
impl<T: Send + 'static> AnyJobOutput for T {}

/// A helper trait to convert any type that implements [`AnyJobOutput`] into a [`JobOutput`], boxing it.
pub trait IntoAnyJobOutput {
	fn into_output(self) -> JobOutput;
}

impl<T: AnyJobOutput + 'static> IntoAnyJobOutput for T {
	fn into_output(self) -> JobOutput {
		JobOutput::Out(Box::new(self))
	}
}

#[derive(Debug)]
pub enum JobOutput {
	Out(Box<dyn AnyJobOutput>),
	Empty,
}

impl From<()> for JobOutput {
	fn from((): ()) -> Self {
		Self::Empty
	}
}

/// How a [`Work::run`] call ended when it didn't fail.
#[derive(Debug)]
pub enum ExecStatus {
	Done(JobOutput),
	/// The body honored a stop request before finishing.
	Stopped,
}

/// The actual long-running operation of a job, e.g. a request to a generation backend.
///
/// It is run at most once. Stopping is cooperative: the body decides at which points it checks the
/// [`Stopper`], and returns [`ExecStatus::Stopped`] when it gives up.
#[async_trait]
pub trait Work: Send + 'static {
	async fn run(&mut self, stopper: &Stopper) -> Result<ExecStatus, JobError>;
}

/// Handed to a running [`Work`] so it can find out that a stop was requested.
///
/// Once requested, a stop stays requested.
#[derive(Debug, Clone)]
pub struct Stopper(chan::Receiver<()>);

impl Stopper {
	#[must_use]
	pub fn check_stop(&self) -> bool {
		self.0.is_closed()
	}
}

pin_project_lite::pin_project! {
	/// Resolves as soon as a stop is requested for the job.
	#[must_use = "`StopFuture` does nothing unless polled"]
	pub struct StopFuture<'recv> {
		#[pin]
		fut: chan::Recv<'recv, ()>,
	}
}

impl Future for StopFuture<'_> {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		// Nothing is ever sent on this channel, closing it is the signal
		self.project().fut.poll(cx).map(|_| ())
	}
}

impl<'recv> IntoFuture for &'recv Stopper {
	type Output = ();
	type IntoFuture = StopFuture<'recv>;

	fn into_future(self) -> Self::IntoFuture {
		StopFuture { fut: self.0.recv() }
	}
}

/// A unit of asynchronous work admitted into the [`Scheduler`](crate::Scheduler).
///
/// The job owns its state and its body, and is shared (`Arc`) between the caller, the active queue
/// and the history. Every state change is broadcasted to the job's observers, in order.
pub struct Job {
	id: JobId,
	state: Mutex<JobState>,
	events_tx: broadcast::Sender<JobState>,
	stop_tx: chan::Sender<()>,
	stopper: Stopper,
	work: Mutex<Option<Box<dyn Work>>>,
	output: Mutex<Option<JobOutput>>,
	failure: Mutex<Option<JobError>>,
}

impl fmt::Debug for Job {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Job")
			.field("id", &self.id)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

impl Job {
	#[must_use]
	pub fn new(work: impl Work) -> Arc<Self> {
		Self::with_id(JobId::new_v4(), work)
	}

	#[must_use]
	pub fn with_id(id: JobId, work: impl Work) -> Arc<Self> {
		let (events_tx, _) = broadcast::channel(JOB_EVENTS_CAPACITY);
		let (stop_tx, stop_rx) = chan::bounded(1);

		Arc::new(Self {
			id,
			state: Mutex::new(JobState::Idle),
			events_tx,
			stop_tx,
			stopper: Stopper(stop_rx),
			work: Mutex::new(Some(Box::new(work))),
			output: Mutex::new(None),
			failure: Mutex::new(None),
		})
	}

	#[must_use]
	pub const fn id(&self) -> JobId {
		self.id
	}

	#[must_use]
	pub fn state(&self) -> JobState {
		*lock(&self.state)
	}

	/// Observe every state change from now on. Each receiver is independent from the others.
	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<JobState> {
		self.events_tx.subscribe()
	}

	/// Output of a completed job, it can only be taken once.
	#[must_use]
	pub fn take_output(&self) -> Option<JobOutput> {
		lock(&self.output).take()
	}

	/// Why the job ended up in the `error` state.
	#[must_use]
	pub fn failure(&self) -> Option<String> {
		lock(&self.failure).as_ref().map(ToString::to_string)
	}

	/// Begins running the job body in the background.
	///
	/// Only a job marked `ready` by the scheduler is started, for any other state this is a no-op
	/// returning `false`.
	///
	/// # Panics
	///
	/// Panics if the job body is missing, which only happens if the job was somehow started twice
	pub fn start(self: &Arc<Self>) -> bool {
		if !self.transition_from(&[JobState::Ready], JobState::InProgress) {
			return false;
		}

		let mut work = lock(&self.work)
			.take()
			.expect("job body can only be taken once, on the ready -> inProgress transition");

		spawn({
			let this = Arc::clone(self);

			async move {
				let res = AssertUnwindSafe(work.run(&this.stopper))
					.catch_unwind()
					.await;

				let next = match res {
					Ok(Ok(ExecStatus::Done(output))) => {
						*lock(&this.output) = Some(output);
						JobState::Completed
					}
					Ok(Ok(ExecStatus::Stopped)) => JobState::Stopped,
					Ok(Err(e)) => {
						warn!(job_id = %this.id, ?e, "Job failed;");
						*lock(&this.failure) = Some(e);
						JobState::Error
					}
					Err(_) => {
						error!(job_id = %this.id, "Job body panicked");
						*lock(&this.failure) = Some(JobError::Panicked);
						JobState::Error
					}
				};

				this.transition(next);
			}
			.in_current_span()
		});

		true
	}

	/// Request the running job body to halt. Only has effect while the job is `inProgress`.
	pub fn stop(&self) -> bool {
		let state = lock(&self.state);

		if *state != JobState::InProgress {
			trace!(job_id = %self.id, state = %*state, "Job is not in progress, ignoring stop");
			return false;
		}

		if self.stop_tx.close() {
			trace!(job_id = %self.id, "Stop requested");
		} else {
			trace!(job_id = %self.id, "Stop was already requested");
		}

		true
	}

	pub(crate) fn try_mark_ready(&self) -> bool {
		self.transition_from(&[JobState::Idle], JobState::Ready)
	}

	/// Cancel a job that didn't start running yet.
	pub(crate) fn cancel(&self) -> bool {
		self.transition_from(&[JobState::Idle, JobState::Ready], JobState::Canceled)
	}

	fn transition_from(&self, expected: &[JobState], next: JobState) -> bool {
		let mut state = lock(&self.state);

		if !expected.contains(&*state) {
			trace!(job_id = %self.id, current = %*state, %next, "Skipping job transition");
			return false;
		}

		self.apply(&mut state, next);

		true
	}

	fn transition(&self, next: JobState) {
		self.apply(&mut lock(&self.state), next);
	}

	fn apply(&self, state: &mut JobState, next: JobState) {
		assert!(
			!state.is_terminal(),
			"job <id='{}'> is already {state} and can't become {next}",
			self.id
		);
		assert!(
			state.can_transition_to(next),
			"invalid job transition <id='{}'>: {state} -> {next}",
			self.id
		);

		trace!(job_id = %self.id, from = %*state, to = %next, "Job state transition");
		*state = next;

		// Sent while holding the state lock, so observers see a job's transitions in order
		if self.events_tx.send(next).is_err() {
			trace!(job_id = %self.id, "No observers for job state change");
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
