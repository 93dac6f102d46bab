//!
//! # Generation Queue
//!
//! A single-concurrency scheduler for generation jobs: requests to an image-generation backend that
//! take a long time and must never run in parallel with each other.
//!
//! Jobs are admitted into a FIFO active queue and dispatched one at a time, in admission order. Each
//! job goes through a small state machine (`idle → ready → inProgress → completed | error | stopped`,
//! or `canceled` before it runs) and every admitted job is mirrored into a history that outlives the
//! active queue. Observers get notified of any change through a [`Notifier`] subscription.
//!
//! ## Basic example
//!
//! ```
//! use sd_generation_queue::{
//! 	ExecStatus, Job, JobError, JobOutput, JobState, Scheduler, SchedulerConfig, Stopper, Work,
//! };
//! use async_trait::async_trait;
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Work for Noop {
//! 	async fn run(&mut self, _stopper: &Stopper) -> Result<ExecStatus, JobError> {
//! 		Ok(ExecStatus::Done(JobOutput::Empty))
//! 	}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//! 	let scheduler = Scheduler::new(&SchedulerConfig::default());
//!
//! 	let job = Job::new(Noop);
//! 	let mut states = job.subscribe();
//!
//! 	scheduler.admit(job.clone()).await.unwrap();
//!
//! 	while let Ok(state) = states.recv().await {
//! 		if state.is_terminal() {
//! 			break;
//! 		}
//! 	}
//!
//! 	assert_eq!(job.state(), JobState::Completed);
//! 	assert_eq!(scheduler.history().completed().await.len(), 1);
//!
//! 	scheduler.shutdown().await;
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod error;
mod history;
mod job;
mod message;
mod notifier;
mod runner;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::{Error, JobError};
pub use history::History;
pub use job::{
	AnyJobOutput, ExecStatus, IntoAnyJobOutput, Job, JobId, JobOutput, JobState, StopFuture,
	Stopper, Work,
};
pub use notifier::{Change, Notifier, Subscription};
pub use scheduler::Scheduler;
