use std::sync::Arc;

use tokio::sync::oneshot;

use super::{
	error::Error,
	job::{Job, JobId, JobState},
};

#[derive(Debug)]
pub(crate) enum RunnerMessage {
	Admit {
		job: Arc<Job>,
		ack: oneshot::Sender<Result<(), Error>>,
	},
	Cancel {
		job_id: JobId,
		ack: oneshot::Sender<bool>,
	},
	CancelAllIdle {
		ack: oneshot::Sender<Vec<JobId>>,
	},
	Stop {
		job_id: JobId,
		ack: oneshot::Sender<bool>,
	},
	ActiveJobs {
		ack: oneshot::Sender<Vec<Arc<Job>>>,
	},
	JobStateChanged {
		job_id: JobId,
		state: JobState,
	},
	/// Queued jobs may have been canceled from outside the runner.
	Reevaluate,
	Shutdown(oneshot::Sender<()>),
}
