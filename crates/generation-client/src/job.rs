use sd_generation_queue::{ExecStatus, IntoAnyJobOutput, Job, JobError, Stopper, Work};

use std::sync::Arc;

use async_trait::async_trait;
use futures_concurrency::future::Race;
use tracing::{error, trace};

use super::{
	client::GenerationBackend,
	error::Error,
	request::{GeneratedImages, GenerationRequest},
};

/// A single generation request bound to the backend that will serve it.
///
/// On success the job output is a [`GeneratedImages`].
pub struct GenerationWork {
	request: GenerationRequest,
	backend: Arc<dyn GenerationBackend>,
}

impl GenerationWork {
	pub fn new(request: GenerationRequest, backend: Arc<dyn GenerationBackend>) -> Self {
		Self { request, backend }
	}

	#[must_use]
	pub const fn request(&self) -> &GenerationRequest {
		&self.request
	}
}

enum RaceOutput {
	Generated(Result<GeneratedImages, Error>),
	StopRequested,
}

#[async_trait]
impl Work for GenerationWork {
	async fn run(&mut self, stopper: &Stopper) -> Result<ExecStatus, JobError> {
		let Self { request, backend } = &*self;

		let generate = async { RaceOutput::Generated(backend.generate(request).await) };
		let stop = async {
			stopper.await;
			RaceOutput::StopRequested
		};

		match (generate, stop).race().await {
			RaceOutput::Generated(Ok(generated)) => Ok(ExecStatus::Done(generated.into_output())),
			RaceOutput::Generated(Err(e)) => Err(e.into()),
			RaceOutput::StopRequested => {
				trace!("Stop requested, interrupting backend");
				// The request future is already gone, but the backend keeps working unless told otherwise
				if let Err(e) = backend.interrupt().await {
					error!(?e, "Failed to interrupt generation backend;");
				}
				Ok(ExecStatus::Stopped)
			}
		}
	}
}

/// Builds an idle job ready to be admitted into a `Scheduler`.
#[must_use]
pub fn generation_job(request: GenerationRequest, backend: Arc<dyn GenerationBackend>) -> Arc<Job> {
	Job::new(GenerationWork::new(request, backend))
}
