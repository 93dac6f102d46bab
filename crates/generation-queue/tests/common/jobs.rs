use std::{
	future::IntoFuture,
	sync::{Arc, Mutex},
};

use sd_generation_queue::{ExecStatus, IntoAnyJobOutput, JobError, JobOutput, Stopper, Work};

use async_channel as chan;
use async_trait::async_trait;
use tracing::info;

/// Completes right away without output
#[derive(Debug, Default)]
pub struct ReadyWork;

#[async_trait]
impl Work for ReadyWork {
	async fn run(&mut self, _stopper: &Stopper) -> Result<ExecStatus, JobError> {
		Ok(ExecStatus::Done(JobOutput::Empty))
	}
}

/// Completes right away, outputting its value
#[derive(Debug)]
pub struct OutputWork(pub String);

#[async_trait]
impl Work for OutputWork {
	async fn run(&mut self, _stopper: &Stopper) -> Result<ExecStatus, JobError> {
		Ok(ExecStatus::Done(self.0.clone().into_output()))
	}
}

/// Pushes its index on a shared log when it runs
#[derive(Debug)]
pub struct OrderedWork {
	pub idx: usize,
	pub log: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Work for OrderedWork {
	async fn run(&mut self, _stopper: &Stopper) -> Result<ExecStatus, JobError> {
		self.log.lock().expect("log lock").push(self.idx);
		Ok(ExecStatus::Done(JobOutput::Empty))
	}
}

#[derive(Debug, Default)]
pub struct BogusWork;

#[async_trait]
impl Work for BogusWork {
	async fn run(&mut self, _stopper: &Stopper) -> Result<ExecStatus, JobError> {
		Err(JobError::Failed("bogus generation".to_string()))
	}
}

#[derive(Debug, Default)]
pub struct PanicWork;

#[async_trait]
impl Work for PanicWork {
	async fn run(&mut self, _stopper: &Stopper) -> Result<ExecStatus, JobError> {
		panic!("generation backend exploded");
	}
}

/// Never finishes on its own, only when stopped
#[derive(Debug, Default)]
pub struct NeverWork;

#[async_trait]
impl Work for NeverWork {
	async fn run(&mut self, stopper: &Stopper) -> Result<ExecStatus, JobError> {
		stopper.await;
		info!("NeverWork stopped");
		Ok(ExecStatus::Stopped)
	}
}

/// Finishes when signaled, or stops if requested before that
#[derive(Debug)]
pub struct WaitSignalWork {
	signal_rx: chan::Receiver<()>,
}

impl WaitSignalWork {
	pub fn new() -> (Self, chan::Sender<()>) {
		let (signal_tx, signal_rx) = chan::bounded(1);
		(Self { signal_rx }, signal_tx)
	}
}

#[async_trait]
impl Work for WaitSignalWork {
	async fn run(&mut self, stopper: &Stopper) -> Result<ExecStatus, JobError> {
		tokio::select! {
			res = self.signal_rx.recv() => {
				res.map_err(JobError::other)?;
				Ok(ExecStatus::Done(JobOutput::Empty))
			}
			() = stopper.into_future() => Ok(ExecStatus::Stopped),
		}
	}
}

/// Ignores stop requests, only finishes when signaled
#[derive(Debug)]
pub struct StubbornWork {
	signal_rx: chan::Receiver<()>,
}

impl StubbornWork {
	pub fn new() -> (Self, chan::Sender<()>) {
		let (signal_tx, signal_rx) = chan::bounded(1);
		(Self { signal_rx }, signal_tx)
	}
}

#[async_trait]
impl Work for StubbornWork {
	async fn run(&mut self, stopper: &Stopper) -> Result<ExecStatus, JobError> {
		self.signal_rx.recv().await.map_err(JobError::other)?;
		info!(stop_requested = stopper.check_stop(), "StubbornWork done anyway");
		Ok(ExecStatus::Done(JobOutput::Empty))
	}
}
