use std::{error::Error as StdError, path::Path};

use thiserror::Error;

use super::job::{JobId, JobState};

#[derive(Debug, Error)]
pub enum Error {
	#[error("job already admitted <id='{0}'>")]
	AlreadyAdmitted(JobId),
	#[error("only idle jobs can be admitted <id='{id}', state='{state}'>")]
	NotIdle { id: JobId, state: JobState },
	#[error("history entry not found <index='{index}', len='{len}'>")]
	HistoryIndexOutOfBounds { index: usize, len: usize },

	#[error("config file I/O error: {source}; path: '{}'", .path.display())]
	ConfigIO {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to (de)serialize config: {0}")]
	ConfigSerde(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn config_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
		Self::ConfigIO {
			path: path.as_ref().into(),
			source,
		}
	}
}

/// The failure a job body reports back, it ends up as the `error` state of the job.
#[derive(Debug, Error)]
pub enum JobError {
	#[error("job body panicked while running")]
	Panicked,
	#[error("{0}")]
	Failed(String),
	#[error(transparent)]
	Other(Box<dyn StdError + Send + Sync>),
}

impl JobError {
	pub fn other(e: impl StdError + Send + Sync + 'static) -> Self {
		Self::Other(Box::new(e))
	}
}
