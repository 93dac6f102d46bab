use sd_generation_queue::JobError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("generation backend request failed: {0}")]
	Request(#[from] reqwest::Error),
	#[error("failed to decode generated image <index='{index}'>: {source}")]
	ImageDecode {
		index: usize,
		#[source]
		source: base64::DecodeError,
	},
	#[error("failed to parse generation info: {0}")]
	Info(#[from] serde_json::Error),
	#[error("generation backend returned no images")]
	NoImages,
}

impl From<Error> for JobError {
	fn from(e: Error) -> Self {
		Self::other(e)
	}
}
