use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
	error::Error,
	request::{GeneratedImages, GenerationRequest, Txt2ImgResponse},
};

const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";
const INTERRUPT_PATH: &str = "/sdapi/v1/interrupt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
	pub base_url: String,
	/// Per request timeout, `0` disables it
	pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			base_url: "http://127.0.0.1:7860".to_string(),
			request_timeout_secs: 600,
		}
	}
}

/// Something that can turn a [`GenerationRequest`] into images.
///
/// `interrupt` aborts whatever generation the backend is currently busy with.
#[async_trait]
pub trait GenerationBackend: Send + Sync + 'static {
	async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImages, Error>;

	async fn interrupt(&self) -> Result<(), Error>;
}

/// HTTP client for a Stable Diffusion web UI compatible backend
#[derive(Debug, Clone)]
pub struct BackendClient {
	client: reqwest::Client,
	base_url: String,
}

impl BackendClient {
	pub fn new(config: &BackendConfig) -> Result<Self, Error> {
		let mut builder = reqwest::Client::builder();
		if config.request_timeout_secs > 0 {
			builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
		}

		Ok(Self {
			client: builder.build()?,
			base_url: config.base_url.trim_end_matches('/').to_string(),
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{path}", self.base_url)
	}
}

#[async_trait]
impl GenerationBackend for BackendClient {
	#[instrument(skip_all, fields(prompt = %request.prompt, batch_size = request.batch_size), err)]
	async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImages, Error> {
		let response = self
			.client
			.post(self.url(TXT2IMG_PATH))
			.json(request)
			.send()
			.await
			.and_then(Response::error_for_status)?
			.json::<Txt2ImgResponse>()
			.await?;

		let generated = GeneratedImages::try_from(response)?;

		debug!(images_count = generated.images.len(), "Generation done;");

		Ok(generated)
	}

	#[instrument(skip_all, err)]
	async fn interrupt(&self) -> Result<(), Error> {
		self.client
			.post(self.url(INTERRUPT_PATH))
			.send()
			.await
			.and_then(Response::error_for_status)?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn config_fills_missing_fields() {
		let config = serde_json::from_str::<BackendConfig>(r#"{"base_url": "http://gpu-box:7861"}"#)
			.expect("valid config");

		assert_eq!(config.base_url, "http://gpu-box:7861");
		assert_eq!(config.request_timeout_secs, 600);
	}

	#[test]
	fn urls_are_joined_without_double_slashes() {
		let client = BackendClient::new(&BackendConfig {
			base_url: "http://127.0.0.1:7860/".to_string(),
			request_timeout_secs: 0,
		})
		.expect("client built");

		assert_eq!(
			client.url(TXT2IMG_PATH),
			"http://127.0.0.1:7860/sdapi/v1/txt2img"
		);
	}
}
