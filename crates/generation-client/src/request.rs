use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::Error;

/// Parameters of a text to image generation, as the backend expects them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
	pub prompt: String,
	pub negative_prompt: String,
	pub steps: u32,
	pub width: u32,
	pub height: u32,
	/// `-1` lets the backend pick a random seed
	pub seed: i64,
	pub cfg_scale: f32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sampler_name: Option<String>,
	pub batch_size: u32,
}

impl Default for GenerationRequest {
	fn default() -> Self {
		Self {
			prompt: String::new(),
			negative_prompt: String::new(),
			steps: 20,
			width: 512,
			height: 512,
			seed: -1,
			cfg_scale: 7.0,
			sampler_name: None,
			batch_size: 1,
		}
	}
}

impl GenerationRequest {
	#[must_use]
	pub fn new(prompt: impl Into<String>) -> Self {
		Self {
			prompt: prompt.into(),
			..Default::default()
		}
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct Txt2ImgResponse {
	images: Vec<String>,
	#[serde(default)]
	info: String,
}

/// Output of a completed generation job
#[derive(Debug, Clone)]
pub struct GeneratedImages {
	/// Encoded image files, usually PNGs
	pub images: Vec<Vec<u8>>,
	/// Generation metadata reported by the backend (seed used, sampler, etc)
	pub info: serde_json::Value,
}

impl TryFrom<Txt2ImgResponse> for GeneratedImages {
	type Error = Error;

	fn try_from(Txt2ImgResponse { images, info }: Txt2ImgResponse) -> Result<Self, Self::Error> {
		if images.is_empty() {
			return Err(Error::NoImages);
		}

		let images = images
			.iter()
			.enumerate()
			.map(|(index, encoded)| {
				// Some backends hand out data URLs instead of plain base64
				let data = if encoded.starts_with("data:") {
					encoded.split_once(',').map_or(encoded.as_str(), |(_, data)| data)
				} else {
					encoded
				};

				BASE64_STANDARD
					.decode(data)
					.map_err(|source| Error::ImageDecode { index, source })
			})
			.collect::<Result<Vec<_>, _>>()?;

		let info = if info.trim().is_empty() {
			serde_json::Value::Null
		} else {
			serde_json::from_str(&info)?
		};

		Ok(Self { images, info })
	}
}
