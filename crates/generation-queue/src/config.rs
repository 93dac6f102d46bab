use std::{
	fs,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::Error;

const CONFIG_FILE_NAME: &str = "generation_queue.json";

/// Scheduler configuration stored in the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// Bound of the runner message channel
	pub messages_capacity: usize,
	/// How many change notifications an observer can fall behind before missing some
	pub notifications_capacity: usize,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			messages_capacity: 16,
			notifications_capacity: 64,
		}
	}
}

impl SchedulerConfig {
	#[must_use]
	pub fn config_path(data_dir: impl AsRef<Path>) -> PathBuf {
		data_dir.as_ref().join(CONFIG_FILE_NAME)
	}

	/// Load the config from the data directory, creating a default one if it doesn't exist
	pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, Error> {
		let data_dir = data_dir.as_ref();
		let config_path = Self::config_path(data_dir);

		if config_path.exists() {
			let json =
				fs::read_to_string(&config_path).map_err(|e| Error::config_io(&config_path, e))?;

			Ok(serde_json::from_str(&json)?)
		} else {
			debug!(path = %config_path.display(), "No scheduler config found, creating default one");

			let config = Self::default();
			config.save(data_dir)?;

			Ok(config)
		}
	}

	pub fn save(&self, data_dir: impl AsRef<Path>) -> Result<(), Error> {
		let data_dir = data_dir.as_ref();

		fs::create_dir_all(data_dir).map_err(|e| Error::config_io(data_dir, e))?;

		let config_path = Self::config_path(data_dir);

		fs::write(&config_path, serde_json::to_string_pretty(self)?)
			.map_err(|e| Error::config_io(&config_path, e))
	}
}
