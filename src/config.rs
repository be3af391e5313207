use std::{
	fs, io,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_DIR: &str = "Trove";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("no document root available on this system")]
	NoDocumentRoot,

	#[error("failed to read config {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to parse config {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
	/// Logical edge length of the square preview.
	pub size: u32,
	/// Pixel density multiplier applied to `size`.
	pub scale: u32,
	pub timeout_secs: u64,
	pub max_concurrency: usize,
}

impl ThumbnailConfig {
	pub fn pixel_bound(&self) -> u32 {
		self.size.saturating_mul(self.scale.max(1))
	}
}

impl Default for ThumbnailConfig {
	fn default() -> Self {
		ThumbnailConfig { size: 100, scale: 2, timeout_secs: 10, max_concurrency: 4 }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Store root. Resolved from the platform document directory when unset.
	pub root: Option<PathBuf>,
	/// Directory holding bundled `.usda`/`.usdc` scenes.
	pub bundle_dir: Option<PathBuf>,
	/// Log directory. Defaults to `<root>/logs`.
	pub log_dir: Option<PathBuf>,
	pub thumbnail: ThumbnailConfig,
}

impl Config {
	/// Load from `path`. A missing file yields the defaults; a malformed one is
	/// an error.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = match fs::read_to_string(path) {
			Ok(t) => t,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
			Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
		};
		toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
	}

	/// `<config dir>/Trove/config.toml`
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
	}

	pub fn resolve_root(&self) -> Result<PathBuf, ConfigError> {
		if let Some(root) = &self.root {
			return Ok(root.clone());
		}
		dirs::document_dir()
			.or_else(dirs::data_dir)
			.map(|d| d.join(APP_DIR))
			.ok_or(ConfigError::NoDocumentRoot)
	}

	pub fn resolve_log_dir(&self) -> Result<PathBuf, ConfigError> {
		match &self.log_dir {
			Some(dir) => Ok(dir.clone()),
			None => Ok(self.resolve_root()?.join("logs")),
		}
	}
}
