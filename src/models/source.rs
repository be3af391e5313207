use std::{
	fs,
	io::{self, Read},
	path::{Path, PathBuf},
	sync::Arc,
};

/// A caller-supplied, possibly sandboxed location. Access must be acquired
/// before reading and released afterwards; [`AccessGuard`] pairs the two.
pub trait SourceHandle: Send + Sync {
	/// Name the file had at its origin. Used as the destination name.
	fn file_name(&self) -> Option<String>;

	/// Returns `false` when the platform refuses access.
	fn start_access(&self) -> bool;

	fn stop_access(&self);

	fn open(&self) -> io::Result<Box<dyn Read + Send>>;

	/// Human readable location for logs.
	fn describe(&self) -> String;
}

/// Releases scoped access on drop, so every exit path of an ingestion step
/// gives the access back.
pub struct AccessGuard {
	handle: Arc<dyn SourceHandle>,
}

impl AccessGuard {
	pub fn acquire(handle: Arc<dyn SourceHandle>) -> Option<Self> {
		if handle.start_access() {
			Some(AccessGuard { handle })
		} else {
			None
		}
	}

	pub fn handle(&self) -> &dyn SourceHandle {
		self.handle.as_ref()
	}
}

impl Drop for AccessGuard {
	fn drop(&mut self) {
		self.handle.stop_access();
	}
}

/// A plain file on the local filesystem. Access is always granted; read
/// failures surface when the copy opens it.
#[derive(Debug, Clone)]
pub struct LocalFile {
	path: PathBuf,
}

impl LocalFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		LocalFile { path: path.into() }
	}
}

impl SourceHandle for LocalFile {
	fn file_name(&self) -> Option<String> {
		self.path.file_name().and_then(|n| n.to_str()).map(str::to_string)
	}

	fn start_access(&self) -> bool {
		true
	}

	fn stop_access(&self) {}

	fn open(&self) -> io::Result<Box<dyn Read + Send>> {
		Ok(Box::new(fs::File::open(&self.path)?))
	}

	fn describe(&self) -> String {
		self.path.display().to_string()
	}
}

/// In-memory transferable picked from a photo or video library.
#[derive(Debug, Clone)]
pub struct Payload {
	/// Name reported by the picker, if any.
	pub file_name: Option<String>,
	/// Extension to use when the picker reports no name.
	pub fallback_extension: String,
	pub bytes: Vec<u8>,
}

impl Payload {
	pub fn named(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
		let file_name = file_name.into();
		let fallback_extension = Path::new(&file_name)
			.extension()
			.and_then(|e| e.to_str())
			.unwrap_or_default()
			.to_string();
		Payload { file_name: Some(file_name), fallback_extension, bytes }
	}

	pub fn anonymous(extension: impl Into<String>, bytes: Vec<u8>) -> Self {
		Payload { file_name: None, fallback_extension: extension.into(), bytes }
	}
}
