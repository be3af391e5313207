use std::{
	fs,
	io::{self, Read, Write},
	path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 256 * 1024; // 256KB

#[derive(Debug, Error)]
pub enum CopyError {
	#[error("destination already exists: {0}")]
	AlreadyExists(PathBuf),

	#[error("I/O error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

#[derive(Debug, Clone)]
pub struct CopyResult {
	pub bytes_copied: u64,
	pub content_hash: String,
}

/// Stream `source` into a new file at `dest_path`, hashing what was read.
///
/// The destination is opened create-new, so an existing file is never
/// touched and a concurrent writer that got there first wins. A partially
/// written file is removed before the error is returned.
/// This is synchronous and should run on spawn_blocking.
pub fn copy_new(source: &mut dyn Read, dest_path: &Path) -> Result<CopyResult, CopyError> {
	let mut dest = match fs::OpenOptions::new().write(true).create_new(true).open(dest_path) {
		Ok(f) => f,
		Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
			return Err(CopyError::AlreadyExists(dest_path.to_path_buf()));
		}
		Err(e) => return Err(io_error(dest_path, e)),
	};

	let result = write_hashed(source, &mut dest, dest_path);
	drop(dest);

	if result.is_err() {
		if let Err(e) = fs::remove_file(dest_path) {
			warn!("failed to remove partial copy {}: {e}", dest_path.display());
		}
	}
	result
}

fn write_hashed(source: &mut dyn Read, dest: &mut fs::File, dest_path: &Path) -> Result<CopyResult, CopyError> {
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; CHUNK_SIZE];
	let mut bytes_copied: u64 = 0;

	loop {
		let n = match source.read(&mut buf) {
			Ok(0) => break,
			Ok(n) => n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			// A read failure is reported against the destination it was meant for.
			Err(e) => return Err(io_error(dest_path, e)),
		};

		hasher.update(&buf[..n]);
		dest.write_all(&buf[..n]).map_err(|e| io_error(dest_path, e))?;
		bytes_copied += n as u64;
	}

	dest.flush().map_err(|e| io_error(dest_path, e))?;
	dest.sync_all().map_err(|e| io_error(dest_path, e))?;

	// The destination was created empty by us, so the stream hash is the
	// stored file's hash; no read-back pass.
	let content_hash = hasher.finalize().to_hex().to_string();
	debug!(bytes = bytes_copied, hash = %content_hash, "copied {}", dest_path.display());
	Ok(CopyResult { bytes_copied, content_hash })
}

fn io_error(path: &Path, source: io::Error) -> CopyError {
	CopyError::Io { path: path.to_path_buf(), source }
}
