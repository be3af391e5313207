use std::{
	fs,
	io::{self, Read},
	path::{Component, Path, PathBuf},
};

use tracing::{debug, error, info};

use crate::{
	engine::copier::{self, CopyError},
	error::AssetError,
	models::asset::{AssetKind, BUNDLED_SCENE_EXTENSIONS},
};

/// Owner of the kind-partitioned directory tree that holds ingested files.
///
/// Cheap to clone. All methods do blocking filesystem work; async callers
/// run them on `spawn_blocking`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetStore {
	root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
	Stored { path: PathBuf, bytes: u64, content_hash: String },
	/// A file with this name was already present and was left untouched.
	Skipped(PathBuf),
}

impl CopyOutcome {
	pub fn path(&self) -> &Path {
		match self {
			CopyOutcome::Stored { path, .. } | CopyOutcome::Skipped(path) => path,
		}
	}
}

impl AssetStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		AssetStore { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn directory(&self, kind: AssetKind) -> PathBuf {
		match kind.policy().subdirectory {
			Some(sub) => self.root.join(sub),
			None => self.root.clone(),
		}
	}

	/// Create the kind's directory if absent.
	pub fn ensure_directory(&self, kind: AssetKind) -> Result<PathBuf, AssetError> {
		let dir = self.directory(kind);
		if dir.is_dir() {
			return Ok(dir);
		}
		match fs::create_dir_all(&dir) {
			Ok(()) => {
				info!(%kind, "created {}", dir.display());
				Ok(dir)
			}
			Err(e) => {
				error!(%kind, "cannot create {}: {e}", dir.display());
				Err(AssetError::StorageUnavailable { kind, cause: e.to_string() })
			}
		}
	}

	/// Pure: where a file named `file_name` of `kind` lives in the store.
	pub fn destination_path(&self, kind: AssetKind, file_name: &str) -> PathBuf {
		self.directory(kind).join(file_name)
	}

	pub fn exists(&self, path: &Path) -> bool {
		path.exists()
	}

	/// Validate `file_name` against the kind's allow-list, make sure the
	/// kind's directory exists and return where the file would be stored.
	pub fn prepare_destination(&self, kind: AssetKind, file_name: &str) -> Result<PathBuf, AssetError> {
		let file_name = checked_file_name(file_name)?;
		if !kind.accepts(Path::new(file_name)) {
			return Err(AssetError::UnsupportedType { kind, name: file_name.to_string() });
		}
		self.ensure_directory(kind)?;
		Ok(self.destination_path(kind, file_name))
	}

	/// Copy `source` into the store under `file_name`. First write wins: an
	/// existing file of the same name is kept and the copy is skipped.
	pub fn copy_into(&self, kind: AssetKind, source: &mut dyn Read, file_name: &str) -> Result<CopyOutcome, AssetError> {
		let dest = self.prepare_destination(kind, file_name)?;
		if self.exists(&dest) {
			debug!(%kind, "already stored, skipping {}", dest.display());
			return Ok(CopyOutcome::Skipped(dest));
		}

		match copier::copy_new(source, &dest) {
			Ok(result) => Ok(CopyOutcome::Stored {
				path: dest,
				bytes: result.bytes_copied,
				content_hash: result.content_hash,
			}),
			// Lost a race with another writer between the check and the open.
			Err(CopyError::AlreadyExists(path)) => Ok(CopyOutcome::Skipped(path)),
			Err(CopyError::Io { path, source }) => Err(AssetError::copy_failed(path, source)),
		}
	}

	/// Write an in-memory payload under its reported name.
	pub fn write_payload(&self, kind: AssetKind, bytes: &[u8], file_name: &str) -> Result<CopyOutcome, AssetError> {
		let mut reader = bytes;
		self.copy_into(kind, &mut reader, file_name)
	}

	/// Delete a stored asset. The catalog only reflects this after a rescan.
	pub fn remove(&self, kind: AssetKind, file_name: &str) -> Result<(), AssetError> {
		let file_name = checked_file_name(file_name)?;
		let path = self.destination_path(kind, file_name);
		match fs::remove_file(&path) {
			Ok(()) => {
				info!(%kind, "removed {}", path.display());
				Ok(())
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(AssetError::copy_failed(path, e)),
		}
	}
}

/// Bundled `.usda`/`.usdc` scenes shipped next to the app. Read-only: they are
/// listed, never copied into the store.
pub fn bundled_scenes(dir: &Path) -> Vec<PathBuf> {
	let entries = match fs::read_dir(dir) {
		Ok(it) => it,
		Err(e) => {
			debug!("no bundled scenes in {}: {e}", dir.display());
			return Vec::new();
		}
	};

	let mut scenes: Vec<PathBuf> = entries
		.flatten()
		.map(|e| e.path())
		.filter(|p| p.is_file())
		.filter(|p| {
			p.extension()
				.and_then(|e| e.to_str())
				.is_some_and(|ext| BUNDLED_SCENE_EXTENSIONS.iter().any(|b| b.eq_ignore_ascii_case(ext)))
		})
		.collect();
	scenes.sort();
	scenes
}

/// Accept only a single, normal path component.
pub(crate) fn checked_file_name(name: &str) -> Result<&str, AssetError> {
	let mut components = Path::new(name).components();
	match (components.next(), components.next()) {
		(Some(Component::Normal(_)), None) => Ok(name),
		_ => Err(AssetError::InvalidName(name.to_string())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn layout_matches_kind_policy() {
		let store = AssetStore::new("/docs");
		assert_eq!(store.directory(AssetKind::Photo), PathBuf::from("/docs/Photo"));
		assert_eq!(store.directory(AssetKind::Video), PathBuf::from("/docs/Media"));
		assert_eq!(store.directory(AssetKind::Audio), PathBuf::from("/docs/Audio"));
		assert_eq!(store.directory(AssetKind::Model), PathBuf::from("/docs"));
		assert_eq!(
			store.destination_path(AssetKind::Video, "clip.mov"),
			PathBuf::from("/docs/Media/clip.mov")
		);
	}

	#[test]
	fn ensure_directory_is_lazy_and_idempotent() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());
		assert!(!tmp.path().join("Audio").exists());

		let dir = store.ensure_directory(AssetKind::Audio).unwrap();
		assert!(dir.is_dir());
		assert_eq!(store.ensure_directory(AssetKind::Audio).unwrap(), dir);
	}

	#[test]
	fn ensure_directory_fails_when_blocked_by_file() {
		let tmp = tempfile::tempdir().unwrap();
		fs::write(tmp.path().join("Photo"), "not a dir").unwrap();
		let store = AssetStore::new(tmp.path());

		let err = store.ensure_directory(AssetKind::Photo).unwrap_err();
		assert!(matches!(err, AssetError::StorageUnavailable { kind: AssetKind::Photo, .. }));
	}

	#[test]
	fn first_write_wins() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());

		let first = store.write_payload(AssetKind::Photo, b"first", "a.jpg").unwrap();
		let second = store.write_payload(AssetKind::Photo, b"second", "a.jpg").unwrap();

		assert!(matches!(first, CopyOutcome::Stored { bytes: 5, .. }));
		assert!(matches!(second, CopyOutcome::Skipped(_)));
		assert_eq!(fs::read(first.path()).unwrap(), b"first");
	}

	#[test]
	fn rejects_foreign_extension_and_traversal() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());

		let err = store.write_payload(AssetKind::Photo, b"x", "notes.txt").unwrap_err();
		assert!(matches!(err, AssetError::UnsupportedType { .. }));

		let err = store.write_payload(AssetKind::Photo, b"x", "../escape.jpg").unwrap_err();
		assert!(matches!(err, AssetError::InvalidName(_)));

		let err = store.write_payload(AssetKind::Photo, b"x", "").unwrap_err();
		assert!(matches!(err, AssetError::InvalidName(_)));
	}

	#[test]
	fn remove_is_idempotent() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());
		let out = store.write_payload(AssetKind::Model, b"usdz", "chair.usdz").unwrap();
		assert!(out.path().exists());

		store.remove(AssetKind::Model, "chair.usdz").unwrap();
		assert!(!out.path().exists());
		store.remove(AssetKind::Model, "chair.usdz").unwrap();
	}

	#[test]
	fn lists_bundled_scenes_only() {
		let tmp = tempfile::tempdir().unwrap();
		fs::write(tmp.path().join("BR.usda"), "").unwrap();
		fs::write(tmp.path().join("BACK.USDC"), "").unwrap();
		fs::write(tmp.path().join("chair.usdz"), "").unwrap();

		let scenes = bundled_scenes(tmp.path());
		let names: Vec<_> = scenes.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
		assert_eq!(names, vec!["BACK.USDC", "BR.usda"]);
		assert!(bundled_scenes(&tmp.path().join("missing")).is_empty());
	}
}
