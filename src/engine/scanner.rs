use std::{path::Path, time::SystemTime};

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use crate::{
	error::AssetError,
	models::asset::{AssetKind, AssetRecord},
	store::AssetStore,
};

#[derive(Debug, Clone)]
pub struct ScanResult {
	pub records: Vec<AssetRecord>,
	/// Entries that could not be read or are symlinks.
	pub skipped_entries: u64,
}

/// List the kind's directory and build one record per allow-listed file.
///
/// Full listing every call; the result replaces whatever the catalog held.
pub async fn scan_kind(store: &AssetStore, kind: AssetKind) -> Result<ScanResult, AssetError> {
	let dir = store.directory(kind);
	let (records, skipped) = tokio::task::spawn_blocking(move || walk_kind(&dir, kind))
		.await
		.map_err(|e| AssetError::ScanFailed { kind, cause: format!("task join error: {e}") })??;

	Ok(ScanResult { records, skipped_entries: skipped })
}

fn walk_kind(dir: &Path, kind: AssetKind) -> Result<(Vec<AssetRecord>, u64), AssetError> {
	if !dir.exists() {
		return Err(AssetError::ScanFailed { kind, cause: format!("{} does not exist", dir.display()) });
	}
	if !dir.is_dir() {
		return Err(AssetError::ScanFailed { kind, cause: format!("{} is not a directory", dir.display()) });
	}

	let mut records = Vec::new();
	let mut skipped = 0u64;

	// Depth 1 only: the model kind lives in the store root next to the other
	// kinds' directories.
	for result in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
		let entry = match result {
			Ok(e) => e,
			Err(_) => {
				skipped += 1;
				continue;
			}
		};

		if entry.file_type().is_dir() {
			continue;
		}
		if entry.file_type().is_symlink() {
			skipped += 1;
			continue;
		}
		if !kind.accepts(entry.path()) {
			debug!(%kind, "ignoring {}", entry.path().display());
			continue;
		}

		let metadata = match entry.metadata() {
			Ok(m) => m,
			Err(_) => {
				skipped += 1;
				continue;
			}
		};

		let modified: DateTime<Utc> = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH).into();
		match AssetRecord::from_stored(kind, entry.into_path(), metadata.len(), modified) {
			Some(record) => records.push(record),
			None => skipped += 1,
		}
	}

	records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
	Ok((records, skipped))
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	fn setup_store(root: &Path) {
		fs::create_dir_all(root.join("Photo/nested")).unwrap();
		fs::write(root.join("Photo/b.png"), "png").unwrap();
		fs::write(root.join("Photo/a.JPG"), "jpeg!").unwrap();
		fs::write(root.join("Photo/x.txt"), "text").unwrap();
		fs::write(root.join("Photo/nested/deep.jpg"), "deep").unwrap();
		fs::write(root.join("chair.usdz"), "model").unwrap();
	}

	#[test]
	fn filters_by_kind_and_depth() {
		let tmp = tempfile::tempdir().unwrap();
		setup_store(tmp.path());

		let (records, skipped) = walk_kind(&tmp.path().join("Photo"), AssetKind::Photo).unwrap();

		assert_eq!(skipped, 0);
		let names: Vec<&str> = records.iter().map(|r| r.file_name.as_str()).collect();
		assert_eq!(names, vec!["a.JPG", "b.png"]);
		assert_eq!(records[0].size, 5);
		assert_eq!(records[0].display_name, "a");
	}

	#[test]
	fn model_scan_ignores_kind_directories() {
		let tmp = tempfile::tempdir().unwrap();
		setup_store(tmp.path());

		let (records, _) = walk_kind(tmp.path(), AssetKind::Model).unwrap();

		assert_eq!(records.len(), 1);
		assert_eq!(records[0].file_name, "chair.usdz");
		assert_eq!(records[0].kind, AssetKind::Model);
	}

	#[cfg(unix)]
	#[test]
	fn skips_symlinks() {
		let tmp = tempfile::tempdir().unwrap();
		setup_store(tmp.path());
		std::os::unix::fs::symlink(tmp.path().join("Photo/b.png"), tmp.path().join("Photo/link.png")).unwrap();

		let (records, skipped) = walk_kind(&tmp.path().join("Photo"), AssetKind::Photo).unwrap();

		assert_eq!(records.len(), 2); // symlink not counted as an asset
		assert_eq!(skipped, 1);
	}

	#[test]
	fn nonexistent_dir_errors() {
		let err = walk_kind(Path::new("/tmp/trove_definitely_not_real"), AssetKind::Audio).unwrap_err();
		assert!(matches!(err, AssetError::ScanFailed { kind: AssetKind::Audio, .. }));
	}

	#[tokio::test]
	async fn scan_is_idempotent() {
		let tmp = tempfile::tempdir().unwrap();
		setup_store(tmp.path());
		let store = AssetStore::new(tmp.path());

		let first = scan_kind(&store, AssetKind::Photo).await.unwrap();
		let second = scan_kind(&store, AssetKind::Photo).await.unwrap();

		assert_eq!(first.records, second.records);
	}
}
