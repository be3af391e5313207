use std::{path::PathBuf, sync::Arc};

use tracing::{info, warn};

use crate::{
	error::AssetError,
	models::{
		asset::AssetKind,
		source::{AccessGuard, Payload, SourceHandle},
	},
	store::{AssetStore, CopyOutcome},
};

#[derive(Debug)]
pub struct IngestFailure {
	/// Where the input came from, as the caller described it.
	pub source: String,
	pub error: AssetError,
}

/// Per-input results of one batch. A failed input never aborts the others.
#[derive(Debug, Default)]
pub struct IngestReport {
	pub stored: Vec<PathBuf>,
	/// Inputs whose destination name was already taken.
	pub skipped: Vec<PathBuf>,
	pub failed: Vec<IngestFailure>,
}

impl IngestReport {
	pub fn total(&self) -> usize {
		self.stored.len() + self.skipped.len() + self.failed.len()
	}

	fn record(&mut self, source: String, result: Result<CopyOutcome, AssetError>) {
		match result {
			Ok(CopyOutcome::Stored { path, bytes, content_hash }) => {
				info!(bytes, hash = %content_hash, "imported {source} as {}", path.display());
				self.stored.push(path);
			}
			Ok(CopyOutcome::Skipped(path)) => {
				info!("already stored, skipping {source} ({})", path.display());
				self.skipped.push(path);
			}
			Err(error) => {
				warn!(error_kind = error.kind_tag(), "import of {source} failed: {error}");
				self.failed.push(IngestFailure { source, error });
			}
		}
	}
}

/// Copy externally referenced files into the store, one at a time.
///
/// Each input holds scoped access only for the duration of its own copy.
pub async fn ingest_sources(store: &AssetStore, kind: AssetKind, sources: Vec<Arc<dyn SourceHandle>>) -> IngestReport {
	let mut report = IngestReport::default();

	for handle in sources {
		let description = handle.describe();
		let store = store.clone();
		let result = tokio::task::spawn_blocking(move || ingest_one(&store, kind, handle))
			.await
			.unwrap_or_else(|e| Err(AssetError::CopyFailed { path: PathBuf::new(), cause: format!("task join error: {e}") }));
		report.record(description, result);
	}

	report
}

fn ingest_one(store: &AssetStore, kind: AssetKind, handle: Arc<dyn SourceHandle>) -> Result<CopyOutcome, AssetError> {
	// Dropping the guard releases access, whichever way this returns.
	let guard = AccessGuard::acquire(handle.clone()).ok_or_else(|| AssetError::AccessDenied(handle.describe()))?;
	let source = guard.handle();

	let file_name = source.file_name().ok_or_else(|| AssetError::InvalidName(source.describe()))?;
	let dest = store.prepare_destination(kind, &file_name)?;
	if store.exists(&dest) {
		return Ok(CopyOutcome::Skipped(dest));
	}

	let mut reader = source.open().map_err(|e| AssetError::copy_failed(&dest, e))?;
	store.copy_into(kind, reader.as_mut(), &file_name)
}

/// Write library-picker payloads straight into the store under their
/// reported name, or a generated `<kind>_<ulid>.<ext>` when there is none.
/// Photo picks that do not decode as an image are rejected.
pub async fn ingest_payloads(store: &AssetStore, kind: AssetKind, payloads: Vec<Payload>) -> IngestReport {
	let mut report = IngestReport::default();

	for payload in payloads {
		let file_name = payload.file_name.clone().unwrap_or_else(|| generated_name(kind, &payload.fallback_extension));
		let description = format!("payload {file_name}");
		let store = store.clone();
		let result = tokio::task::spawn_blocking(move || {
			if kind == AssetKind::Photo {
				check_image(&file_name, &payload.bytes)?;
			}
			store.write_payload(kind, &payload.bytes, &file_name)
		})
		.await
		.unwrap_or_else(|e| Err(AssetError::CopyFailed { path: PathBuf::new(), cause: format!("task join error: {e}") }));
		report.record(description, result);
	}

	report
}

fn check_image(file_name: &str, bytes: &[u8]) -> Result<(), AssetError> {
	image::guess_format(bytes)
		.and_then(|format| image::load_from_memory_with_format(bytes, format))
		.map(|_| ())
		.map_err(|e| AssetError::Undecodable { name: file_name.to_string(), cause: e.to_string() })
}

fn generated_name(kind: AssetKind, extension: &str) -> String {
	let extension = extension.trim_start_matches('.');
	format!("{kind}_{}.{extension}", ulid::Ulid::new())
}

#[cfg(test)]
mod tests {
	use std::{
		fs,
		io::{self, Read},
		sync::atomic::{AtomicUsize, Ordering},
	};

	use image::RgbaImage;

	use super::*;
	use crate::models::source::LocalFile;

	fn png_bytes(edge: u32) -> Vec<u8> {
		let mut buf = Vec::new();
		RgbaImage::new(edge, edge).write_to(&mut io::Cursor::new(&mut buf), image::ImageOutputFormat::Png).unwrap();
		buf
	}

	struct Denied {
		released: AtomicUsize,
	}

	impl SourceHandle for Denied {
		fn file_name(&self) -> Option<String> {
			Some("denied.jpg".into())
		}
		fn start_access(&self) -> bool {
			false
		}
		fn stop_access(&self) {
			self.released.fetch_add(1, Ordering::SeqCst);
		}
		fn open(&self) -> io::Result<Box<dyn Read + Send>> {
			unreachable!("never opened without access")
		}
		fn describe(&self) -> String {
			"denied.jpg".into()
		}
	}

	/// Grants access, then fails to open; counts releases.
	struct Unreadable {
		released: AtomicUsize,
	}

	impl SourceHandle for Unreadable {
		fn file_name(&self) -> Option<String> {
			Some("locked.png".into())
		}
		fn start_access(&self) -> bool {
			true
		}
		fn stop_access(&self) {
			self.released.fetch_add(1, Ordering::SeqCst);
		}
		fn open(&self) -> io::Result<Box<dyn Read + Send>> {
			Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
		}
		fn describe(&self) -> String {
			"locked.png".into()
		}
	}

	#[tokio::test]
	async fn denied_input_does_not_stop_the_batch() {
		let tmp = tempfile::tempdir().unwrap();
		let inbox = tmp.path().join("inbox");
		fs::create_dir_all(&inbox).unwrap();
		fs::write(inbox.join("one.jpg"), "1").unwrap();
		fs::write(inbox.join("three.png"), "3").unwrap();
		let store = AssetStore::new(tmp.path().join("store"));

		let sources: Vec<Arc<dyn SourceHandle>> = vec![
			Arc::new(LocalFile::new(inbox.join("one.jpg"))),
			Arc::new(Denied { released: AtomicUsize::new(0) }),
			Arc::new(LocalFile::new(inbox.join("three.png"))),
		];
		let report = ingest_sources(&store, AssetKind::Photo, sources).await;

		assert_eq!(report.stored.len(), 2);
		assert_eq!(report.failed.len(), 1);
		assert!(matches!(report.failed[0].error, AssetError::AccessDenied(_)));
		assert!(store.destination_path(AssetKind::Photo, "one.jpg").exists());
		assert!(store.destination_path(AssetKind::Photo, "three.png").exists());
	}

	#[tokio::test]
	async fn access_is_released_after_a_failed_copy() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());
		let handle = Arc::new(Unreadable { released: AtomicUsize::new(0) });

		let report = ingest_sources(&store, AssetKind::Photo, vec![handle.clone() as Arc<dyn SourceHandle>]).await;

		assert!(matches!(report.failed[0].error, AssetError::CopyFailed { .. }));
		assert_eq!(handle.released.load(Ordering::SeqCst), 1);
		assert!(!store.destination_path(AssetKind::Photo, "locked.png").exists());
	}

	#[tokio::test]
	async fn same_name_is_stored_once() {
		let tmp = tempfile::tempdir().unwrap();
		fs::create_dir_all(tmp.path().join("a")).unwrap();
		fs::create_dir_all(tmp.path().join("b")).unwrap();
		fs::write(tmp.path().join("a/song.mp3"), "first").unwrap();
		fs::write(tmp.path().join("b/song.mp3"), "second").unwrap();
		let store = AssetStore::new(tmp.path().join("store"));

		let sources: Vec<Arc<dyn SourceHandle>> = vec![
			Arc::new(LocalFile::new(tmp.path().join("a/song.mp3"))),
			Arc::new(LocalFile::new(tmp.path().join("b/song.mp3"))),
		];
		let report = ingest_sources(&store, AssetKind::Audio, sources).await;

		assert_eq!(report.stored.len(), 1);
		assert_eq!(report.skipped.len(), 1);
		let kept = fs::read_to_string(store.destination_path(AssetKind::Audio, "song.mp3")).unwrap();
		assert_eq!(kept, "first");
	}

	#[tokio::test]
	async fn wrong_extension_is_rejected() {
		let tmp = tempfile::tempdir().unwrap();
		fs::write(tmp.path().join("notes.txt"), "x").unwrap();
		let store = AssetStore::new(tmp.path().join("store"));

		let report = ingest_sources(
			&store,
			AssetKind::Video,
			vec![Arc::new(LocalFile::new(tmp.path().join("notes.txt"))) as Arc<dyn SourceHandle>],
		)
		.await;

		assert!(matches!(report.failed[0].error, AssetError::UnsupportedType { kind: AssetKind::Video, .. }));
	}

	#[tokio::test]
	async fn anonymous_payloads_get_unique_names() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());

		let payloads = vec![Payload::anonymous("png", png_bytes(2)), Payload::anonymous(".png", png_bytes(3))];
		let report = ingest_payloads(&store, AssetKind::Photo, payloads).await;

		assert_eq!(report.stored.len(), 2);
		assert_ne!(report.stored[0], report.stored[1]);
		for path in &report.stored {
			let name = path.file_name().unwrap().to_str().unwrap();
			assert!(name.starts_with("photo_") && name.ends_with(".png"), "{name}");
		}
	}

	#[tokio::test]
	async fn undecodable_photo_pick_is_not_stored() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());

		let payloads = vec![Payload::named("fake.jpg", b"not a jpeg".to_vec()), Payload::named("real.png", png_bytes(4))];
		let report = ingest_payloads(&store, AssetKind::Photo, payloads).await;

		assert_eq!(report.stored.len(), 1);
		assert!(matches!(&report.failed[0].error, AssetError::Undecodable { name, .. } if name == "fake.jpg"));
		assert!(!store.destination_path(AssetKind::Photo, "fake.jpg").exists());
		assert!(store.destination_path(AssetKind::Photo, "real.png").exists());
	}

	#[tokio::test]
	async fn named_payloads_dedup_by_name() {
		let tmp = tempfile::tempdir().unwrap();
		let store = AssetStore::new(tmp.path());

		let payloads = vec![Payload::named("clip.mov", b"a".to_vec()), Payload::named("clip.mov", b"b".to_vec())];
		let report = ingest_payloads(&store, AssetKind::Video, payloads).await;

		assert_eq!(report.stored.len(), 1);
		assert_eq!(report.skipped.len(), 1);
		assert_eq!(report.total(), 2);
	}
}
