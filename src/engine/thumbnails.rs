use std::{
	collections::{HashMap, HashSet},
	path::Path,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use crate::{
	config::ThumbnailConfig,
	error::AssetError,
	models::asset::{AssetId, AssetKind, AssetRecord, Preview, Thumbnail, ThumbnailStrategy},
};

/// Produces a preview bitmap for one stored file.
///
/// The bundled [`ImageThumbnailer`] handles raster images; hosts with a
/// video frame extractor plug in their own implementation.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
	async fn generate(&self, path: &Path, kind: AssetKind, max_px: u32) -> Result<Thumbnail, AssetError>;
}

/// Decodes jpg/png with the `image` crate and downsamples to fit `max_px`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageThumbnailer;

#[async_trait]
impl Thumbnailer for ImageThumbnailer {
	async fn generate(&self, path: &Path, kind: AssetKind, max_px: u32) -> Result<Thumbnail, AssetError> {
		if kind != AssetKind::Photo {
			return Err(AssetError::ThumbnailFailed {
				path: path.to_path_buf(),
				cause: format!("no decoder for {kind} assets"),
			});
		}

		let path = path.to_path_buf();
		let err_path = path.clone();
		tokio::task::spawn_blocking(move || {
			let img = image::open(&path).map_err(|e| AssetError::ThumbnailFailed {
				path: path.clone(),
				cause: e.to_string(),
			})?;
			// `thumbnail` keeps the aspect ratio inside the bound.
			let image = img.thumbnail(max_px, max_px).to_rgba8();
			Ok(Thumbnail { image })
		})
		.await
		.map_err(|e| AssetError::ThumbnailFailed { path: err_path, cause: format!("task join error: {e}") })?
	}
}

/// Size and mtime of the file a bitmap was decoded from. A same-named file
/// whose size or mtime differs does not reuse the old bitmap.
type Stamp = (u64, DateTime<Utc>);

fn stamp_of(record: &AssetRecord) -> Stamp {
	(record.size, record.modified_at)
}

#[derive(Debug, Clone)]
enum CacheEntry {
	/// A generation is running. `done` flips to `true` once it settles.
	Pending { token: u64, done: watch::Receiver<bool> },
	Ready { stamp: Stamp, thumb: Arc<Thumbnail> },
	/// Stays failed until the next rescan asks again.
	Failed,
}

enum Claim {
	Hit(Arc<Thumbnail>),
	/// Someone else is generating; wait for them.
	Wait(watch::Receiver<bool>),
	/// We own the generation under this token.
	Owner(u64, watch::Sender<bool>),
}

/// In-memory previews keyed by asset identity.
pub struct ThumbnailCache {
	generator: Arc<dyn Thumbnailer>,
	max_px: u32,
	timeout: Duration,
	semaphore: Semaphore,
	next_token: AtomicU64,
	entries: Mutex<HashMap<AssetId, (AssetKind, CacheEntry)>>,
}

impl ThumbnailCache {
	pub fn new(generator: Arc<dyn Thumbnailer>, config: &ThumbnailConfig) -> Self {
		ThumbnailCache {
			generator,
			max_px: config.pixel_bound(),
			timeout: Duration::from_secs(config.timeout_secs),
			semaphore: Semaphore::new(config.max_concurrency.max(1)),
			next_token: AtomicU64::new(0),
			entries: Mutex::new(HashMap::new()),
		}
	}

	/// What is known right now, without generating anything.
	pub fn cached(&self, record: &AssetRecord) -> Option<Preview> {
		match record.kind.policy().thumbnail {
			ThumbnailStrategy::None => None,
			ThumbnailStrategy::RenderOnDemand => Some(Preview::RenderOnDemand(record.storage_path.clone())),
			ThumbnailStrategy::Bitmap => match self.entries.lock().get(&record.id) {
				Some((_, CacheEntry::Ready { stamp, thumb })) if *stamp == stamp_of(record) => {
					Some(Preview::Bitmap(thumb.clone()))
				}
				_ => None,
			},
		}
	}

	/// Return the cached bitmap or compute it once. Concurrent callers for the
	/// same asset share one generation. A failure or timeout is remembered and
	/// yields `None`; calling again (from a rescan) retries.
	pub async fn get_or_generate(&self, record: &AssetRecord) -> Option<Preview> {
		if record.kind.policy().thumbnail != ThumbnailStrategy::Bitmap {
			return self.cached(record);
		}

		let (token, done) = match self.claim(record) {
			Claim::Hit(thumb) => return Some(Preview::Bitmap(thumb)),
			Claim::Wait(mut done) => {
				// An owner that vanished without settling leaves nothing cached.
				let _ = done.wait_for(|settled| *settled).await;
				return self.cached(record);
			}
			Claim::Owner(token, done) => (token, done),
		};

		let generated = self.generate(record).await;
		let preview = self.settle(record, token, generated);
		done.send_replace(true);
		preview
	}

	fn claim(&self, record: &AssetRecord) -> Claim {
		let mut entries = self.entries.lock();
		match entries.get(&record.id) {
			Some((_, CacheEntry::Ready { stamp, thumb })) if *stamp == stamp_of(record) => {
				return Claim::Hit(thumb.clone());
			}
			// A dropped sender means the owning task died; take over.
			Some((_, CacheEntry::Pending { done, .. })) if done.has_changed().is_ok() => {
				return Claim::Wait(done.clone());
			}
			_ => {}
		}

		let token = self.next_token.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = watch::channel(false);
		entries.insert(record.id.clone(), (record.kind, CacheEntry::Pending { token, done: rx }));
		Claim::Owner(token, tx)
	}

	async fn generate(&self, record: &AssetRecord) -> Result<Thumbnail, AssetError> {
		let _permit = self.semaphore.acquire().await.map_err(|e| AssetError::ThumbnailFailed {
			path: record.storage_path.clone(),
			cause: e.to_string(),
		})?;

		tokio::time::timeout(self.timeout, self.generator.generate(&record.storage_path, record.kind, self.max_px))
			.await
			.unwrap_or_else(|_| {
				Err(AssetError::ThumbnailFailed {
					path: record.storage_path.clone(),
					cause: format!("timed out after {:?}", self.timeout),
				})
			})
	}

	/// Store the outcome, unless the pending entry was pruned or replaced
	/// while generating. A late result for a removed asset is dropped.
	fn settle(&self, record: &AssetRecord, token: u64, generated: Result<Thumbnail, AssetError>) -> Option<Preview> {
		let mut entries = self.entries.lock();
		let still_ours = matches!(
			entries.get(&record.id),
			Some((_, CacheEntry::Pending { token: t, .. })) if *t == token
		);
		if !still_ours {
			debug!(id = %record.id, "asset changed while generating, dropping thumbnail");
			return None;
		}

		match generated {
			Ok(thumb) => {
				debug!(id = %record.id, width = thumb.width(), height = thumb.height(), "thumbnail ready");
				let thumb = Arc::new(thumb);
				let entry = CacheEntry::Ready { stamp: stamp_of(record), thumb: thumb.clone() };
				entries.insert(record.id.clone(), (record.kind, entry));
				Some(Preview::Bitmap(thumb))
			}
			Err(e) => {
				warn!(id = %record.id, error = %e, "thumbnail unavailable, using placeholder");
				entries.insert(record.id.clone(), (record.kind, CacheEntry::Failed));
				None
			}
		}
	}

	/// Drop entries of `kind` whose asset vanished from the latest scan.
	pub fn retain(&self, kind: AssetKind, live: &HashSet<AssetId>) {
		self.entries.lock().retain(|id, (k, _)| *k != kind || live.contains(id));
	}

	pub fn is_failed(&self, id: &AssetId) -> bool {
		matches!(self.entries.lock().get(id), Some((_, CacheEntry::Failed)))
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
