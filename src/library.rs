use std::{collections::HashSet, path::PathBuf, sync::Arc};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
	catalog::{Catalog, CatalogSnapshot, CatalogState},
	config::{Config, ConfigError, ThumbnailConfig},
	engine::{
		ingest::{self, IngestReport},
		scanner,
		thumbnails::{ImageThumbnailer, ThumbnailCache, Thumbnailer},
	},
	error::AssetError,
	models::{
		asset::{AssetKind, AssetRecord, Preview, ThumbnailStrategy},
		source::{Payload, SourceHandle},
	},
	store::{self, AssetStore},
};

/// Thumbnail work dispatched by a scan. Dropping this detaches the tasks;
/// `join` waits for all of them.
#[derive(Debug, Default)]
pub struct PendingThumbnails(Vec<JoinHandle<()>>);

impl PendingThumbnails {
	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub async fn join(self) {
		for handle in self.0 {
			// A panicking generator leaves that asset on its placeholder.
			let _ = handle.await;
		}
	}
}

#[derive(Debug)]
pub struct ScanOutcome {
	pub kind: AssetKind,
	pub records: usize,
	pub skipped_entries: u64,
	/// Set when the listing failed and the kind's view was reset.
	pub error: Option<AssetError>,
	pub thumbnails: PendingThumbnails,
}

impl ScanOutcome {
	fn failed(kind: AssetKind, error: AssetError) -> Self {
		ScanOutcome { kind, records: 0, skipped_entries: 0, error: Some(error), thumbnails: PendingThumbnails::default() }
	}
}

/// What a batch import did, plus the rescan that followed it.
#[derive(Debug)]
pub struct IngestOutcome {
	pub report: IngestReport,
	pub scan: ScanOutcome,
}

/// The presentation-facing entry point: one asset store, its catalog and
/// the thumbnail cache. Must be created inside a tokio runtime.
pub struct Library {
	store: AssetStore,
	catalog: Catalog,
	thumbnails: Arc<ThumbnailCache>,
	bundle_dir: Option<PathBuf>,
}

impl Library {
	pub fn open(config: &Config) -> Result<Self, ConfigError> {
		let root = config.resolve_root()?;
		let mut library = Library::with_thumbnailer(AssetStore::new(root), &config.thumbnail, Arc::new(ImageThumbnailer));
		library.bundle_dir = config.bundle_dir.clone();
		Ok(library)
	}

	pub fn with_thumbnailer(store: AssetStore, config: &ThumbnailConfig, generator: Arc<dyn Thumbnailer>) -> Self {
		Library {
			store,
			catalog: Catalog::spawn(),
			thumbnails: Arc::new(ThumbnailCache::new(generator, config)),
			bundle_dir: None,
		}
	}

	pub fn store(&self) -> &AssetStore {
		&self.store
	}

	pub fn list_assets(&self, kind: AssetKind) -> Vec<AssetRecord> {
		self.catalog.list(kind)
	}

	/// Case-insensitive substring match on the display name. An empty query
	/// lists everything.
	pub fn search(&self, kind: AssetKind, query: &str) -> Vec<AssetRecord> {
		let query = query.trim().to_lowercase();
		self.catalog
			.list(kind)
			.into_iter()
			.filter(|r| query.is_empty() || r.display_name.to_lowercase().contains(&query))
			.collect()
	}

	/// Cached preview only; never generates. See [`Library::load_thumbnail`].
	pub fn thumbnail(&self, record: &AssetRecord) -> Option<Preview> {
		self.thumbnails.cached(record)
	}

	/// Preview for `record`, generating it now if the cache has none. The
	/// catalog picks up a new bitmap as well.
	pub async fn load_thumbnail(&self, record: &AssetRecord) -> Option<Preview> {
		let preview = self.thumbnails.get_or_generate(record).await;
		if preview.is_some() && preview != record.thumbnail {
			self.catalog.set_preview(record.kind, record.id.clone(), preview.clone()).await;
		}
		preview
	}

	pub fn state(&self, kind: AssetKind) -> CatalogState {
		self.catalog.snapshot().state(kind)
	}

	pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
		self.catalog.subscribe()
	}

	pub fn bundled_scenes(&self) -> Vec<PathBuf> {
		match &self.bundle_dir {
			Some(dir) => store::bundled_scenes(dir),
			None => Vec::new(),
		}
	}

	/// Rebuild the catalog view of `kind` from disk and dispatch thumbnail
	/// generation for records that have none yet.
	pub async fn rescan(&self, kind: AssetKind) -> ScanOutcome {
		if let Err(e) = self.ensure_directory(kind).await {
			return ScanOutcome::failed(kind, e);
		}

		self.catalog.begin_scan(kind).await;
		let scan = match scanner::scan_kind(&self.store, kind).await {
			Ok(scan) => scan,
			Err(e) => {
				warn!(%kind, "scan failed, clearing view: {e}");
				self.catalog.reset(kind).await;
				return ScanOutcome::failed(kind, e);
			}
		};

		let live: HashSet<_> = scan.records.iter().map(|r| r.id.clone()).collect();
		self.thumbnails.retain(kind, &live);

		let mut records = scan.records;
		for record in &mut records {
			record.thumbnail = self.thumbnails.cached(record);
		}
		let wanted: Vec<AssetRecord> = records
			.iter()
			.filter(|r| r.thumbnail.is_none() && r.kind.policy().thumbnail == ThumbnailStrategy::Bitmap)
			.cloned()
			.collect();

		let count = records.len();
		self.catalog.replace(kind, records).await;
		info!(%kind, records = count, skipped = scan.skipped_entries, "catalog refreshed");

		ScanOutcome {
			kind,
			records: count,
			skipped_entries: scan.skipped_entries,
			error: None,
			thumbnails: self.dispatch_thumbnails(wanted),
		}
	}

	pub async fn rescan_all(&self) -> Vec<ScanOutcome> {
		let mut outcomes = Vec::with_capacity(AssetKind::ALL.len());
		for kind in AssetKind::ALL {
			outcomes.push(self.rescan(kind).await);
		}
		outcomes
	}

	/// Import external files, then rescan the kind.
	pub async fn ingest(&self, kind: AssetKind, sources: Vec<Arc<dyn SourceHandle>>) -> IngestOutcome {
		let report = match self.ensure_directory(kind).await {
			Ok(_) => ingest::ingest_sources(&self.store, kind, sources).await,
			Err(e) => unavailable_report(sources.iter().map(|s| s.describe()), &e),
		};
		let scan = self.rescan(kind).await;
		IngestOutcome { report, scan }
	}

	/// Import in-memory library picks, then rescan the kind.
	pub async fn ingest_payloads(&self, kind: AssetKind, payloads: Vec<Payload>) -> IngestOutcome {
		let report = match self.ensure_directory(kind).await {
			Ok(_) => ingest::ingest_payloads(&self.store, kind, payloads).await,
			Err(e) => unavailable_report(payloads.iter().map(|p| format!("payload {:?}", p.file_name)), &e),
		};
		let scan = self.rescan(kind).await;
		IngestOutcome { report, scan }
	}

	/// Delete the stored file behind `record`, then rescan its kind.
	pub async fn remove(&self, record: &AssetRecord) -> Result<ScanOutcome, AssetError> {
		let store = self.store.clone();
		let (kind, file_name) = (record.kind, record.file_name.clone());
		tokio::task::spawn_blocking(move || store.remove(kind, &file_name))
			.await
			.map_err(|e| AssetError::CopyFailed { path: record.storage_path.clone(), cause: format!("task join error: {e}") })??;
		Ok(self.rescan(kind).await)
	}

	async fn ensure_directory(&self, kind: AssetKind) -> Result<PathBuf, AssetError> {
		if self.state(kind) == CatalogState::Unavailable {
			return Err(AssetError::StorageUnavailable { kind, cause: "disabled for this session".into() });
		}
		let store = self.store.clone();
		let result = tokio::task::spawn_blocking(move || store.ensure_directory(kind))
			.await
			.unwrap_or_else(|e| Err(AssetError::StorageUnavailable { kind, cause: format!("task join error: {e}") }));
		if let Err(e) = &result {
			error!(%kind, "disabling kind for this session: {e}");
			self.catalog.mark_unavailable(kind).await;
		}
		result
	}

	fn dispatch_thumbnails(&self, records: Vec<AssetRecord>) -> PendingThumbnails {
		let handles = records
			.into_iter()
			.map(|record| {
				let cache = self.thumbnails.clone();
				let catalog = self.catalog.clone();
				tokio::spawn(async move {
					if let Some(preview) = cache.get_or_generate(&record).await {
						catalog.set_preview(record.kind, record.id, Some(preview)).await;
					}
				})
			})
			.collect();
		PendingThumbnails(handles)
	}
}

/// Every input of a batch fails the same way when the kind has no directory.
fn unavailable_report(sources: impl Iterator<Item = String>, error: &AssetError) -> IngestReport {
	let mut report = IngestReport::default();
	for source in sources {
		report.failed.push(ingest::IngestFailure { source, error: error.clone() });
	}
	report
}
