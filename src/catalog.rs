//! In-memory projection of the asset store.
//!
//! Every mutation goes through one task that owns the state; readers get
//! immutable snapshots from a `watch` channel. The catalog is never the
//! source of truth and is rebuilt by scanning after every start.

use std::{
	collections::{BTreeMap, HashSet},
	sync::Arc,
};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::models::asset::{AssetId, AssetKind, AssetRecord, Preview};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogState {
	#[default]
	Empty,
	Scanning,
	Populated,
	/// The kind's directory could not be created; stays this way for the session.
	Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KindView {
	pub state: CatalogState,
	pub records: Vec<AssetRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
	/// Bumped on every applied mutation.
	pub generation: u64,
	views: BTreeMap<AssetKind, KindView>,
}

impl CatalogSnapshot {
	pub fn records(&self, kind: AssetKind) -> &[AssetRecord] {
		self.views.get(&kind).map(|v| v.records.as_slice()).unwrap_or_default()
	}

	pub fn state(&self, kind: AssetKind) -> CatalogState {
		self.views.get(&kind).map(|v| v.state).unwrap_or_default()
	}

	pub fn find(&self, kind: AssetKind, id: &AssetId) -> Option<&AssetRecord> {
		self.records(kind).iter().find(|r| &r.id == id)
	}
}

enum Command {
	BeginScan(AssetKind),
	Replace(AssetKind, Vec<AssetRecord>),
	Reset(AssetKind),
	MarkUnavailable(AssetKind),
	SetPreview(AssetKind, AssetId, Option<Preview>),
}

/// Handle to the catalog task. Clone is cheap; the task stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct Catalog {
	commands: mpsc::UnboundedSender<(Command, oneshot::Sender<()>)>,
	snapshots: watch::Receiver<Arc<CatalogSnapshot>>,
}

impl Catalog {
	/// Spawn the owning task on the current tokio runtime.
	pub fn spawn() -> Self {
		let (commands, mut rx) = mpsc::unbounded_channel::<(Command, oneshot::Sender<()>)>();
		let (publish, snapshots) = watch::channel(Arc::new(CatalogSnapshot::default()));

		tokio::spawn(async move {
			let mut state = CatalogSnapshot::default();
			while let Some((command, ack)) = rx.recv().await {
				if apply(&mut state, command) {
					state.generation += 1;
					publish.send_replace(Arc::new(state.clone()));
				}
				let _ = ack.send(());
			}
			debug!("catalog task stopped");
		});

		Catalog { commands, snapshots }
	}

	pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
		self.snapshots.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
		self.snapshots.clone()
	}

	pub fn list(&self, kind: AssetKind) -> Vec<AssetRecord> {
		self.snapshot().records(kind).to_vec()
	}

	pub async fn begin_scan(&self, kind: AssetKind) {
		self.send(Command::BeginScan(kind)).await;
	}

	/// Swap in a fresh listing for `kind`.
	pub async fn replace(&self, kind: AssetKind, records: Vec<AssetRecord>) {
		self.send(Command::Replace(kind, records)).await;
	}

	/// Drop every record of `kind` after a failed listing.
	pub async fn reset(&self, kind: AssetKind) {
		self.send(Command::Reset(kind)).await;
	}

	pub async fn mark_unavailable(&self, kind: AssetKind) {
		self.send(Command::MarkUnavailable(kind)).await;
	}

	pub async fn set_preview(&self, kind: AssetKind, id: AssetId, preview: Option<Preview>) {
		self.send(Command::SetPreview(kind, id, preview)).await;
	}

	async fn send(&self, command: Command) {
		let (ack, done) = oneshot::channel();
		if self.commands.send((command, ack)).is_err() {
			warn!("catalog task is gone, dropping update");
			return;
		}
		let _ = done.await;
	}
}

/// Returns whether anything observable changed.
fn apply(state: &mut CatalogSnapshot, command: Command) -> bool {
	match command {
		Command::BeginScan(kind) => {
			let view = state.views.entry(kind).or_default();
			if view.state == CatalogState::Unavailable {
				return false;
			}
			view.state = CatalogState::Scanning;
			true
		}
		Command::Replace(kind, mut records) => {
			let mut seen = HashSet::new();
			records.retain(|r| seen.insert(r.storage_path.clone()));
			let view = state.views.entry(kind).or_default();
			if view.state == CatalogState::Unavailable {
				return false;
			}
			*view = KindView { state: CatalogState::Populated, records };
			true
		}
		Command::Reset(kind) => {
			let view = state.views.entry(kind).or_default();
			if view.state == CatalogState::Unavailable {
				return false;
			}
			*view = KindView::default();
			true
		}
		Command::MarkUnavailable(kind) => {
			state.views.insert(kind, KindView { state: CatalogState::Unavailable, records: Vec::new() });
			true
		}
		Command::SetPreview(kind, id, preview) => {
			let Some(view) = state.views.get_mut(&kind) else {
				return false;
			};
			match view.records.iter_mut().find(|r| r.id == id) {
				Some(record) if record.thumbnail != preview => {
					record.thumbnail = preview;
					true
				}
				_ => false,
			}
		}
	}
}
