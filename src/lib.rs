//! Local asset ingestion and thumbnail cache.
//!
//! Imports user-supplied media into an app-owned, kind-partitioned
//! directory tree, keeps an in-memory catalog of what is on disk and
//! derives small previews for the presentation layer.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod library;
pub mod models;
pub mod store;

pub use catalog::{CatalogSnapshot, CatalogState};
pub use config::{Config, ConfigError};
pub use engine::ingest::IngestReport;
pub use engine::thumbnails::{ImageThumbnailer, Thumbnailer};
pub use error::AssetError;
pub use library::{IngestOutcome, Library, ScanOutcome};
pub use models::asset::{AssetId, AssetKind, AssetRecord, Preview, Thumbnail};
pub use models::source::{LocalFile, Payload, SourceHandle};
pub use store::AssetStore;
