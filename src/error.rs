use std::{io, path::PathBuf};

use thiserror::Error;

use crate::models::asset::AssetKind;

#[derive(Debug, Clone, Error)]
pub enum AssetError {
	#[error("access denied: {0}")]
	AccessDenied(String),

	#[error("copy failed for {path}: {cause}")]
	CopyFailed { path: PathBuf, cause: String },

	#[error("storage unavailable for {kind}: {cause}")]
	StorageUnavailable { kind: AssetKind, cause: String },

	#[error("thumbnail failed for {path}: {cause}")]
	ThumbnailFailed { path: PathBuf, cause: String },

	#[error("scan failed for {kind}: {cause}")]
	ScanFailed { kind: AssetKind, cause: String },

	#[error("unsupported file type for {kind}: {name}")]
	UnsupportedType { kind: AssetKind, name: String },

	#[error("invalid file name: {0}")]
	InvalidName(String),

	#[error("cannot decode {name}: {cause}")]
	Undecodable { name: String, cause: String },
}

impl AssetError {
	pub(crate) fn copy_failed(path: impl Into<PathBuf>, err: io::Error) -> Self {
		AssetError::CopyFailed { path: path.into(), cause: err.to_string() }
	}

	/// Short tag used in log fields.
	pub fn kind_tag(&self) -> &'static str {
		match self {
			AssetError::AccessDenied(_) => "access_denied",
			AssetError::CopyFailed { .. } => "copy_failed",
			AssetError::StorageUnavailable { .. } => "storage_unavailable",
			AssetError::ThumbnailFailed { .. } => "thumbnail_failed",
			AssetError::ScanFailed { .. } => "scan_failed",
			AssetError::UnsupportedType { .. } => "unsupported_type",
			AssetError::InvalidName(_) => "invalid_name",
			AssetError::Undecodable { .. } => "undecodable",
		}
	}
}
