use std::{
	fmt,
	path::{Path, PathBuf},
	sync::Arc,
};

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// The closed set of asset families the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
	Photo,
	Video,
	Audio,
	Model,
}

impl AssetKind {
	pub const ALL: [AssetKind; 4] = [AssetKind::Photo, AssetKind::Video, AssetKind::Audio, AssetKind::Model];

	pub fn policy(self) -> &'static KindPolicy {
		match self {
			AssetKind::Photo => &PHOTO,
			AssetKind::Video => &VIDEO,
			AssetKind::Audio => &AUDIO,
			AssetKind::Model => &MODEL,
		}
	}

	/// Case-insensitive allow-list check on the file's extension.
	pub fn accepts(self, path: &Path) -> bool {
		let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
			return false;
		};
		self.policy().extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
	}

	pub fn as_str(self) -> &'static str {
		match self {
			AssetKind::Photo => "photo",
			AssetKind::Video => "video",
			AssetKind::Audio => "audio",
			AssetKind::Model => "model",
		}
	}
}

impl fmt::Display for AssetKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.pad(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailStrategy {
	/// Decode once per asset identity and keep the bitmap in memory.
	Bitmap,
	/// The presentation layer renders the content live; nothing is cached.
	RenderOnDemand,
	None,
}

/// Per-kind configuration record driving the one generic pipeline.
#[derive(Debug)]
pub struct KindPolicy {
	/// `None` means the store root.
	pub subdirectory: Option<&'static str>,
	pub extensions: &'static [&'static str],
	pub thumbnail: ThumbnailStrategy,
}

static PHOTO: KindPolicy = KindPolicy {
	subdirectory: Some("Photo"),
	extensions: &["jpg", "png"],
	thumbnail: ThumbnailStrategy::Bitmap,
};

static VIDEO: KindPolicy = KindPolicy {
	subdirectory: Some("Media"),
	extensions: &["mp4", "mov"],
	thumbnail: ThumbnailStrategy::Bitmap,
};

static AUDIO: KindPolicy = KindPolicy {
	subdirectory: Some("Audio"),
	extensions: &["mp3", "wav", "m4a"],
	thumbnail: ThumbnailStrategy::None,
};

static MODEL: KindPolicy = KindPolicy {
	subdirectory: None,
	extensions: &["usdz"],
	thumbnail: ThumbnailStrategy::RenderOnDemand,
};

/// Extensions of bundled, read-only scenes. Never imported.
pub const BUNDLED_SCENE_EXTENSIONS: &[&str] = &["usda", "usdc"];

/// Stable identity: kind plus storage filename. Rescans of an unchanged
/// directory produce the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
	pub fn new(kind: AssetKind, file_name: &str) -> Self {
		AssetId(format!("{kind}/{file_name}"))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for AssetId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Decoded preview pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
	pub image: RgbaImage,
}

impl Thumbnail {
	pub fn width(&self) -> u32 {
		self.image.width()
	}

	pub fn height(&self) -> u32 {
		self.image.height()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
	Bitmap(Arc<Thumbnail>),
	RenderOnDemand(PathBuf),
}

/// One stored asset as seen by the last scan.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
	pub id: AssetId,
	pub display_name: String,
	pub file_name: String,
	pub storage_path: PathBuf,
	pub kind: AssetKind,
	pub size: u64,
	pub modified_at: DateTime<Utc>,
	pub thumbnail: Option<Preview>,
}

impl AssetRecord {
	/// Build a record for a file already inside the store. Returns `None` when
	/// the path has no usable UTF-8 file name.
	pub fn from_stored(kind: AssetKind, storage_path: PathBuf, size: u64, modified_at: DateTime<Utc>) -> Option<Self> {
		let file_name = storage_path.file_name()?.to_str()?.to_string();
		let display_name = display_name(&file_name);
		Some(AssetRecord {
			id: AssetId::new(kind, &file_name),
			display_name,
			file_name,
			storage_path,
			kind,
			size,
			modified_at,
			thumbnail: None,
		})
	}
}

/// File name without its extension; the full name when there is no stem.
pub fn display_name(file_name: &str) -> String {
	Path::new(file_name)
		.file_stem()
		.and_then(|s| s.to_str())
		.filter(|s| !s.is_empty())
		.unwrap_or(file_name)
		.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_check_ignores_case() {
		assert!(AssetKind::Photo.accepts(Path::new("a.JPG")));
		assert!(AssetKind::Photo.accepts(Path::new("b.png")));
		assert!(!AssetKind::Photo.accepts(Path::new("c.jpeg")));
		assert!(!AssetKind::Photo.accepts(Path::new("x.txt")));
		assert!(!AssetKind::Photo.accepts(Path::new("noext")));
		assert!(AssetKind::Video.accepts(Path::new("clip.MoV")));
		assert!(AssetKind::Audio.accepts(Path::new("song.m4a")));
		assert!(AssetKind::Model.accepts(Path::new("chair.usdz")));
		assert!(!AssetKind::Model.accepts(Path::new("scene.usda")));
	}

	#[test]
	fn policy_table_layout() {
		assert_eq!(AssetKind::Photo.policy().subdirectory, Some("Photo"));
		assert_eq!(AssetKind::Video.policy().subdirectory, Some("Media"));
		assert_eq!(AssetKind::Audio.policy().subdirectory, Some("Audio"));
		assert_eq!(AssetKind::Model.policy().subdirectory, None);
		assert_eq!(AssetKind::Audio.policy().thumbnail, ThumbnailStrategy::None);
		assert_eq!(AssetKind::Model.policy().thumbnail, ThumbnailStrategy::RenderOnDemand);
	}

	#[test]
	fn display_name_strips_extension() {
		assert_eq!(display_name("clip.mov"), "clip");
		assert_eq!(display_name("archive.tar.gz"), "archive.tar");
		assert_eq!(display_name("README"), "README");
		assert_eq!(display_name(".hidden"), ".hidden");
	}

	#[test]
	fn record_id_is_derived_from_name() {
		let a = AssetRecord::from_stored(AssetKind::Video, PathBuf::from("/s/Media/clip.mov"), 3, Utc::now()).unwrap();
		let b = AssetRecord::from_stored(AssetKind::Video, PathBuf::from("/s/Media/clip.mov"), 9, Utc::now()).unwrap();
		assert_eq!(a.id, b.id);
		assert_eq!(a.id.as_str(), "video/clip.mov");
		assert_eq!(a.display_name, "clip");
		assert!(a.thumbnail.is_none());
	}
}
