//! Category buckets for stored artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a stored artifact.
///
/// Determines the bucket directory under the managed storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Video files.
    Video,
    /// Audio files.
    Audio,
    /// Still images.
    Photo,
    /// Documents and anything unrecognized.
    #[default]
    Other,
}

impl Category {
    /// Returns all category variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Video, Self::Audio, Self::Photo, Self::Other]
    }

    /// Returns the category as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Photo => "photo",
            Self::Other => "other",
        }
    }

    /// Returns the bucket directory name under the storage root.
    #[must_use]
    pub const fn dir_name(&self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Audio => "audio",
            Self::Photo => "photos",
            Self::Other => "other",
        }
    }

    /// Inverse of [`Category::dir_name`].
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.dir_name() == name)
    }

    /// Parses a category from a string.
    ///
    /// Accepts singular and bucket-directory spellings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "video" | "videos" => Some(Self::Video),
            "audio" | "audios" | "music" => Some(Self::Audio),
            "photo" | "photos" | "image" | "images" => Some(Self::Photo),
            "other" | "others" | "document" | "documents" => Some(Self::Other),
            _ => None,
        }
    }

    /// Parses a category, falling back to `Other` for unrecognized input.
    #[must_use]
    pub fn parse_or_other(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Other)
    }

    /// Classifies a file extension (with or without a leading dot).
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "mp4" | "mkv" | "webm" | "mov" | "avi" => Self::Video,
            "mp3" | "m4a" | "wav" | "ogg" | "flac" => Self::Audio,
            "jpg" | "png" | "jpeg" | "gif" | "webp" | "bmp" => Self::Photo,
            _ => Self::Other,
        }
    }

    /// Classifies a path by its extension.
    #[must_use]
    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::Other, Self::from_extension)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
