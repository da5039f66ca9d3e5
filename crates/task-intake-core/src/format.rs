//! File format resolution.
//!
//! An uploaded file's format is resolved once from its extension into the
//! closed [`FileFormat`] set; everything downstream matches on the variant
//! instead of comparing extension strings.

use serde::Serialize;

pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp", ".gif", ".webp", ".tiff"];
pub const AUDIO_EXTENSIONS: &[&str] = &[".wav", ".mp3", ".flac", ".m4a", ".ogg", ".aac"];
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".webm"];
pub const HYPERTEXT_EXTENSIONS: &[&str] = &[".html", ".htm", ".xml"];

/// Lowercased extension of a file name, including the dot, or `""` when
/// the name has none (dotfiles such as `.env` have none).
pub fn extension_of(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// `"csv"` and `".CSV"` both become `".csv"`.
pub fn normalize_extension(ext: &str) -> String {
    let lower = ext.trim().to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Txt,
    Json,
    Hypertext,
    Image,
    Audio,
    Video,
    Other,
}

impl FileFormat {
    /// Resolves a format from an extension such as `".CSV"` or `"png"`.
    pub fn from_extension(ext: &str) -> Self {
        match normalize_extension(ext).as_str() {
            ".csv" => FileFormat::Csv,
            ".tsv" => FileFormat::Tsv,
            ".txt" => FileFormat::Txt,
            ".json" => FileFormat::Json,
            e if HYPERTEXT_EXTENSIONS.contains(&e) => FileFormat::Hypertext,
            e if IMAGE_EXTENSIONS.contains(&e) => FileFormat::Image,
            e if AUDIO_EXTENSIONS.contains(&e) => FileFormat::Audio,
            e if VIDEO_EXTENSIONS.contains(&e) => FileFormat::Video,
            _ => FileFormat::Other,
        }
    }

    /// Formats that can expand into many tasks (one per row or line).
    pub fn could_be_tasks_list(self) -> bool {
        matches!(self, FileFormat::Csv | FileFormat::Tsv | FileFormat::Txt)
    }

    pub fn is_structured(self) -> bool {
        self.could_be_tasks_list() || self == FileFormat::Json
    }

    pub fn is_media(self) -> bool {
        self.media_field().is_some()
    }

    /// Data field a media asset maps onto when the schema declares it.
    pub fn media_field(self) -> Option<&'static str> {
        match self {
            FileFormat::Image => Some("image"),
            FileFormat::Audio => Some("audio"),
            FileFormat::Video => Some("video"),
            _ => None,
        }
    }
}
