//! # Destination Paths
//!
//! Maps a remote asset to its place in the local backup tree:
//!
//! ```text
//! <base>/<YYYY>/<MM>/<Foto|Video>/<filename>
//! <base>/Unknown/Unknown/<Foto|Video>/<filename>   (no capture date)
//! ```
//!
//! Planning is pure: the same base, timestamp and filename always give the
//! same path, which is what makes re-running a backup skip finished work.

use bridge_traits::RemoteAsset;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{BackupError, Result};

/// Extensions (lowercase, without dot) filed under `Video`.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "m4v"];

/// Folder used for both year and month when the capture date is unknown.
const UNKNOWN_DATE_FOLDER: &str = "Unknown";

/// Photo or video, decided by filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify a filename. Anything that is not a known video extension is a photo.
    pub fn from_filename(filename: &str) -> Self {
        let is_video = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                VIDEO_EXTENSIONS
                    .iter()
                    .any(|video| ext.eq_ignore_ascii_case(video))
            })
            .unwrap_or(false);

        if is_video {
            MediaKind::Video
        } else {
            MediaKind::Photo
        }
    }

    /// Name of the folder holding this kind of media
    pub fn folder_name(&self) -> &'static str {
        match self {
            MediaKind::Photo => "Foto",
            MediaKind::Video => "Video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

/// Shorthand for [`MediaKind::from_filename`].
pub fn media_kind(filename: &str) -> MediaKind {
    MediaKind::from_filename(filename)
}

/// Planned local location of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationPath {
    /// Full path of the file
    pub path: PathBuf,
    /// Directory that must exist before writing
    pub directory: PathBuf,
    pub kind: MediaKind,
    /// False when the asset landed in the `Unknown/Unknown` bucket
    pub dated: bool,
}

impl DestinationPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for DestinationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Computes destination paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathPlanner;

impl PathPlanner {
    /// Plan the destination of `asset` under `base`.
    ///
    /// # Errors
    ///
    /// [`BackupError::InvalidAsset`] if the filename cannot be used as a
    /// single path segment.
    pub fn plan(asset: &dyn RemoteAsset, base: &Path) -> Result<DestinationPath> {
        Self::plan_parts(asset.id(), asset.filename(), asset.created(), base)
    }

    /// Plan from the individual asset attributes.
    pub fn plan_parts(
        asset_id: &str,
        filename: &str,
        created: Option<DateTime<Utc>>,
        base: &Path,
    ) -> Result<DestinationPath> {
        let filename = sanitize_filename(asset_id, filename)?;
        let kind = MediaKind::from_filename(&filename);

        let directory = match created {
            Some(created) => base
                .join(format!("{:04}", created.year()))
                .join(format!("{:02}", created.month()))
                .join(kind.folder_name()),
            None => base
                .join(UNKNOWN_DATE_FOLDER)
                .join(UNKNOWN_DATE_FOLDER)
                .join(kind.folder_name()),
        };

        Ok(DestinationPath {
            path: directory.join(&filename),
            directory,
            kind,
            dated: created.is_some(),
        })
    }
}

/// Make a remote filename safe to use as one path segment.
///
/// Separators and control characters become `_`. Names that would escape or
/// alias the directory (`.`, `..`, blank) are rejected.
pub fn sanitize_filename(asset_id: &str, filename: &str) -> Result<String> {
    let sanitized: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return Err(BackupError::InvalidAsset {
            asset_id: asset_id.to_string(),
            reason: "empty filename".to_string(),
        });
    }
    if trimmed == "." || trimmed == ".." {
        return Err(BackupError::InvalidAsset {
            asset_id: asset_id.to_string(),
            reason: format!("filename {:?} is not a valid path segment", filename),
        });
    }

    Ok(sanitized)
}
