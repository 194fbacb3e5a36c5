//! Pre-seed file validation.
//!
//! Caller-side precondition checks, applied before any swarm
//! interaction: media container by file extension and a hard size cap,
//! with a warning past the large-file threshold.

use super::swarm::LocalFile;

/// Containers accepted for shared playback.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["mp4", "webm", "ogg", "mkv"];

/// Hard cap on seedable file size: 10 GiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Warn threshold for large files: 2 GiB.
pub const LARGE_FILE_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024;

/// Rejections from [`validate_video_file`].
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The file extension is not a supported media container.
    #[error("unsupported file type '{0}' (expected one of mp4, webm, ogg, mkv)")]
    UnsupportedType(String),

    /// The file exceeds the hard size cap.
    #[error("file is {size} bytes, over the {max} byte limit")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// The enforced cap in bytes.
        max: u64,
    },
}

/// Check that a file is seedable: supported container, under the cap.
///
/// Files past [`LARGE_FILE_THRESHOLD`] pass with a logged warning.
///
/// # Errors
///
/// Returns [`ValidationError`] for unsupported extensions or oversized
/// files.
pub fn validate_video_file(file: &LocalFile) -> Result<(), ValidationError> {
    let extension = file
        .name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedType(extension));
    }

    if file.size > MAX_FILE_SIZE {
        return Err(ValidationError::TooLarge {
            size: file.size,
            max: MAX_FILE_SIZE,
        });
    }
    if file.size >= LARGE_FILE_THRESHOLD {
        tracing::warn!(
            file = %file.name,
            size = file.size,
            "large file: seeding and playback startup may be slow"
        );
    }

    Ok(())
}
