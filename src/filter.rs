//! Accepted input image extensions.

use std::path::Path;

/// Slide and raster formats the tiling tool understands, lower-case.
pub const VALID_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "svs", "dat"];

/// Returns true when `path` has one of [`VALID_EXTENSIONS`] (case-insensitive).
pub fn is_accepted(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            VALID_EXTENSIONS
                .iter()
                .any(|valid| valid.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Returns true when `path` looks like a zip bundle of images.
pub fn is_bundle(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}
