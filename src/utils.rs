use crate::collection::ImageId;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Supported image file extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"];

/// Case-insensitive extension check against `extensions` (no leading dot)
pub fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            extensions
                .iter()
                .any(|supported| supported.as_ref().eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

/// Regular files in `dir` with a supported extension. Unsorted.
pub fn list_supported_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    list_files(dir, recursive, IMAGE_EXTENSIONS)
}

/// Like `list_supported_files` with a custom extension set.
pub fn list_files<S: AsRef<str>>(
    dir: &Path,
    recursive: bool,
    extensions: &[S],
) -> Result<Vec<PathBuf>> {
    let entries: Vec<PathBuf> = if recursive {
        if !dir.is_dir() {
            anyhow::bail!("Not a directory: {}", dir.display());
        }
        WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.is_file() && has_extension(p, extensions))
            .collect()
    } else {
        fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_extension(p, extensions))
            .collect()
    };

    Ok(entries)
}

/// Canonicalise listed paths into ids; unresolvable paths are skipped.
pub fn canonical_ids(paths: impl IntoIterator<Item = PathBuf>) -> Vec<ImageId> {
    paths
        .into_iter()
        .filter_map(|p| match ImageId::canonical(&p) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("skipping {}: {}", p.display(), e);
                None
            }
        })
        .collect()
}

/// Expand tilde (~) in path
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
