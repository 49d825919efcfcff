//! File discovery for finding test images in a folder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{InputConfig, LimitsConfig};
use crate::types::ImageRef;

/// Discovers image files in a folder.
pub struct FileDiscovery {
    input: InputConfig,
    max_file_size: u64,
}

impl FileDiscovery {
    /// Create a new file discovery instance.
    pub fn new(input: InputConfig, limits: &LimitsConfig) -> Self {
        Self {
            input,
            max_file_size: limits.max_file_size_mb * 1024 * 1024,
        }
    }

    /// Discover all supported images at a path.
    ///
    /// A file path yields itself if supported. A directory yields its
    /// supported files (recursively when configured), sorted by path, with
    /// paths that differ only in letter case collapsed to one entry.
    /// Oversized files are skipped with a warning.
    pub fn discover(&self, path: &Path) -> Vec<ImageRef> {
        if path.is_file() {
            return self.accept(path).into_iter().collect();
        }

        let max_depth = if self.input.recursive { usize::MAX } else { 1 };
        let mut files: Vec<ImageRef> = WalkDir::new(path)
            .follow_links(true)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| self.accept(e.path()))
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        dedup_case_insensitive(files)
    }

    fn accept(&self, path: &Path) -> Option<ImageRef> {
        if !self.is_supported(path) {
            return None;
        }
        let size = std::fs::metadata(path).ok()?.len();
        if size > self.max_file_size {
            tracing::warn!(
                "Skipping {:?}: {} bytes exceeds the {} MB limit",
                path,
                size,
                self.max_file_size / (1024 * 1024)
            );
            return None;
        }
        Some(ImageRef {
            image_id: image_id_for(path),
            path: path.to_path_buf(),
            size,
        })
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.input
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// The identifier an image is reported under: its file name.
pub fn image_id_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Keep the first of any paths that are equal ignoring case.
///
/// Results are keyed by file name, so a second file with an already-seen
/// name (possible in recursive mode) is skipped with a warning.
fn dedup_case_insensitive(files: Vec<ImageRef>) -> Vec<ImageRef> {
    let mut seen_paths: HashSet<PathBuf> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    files
        .into_iter()
        .filter(|f| {
            let key = std::path::absolute(&f.path).unwrap_or_else(|_| f.path.clone());
            seen_paths.insert(PathBuf::from(key.to_string_lossy().to_lowercase()))
        })
        .filter(|f| {
            let fresh = seen_ids.insert(f.image_id.clone());
            if !fresh {
                tracing::warn!("Skipping {:?}: another image is named {}", f.path, f.image_id);
            }
            fresh
        })
        .collect()
}
