//! Finding candidate image files under the paths given on the command line.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ProcessingConfig;

/// Walks directories for files with a supported extension.
pub struct FileDiscovery {
    extensions: Vec<String>,
}

impl FileDiscovery {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            extensions: config
                .supported_formats
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Supported files at or below each root, sorted and deduplicated.
    ///
    /// A root that is itself a supported file is returned as-is. Unreadable
    /// entries are logged and skipped.
    pub fn discover<P: AsRef<Path>>(&self, roots: &[P]) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for root in roots {
            let root = root.as_ref();
            if root.is_file() {
                if self.is_supported(root) {
                    files.push(root.to_path_buf());
                }
                continue;
            }

            for entry in WalkDir::new(root).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if entry.file_type().is_file() && self.is_supported(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        }

        files.sort();
        files.dedup();
        tracing::debug!("Discovered {} candidate files", files.len());
        files
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        let discovery = FileDiscovery::new(&ProcessingConfig::default());

        assert!(discovery.is_supported(Path::new("test.jpg")));
        assert!(discovery.is_supported(Path::new("test.JPG")));
        assert!(discovery.is_supported(Path::new("test.webp")));
        assert!(!discovery.is_supported(Path::new("test.txt")));
        assert!(!discovery.is_supported(Path::new("jpg")));
    }

    #[test]
    fn test_discover_walks_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        for path in [
            dir.path().join("b.png"),
            dir.path().join("a.JPG"),
            dir.path().join("readme.txt"),
            nested.join("c.gif"),
        ] {
            std::fs::write(path, b"x").unwrap();
        }

        let discovery = FileDiscovery::new(&ProcessingConfig::default());
        let found = discovery.discover(&[dir.path()]);

        assert_eq!(
            found,
            vec![
                dir.path().join("a.JPG"),
                dir.path().join("b.png"),
                nested.join("c.gif"),
            ]
        );
    }

    #[test]
    fn test_overlapping_roots_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();

        let discovery = FileDiscovery::new(&ProcessingConfig::default());
        let found = discovery.discover(&[dir.path().to_path_buf(), file.clone()]);
        assert_eq!(found, vec![file]);
    }
}
