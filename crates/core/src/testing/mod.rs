//! Testing utilities: a transcoder that needs no engine, and tree fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use rekonv_core::testing::{fixtures, MockTranscoder};
//!
//! let dir = tempfile::TempDir::new()?;
//! fixtures::media_tree(dir.path(), &["a.wav", "sub/b.flac"]);
//!
//! let transcoder = MockTranscoder::new();
//! ```

mod mock_transcoder;

pub use mock_transcoder::{MockTranscoder, RecordedTranscode};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    /// Creates each relative file below `root` with placeholder content.
    ///
    /// Panics on I/O errors; meant for tests only.
    pub fn media_tree(root: &Path, files: &[&str]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|relative| {
                let path = root.join(relative);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).expect("create fixture directory");
                }
                std::fs::write(&path, relative.as_bytes()).expect("write fixture file");
                path
            })
            .collect()
    }

    /// Every file below `root`, relative and sorted, with `/` separators.
    pub fn list_tree(root: &Path) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }
}
