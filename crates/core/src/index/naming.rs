//! Output path planning.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::JobOptions;
use crate::discovery::{Candidate, EntryKind};

/// Output path for a candidate before collision handling.
///
/// Converted files take the job's extension, copied files keep their name.
/// The source directory structure is mirrored below `output` unless the job
/// flattens or targets a single file.
pub fn planned_output(job: &JobOptions, candidate: &Candidate) -> PathBuf {
    let relative = &candidate.relative_path;

    let file_name: OsString = match candidate.kind {
        EntryKind::Convert => {
            let mut name = relative
                .file_stem()
                .map(|s| s.to_os_string())
                .unwrap_or_default();
            name.push(".");
            name.push(job.format.extension());
            name
        }
        EntryKind::Copy => relative
            .file_name()
            .map(|s| s.to_os_string())
            .unwrap_or_default(),
    };

    let dir = if job.flatten || job.single_file {
        job.output.clone()
    } else {
        match relative.parent() {
            Some(parent) => job.output.join(parent),
            None => job.output.clone(),
        }
    };

    dir.join(file_name)
}

/// `dir/name.ext` becomes `dir/name (n).ext`. `n == 0` returns the path as is.
pub fn with_suffix(path: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }

    let mut name = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }

    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    fn candidate(relative: &str, kind: EntryKind) -> Candidate {
        Candidate::new(Path::new("/music").join(relative), relative, kind)
    }

    #[test]
    fn test_convert_mirrors_tree_and_swaps_extension() {
        let job = JobOptions::new("/music", "/out", OutputFormat::Mp3).recursive(true);
        let planned = planned_output(&job, &candidate("a/b/song.wav", EntryKind::Convert));
        assert_eq!(planned, PathBuf::from("/out/a/b/song.mp3"));
    }

    #[test]
    fn test_copy_keeps_name() {
        let job = JobOptions::new("/music", "/out", OutputFormat::Mp3).recursive(true);
        let planned = planned_output(&job, &candidate("a/cover.jpg", EntryKind::Copy));
        assert_eq!(planned, PathBuf::from("/out/a/cover.jpg"));
    }

    #[test]
    fn test_flatten_writes_to_root() {
        let job = JobOptions::new("/music", "/out", OutputFormat::Flac).flatten(true);
        let planned = planned_output(&job, &candidate("x/y/track.aiff", EntryKind::Convert));
        assert_eq!(planned, PathBuf::from("/out/track.flac"));
    }

    #[test]
    fn test_dotted_stem_keeps_inner_dots() {
        let job = JobOptions::new("/music", "/out", OutputFormat::Aac);
        let planned = planned_output(&job, &candidate("live.2019.wav", EntryKind::Convert));
        assert_eq!(planned, PathBuf::from("/out/live.2019.aac"));
    }

    #[test]
    fn test_suffixes() {
        let path = Path::new("/out/track.mp3");
        assert_eq!(with_suffix(path, 0), PathBuf::from("/out/track.mp3"));
        assert_eq!(with_suffix(path, 1), PathBuf::from("/out/track (1).mp3"));
        assert_eq!(with_suffix(path, 12), PathBuf::from("/out/track (12).mp3"));
        assert_eq!(
            with_suffix(Path::new("/out/README"), 2),
            PathBuf::from("/out/README (2)")
        );
    }
}
