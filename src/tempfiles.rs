use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Every temporary frame written next to a source image ends with this suffix.
pub const TEMP_SUFFIX: &str = "_temp.jpg";

/// `beach.png` becomes `beach_png_temp.jpg` in the same directory.
///
/// The extension is kept verbatim, case included, so every source file in a
/// directory gets its own frame: `a.png`, `a.PNG` and `a.jpg` map to three names.
pub fn temp_frame_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    let name = match source.extension() {
        Some(ext) => format!("{}_{}{}", stem, ext.to_string_lossy(), TEMP_SUFFIX),
        None => format!("{}{}", stem, TEMP_SUFFIX),
    };
    source.with_file_name(name)
}

/// Any file name ending in the temporary-frame suffix, whoever wrote it.
pub fn is_temp_frame(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
}

/// The source image a frame named by [`temp_frame_path`] would belong to.
///
/// `beach_png_temp.jpg` gives `beach.png`; `beach_temp.jpg` gives `None`
/// because `temp` is not an image extension.
pub fn frame_source(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let base = name.strip_suffix(TEMP_SUFFIX)?;
    let (stem, ext) = base.rsplit_once('_')?;
    if stem.is_empty() || !crate::discovery::is_known_extension(ext) {
        return None;
    }
    Some(path.with_file_name(format!("{}.{}", stem, ext)))
}

/// Scratch file in the system temp dir, unique per process and call.
pub fn scratch_path(prefix: &str, extension: &str) -> PathBuf {
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    std::env::temp_dir().join(format!("{}_{}_{}.{}", prefix, std::process::id(), stamp, extension))
}

/// Removes a file on drop; a missing file is not an error.
fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed temporary file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove temporary file"),
    }
}

pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

/// The temporary frames produced during one run.
///
/// Dropping the set deletes every registered file, whether the run returned
/// normally, failed, was cancelled or is unwinding from a panic.
#[derive(Debug, Default)]
pub struct TempFrameSet {
    paths: Vec<PathBuf>,
}

impl TempFrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` for deletion. Returns `false` if it was already tracked,
    /// which means two sources produced the same frame.
    pub fn register(&mut self, path: PathBuf) -> bool {
        if self.paths.contains(&path) {
            warn!(path = %path.display(), "temporary frame registered twice");
            return false;
        }
        self.paths.push(path);
        true
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Delete everything now instead of waiting for drop.
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            remove_quietly(&path);
        }
    }
}

impl Drop for TempFrameSet {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Outcome of a bulk delete.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Leftover temporary frames anywhere below `dir`, sorted.
pub fn find_temp_files(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_temp_frame(p))
        .collect();
    found.sort();
    found
}

pub fn delete_temp_files(paths: &[PathBuf]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => report.deleted += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete temporary file");
                report.failed.push((path.clone(), e.to_string()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_name_keeps_extension_and_suffix() {
        assert_eq!(
            temp_frame_path(Path::new("/photos/beach.PNG")),
            PathBuf::from("/photos/beach_PNG_temp.jpg")
        );
        assert_eq!(
            temp_frame_path(Path::new("/photos/beach.jpg")),
            PathBuf::from("/photos/beach_jpg_temp.jpg")
        );
        assert!(is_temp_frame(&temp_frame_path(Path::new("x.webp"))));
        assert!(!is_temp_frame(Path::new("x.jpg")));
    }

    #[test]
    fn extension_case_keeps_frames_apart() {
        let upper = temp_frame_path(Path::new("/p/a.PNG"));
        let lower = temp_frame_path(Path::new("/p/a.png"));
        assert_ne!(upper, lower);
        assert_eq!(frame_source(&upper), Some(PathBuf::from("/p/a.PNG")));
        assert_eq!(frame_source(&lower), Some(PathBuf::from("/p/a.png")));
    }

    #[test]
    fn frame_source_only_for_generated_names() {
        assert_eq!(
            frame_source(Path::new("/p/my_trip_jpeg_temp.jpg")),
            Some(PathBuf::from("/p/my_trip.jpeg"))
        );
        assert_eq!(frame_source(Path::new("/p/beach_temp.jpg")), None);
        assert_eq!(frame_source(Path::new("/p/beach_raw_temp.jpg")), None);
        assert_eq!(frame_source(Path::new("/p/_png_temp.jpg")), None);
        assert_eq!(frame_source(Path::new("/p/beach.jpg")), None);
    }

    #[test]
    fn frame_set_removes_registered_files_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a_png_temp.jpg");
        let b = dir.path().join("b_png_temp.jpg");
        let keep = dir.path().join("a.png");
        for p in [&a, &b, &keep] {
            fs::write(p, b"x").unwrap();
        }

        {
            let mut set = TempFrameSet::new();
            assert!(set.register(a.clone()));
            assert!(set.register(b.clone()));
            assert!(!set.register(a.clone()));
            assert_eq!(set.len(), 2);
        }

        assert!(!a.exists());
        assert!(!b.exists());
        assert!(keep.exists());
    }

    #[test]
    fn frame_set_cleans_up_while_unwinding() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a_png_temp.jpg");
        fs::write(&a, b"x").unwrap();

        let path = a.clone();
        let result = std::panic::catch_unwind(move || {
            let mut set = TempFrameSet::new();
            set.register(path);
            panic!("encoder blew up");
        });

        assert!(result.is_err());
        assert!(!a.exists());
    }

    #[test]
    fn already_removed_file_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone_png_temp.jpg");
        let mut set = TempFrameSet::new();
        set.register(gone.clone());
        set.cleanup();
        assert!(set.is_empty());

        let report = delete_temp_files(&[gone]);
        assert_eq!(report.deleted, 0);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn bulk_cleanup_only_touches_temp_frames() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        let temps = [root.join("a_png_temp.jpg"), root.join("sub/b_jpg_temp.jpg")];
        let keepers = [root.join("a.png"), root.join("sub/b.jpg"), root.join("temp.jpg")];
        for p in temps.iter().chain(keepers.iter()) {
            fs::write(p, b"x").unwrap();
        }

        let found = find_temp_files(root);
        assert_eq!(found, temps.to_vec());

        let report = delete_temp_files(&found);
        assert_eq!(report.deleted, 2);
        assert!(find_temp_files(root).is_empty());
        assert!(keepers.iter().all(|p| p.exists()));
    }

    #[test]
    fn guard_removes_scratch_file() {
        let path = scratch_path("videomaker_test", "txt");
        fs::write(&path, b"list").unwrap();
        {
            let guard = TempFileGuard::new(path.clone());
            assert!(guard.path().exists());
        }
        assert!(!path.exists());
    }
}
