use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{VideoMakerError, VideoMakerResult};
use crate::tempfiles::frame_source;

/// Extensions picked up from the input folder, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tiff", "heic", "webp"];

pub fn is_known_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_known_extension)
}

/// Recursively collect every supported image below `root`, sorted and de-duplicated.
///
/// Frames this tool wrote next to a source that is still present (a killed
/// run's leftovers) are skipped. Other files ending in `_temp.jpg` are ordinary
/// images. An empty result is an error: there is nothing to build a video from.
pub fn find_image_files(root: &Path) -> VideoMakerResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(VideoMakerError::config(format!(
            "input folder '{}' does not exist or is not a directory",
            root.display()
        )));
    }

    let candidates: BTreeSet<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_supported_image(p))
        .collect();

    let files: BTreeSet<&PathBuf> = candidates
        .iter()
        .filter(|p| !frame_source(p).is_some_and(|source| candidates.contains(&source)))
        .collect();

    if files.is_empty() {
        return Err(VideoMakerError::NoImages(root.to_path_buf()));
    }

    debug!(count = files.len(), root = %root.display(), "discovered images");
    Ok(files.into_iter().cloned().collect())
}
