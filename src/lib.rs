//! # videomaker - image folder to slideshow video
//!
//! `videomaker` turns a directory of images into a single video. Every image is
//! flattened to RGB, letterboxed or pillarboxed onto a fixed canvas (1920x1080 by
//! default), shown for a fixed duration, and the whole sequence is encoded with
//! ffmpeg (H.264, no audio).
//!
//! ## Example
//!
//! ```no_run
//! use videomaker::{CancelToken, RunConfig, VideoMaker};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let maker = VideoMaker::new();
//! let run = RunConfig::new("holiday_photos", None, 2.0, 24);
//! let summary = maker.create_video(&run, &CancelToken::new(), |progress| {
//!     println!("[{:5.1}%] {}", progress.percentage, progress.message);
//! })?;
//! println!("wrote {} ({:.1}s)", summary.output.display(), summary.duration_secs);
//! # Ok(())
//! # }
//! ```
//!
//! ## Background runs
//!
//! [`VideoMaker::spawn`] runs the same pipeline on a worker thread and hands
//! back a [`RunHandle`] to stream progress from, cancel, and wait on:
//!
//! ```no_run
//! use videomaker::{RunConfig, VideoMaker};
//!
//! let handle = VideoMaker::new()
//!     .spawn(RunConfig::new("holiday_photos", None, 2.0, 24))
//!     .unwrap();
//! for progress in handle.events() {
//!     println!("{:?}: {}", progress.phase, progress.message);
//! }
//! let summary = handle.wait().unwrap();
//! ```
//!
//! ## Temporary frames
//!
//! Normalized frames are written next to their source as `<stem>_<ext>_temp.jpg`
//! and removed when the run ends. If the process is killed before that,
//! [`find_temp_files`] and [`delete_temp_files`] clean up the leftovers.

pub mod config;
pub mod discovery;
pub mod encode;
pub mod error;
pub mod normalize;
pub mod task;
pub mod tempfiles;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use config::{AppConfig, FallbackPolicy, Preset, RunConfig};
pub use discovery::{find_image_files, IMAGE_EXTENSIONS};
pub use encode::{EncodeSettings, FfmpegConfig};
pub use error::{VideoMakerError, VideoMakerResult};
pub use normalize::{FrameSpec, NormalizedFrame};
pub use task::{CancelToken, RunHandle};
pub use tempfiles::{delete_temp_files, find_temp_files, CleanupReport, TEMP_SUFFIX};

/// Represents the current phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Walking the input folder
    Searching,
    /// Resizing and padding images
    Processing,
    /// Building the clip sequence
    Concatenating,
    /// ffmpeg is writing the output file
    Encoding,
    /// The video was written
    Complete,
}

/// Progress snapshot for a run.
///
/// Emitted at coarse milestones only: search start and end, once per image,
/// before concatenation, before encoding and on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Images handled so far in the current phase
    pub completed: usize,
    /// Total number of images (0 while still searching)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn searching() -> Self {
        Self {
            phase: ProgressPhase::Searching,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Searching for images...".to_string(),
        }
    }

    pub fn found(total: usize) -> Self {
        Self {
            phase: ProgressPhase::Searching,
            completed: 0,
            total,
            percentage: 5.0,
            message: format!("Found {} image files", total),
        }
    }

    /// Sent before image `index` (0-based) is processed.
    pub fn processing(index: usize, total: usize, path: &Path) -> Self {
        let percentage = if total > 0 {
            5.0 + (index as f64 / total as f64) * 60.0
        } else {
            5.0
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            phase: ProgressPhase::Processing,
            completed: index,
            total,
            percentage,
            message: format!("Processing image {}/{}: {}", index + 1, total, name),
        }
    }

    pub fn concatenating(total: usize) -> Self {
        Self {
            phase: ProgressPhase::Concatenating,
            completed: total,
            total,
            percentage: 70.0,
            message: "Creating video...".to_string(),
        }
    }

    pub fn encoding(total: usize) -> Self {
        Self {
            phase: ProgressPhase::Encoding,
            completed: total,
            total,
            percentage: 80.0,
            message: "Encoding video file...".to_string(),
        }
    }

    pub fn complete(total: usize, duration_secs: f64) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total,
            total,
            percentage: 100.0,
            message: format!("Video created successfully! Duration: {:.2} seconds", duration_secs),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub output: PathBuf,
    /// Number of source images in the video
    pub images: usize,
    /// Images that went in unprocessed because normalization failed
    pub fallbacks: usize,
    /// Nominal length: images x duration per image
    pub duration_secs: f64,
}

/// Main entry point: normalizes images and assembles them into a video
#[derive(Debug, Clone)]
pub struct VideoMaker {
    spec: FrameSpec,
    codec: String,
    on_image_error: FallbackPolicy,
    ffmpeg: FfmpegConfig,
}

impl VideoMaker {
    /// 1920x1080, JPEG quality 95, libx264, lenient per-image failures
    pub fn new() -> Self {
        Self {
            spec: FrameSpec::default(),
            codec: "libx264".to_string(),
            on_image_error: FallbackPolicy::UseOriginal,
            ffmpeg: FfmpegConfig::default(),
        }
    }

    /// Build from an application config; `preset` of `None` picks the default preset.
    pub fn with_config(config: &AppConfig, preset: Option<&str>) -> VideoMakerResult<Self> {
        config.validate()?;
        Ok(Self {
            spec: config.frame_spec(preset)?,
            codec: config.codec.clone(),
            on_image_error: config.on_image_error,
            ffmpeg: FfmpegConfig::new(config.ffmpeg_path.clone()),
        })
    }

    pub fn with_frame_spec(mut self, spec: FrameSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.spec.width = width;
        self.spec.height = height;
        self
    }

    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.on_image_error = policy;
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg: FfmpegConfig) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }

    pub fn frame_spec(&self) -> &FrameSpec {
        &self.spec
    }

    pub fn ffmpeg(&self) -> &FfmpegConfig {
        &self.ffmpeg
    }

    pub fn encode_settings(&self, run: &RunConfig) -> EncodeSettings {
        EncodeSettings {
            width: self.spec.width,
            height: self.spec.height,
            fps: run.fps,
            duration_per_image: run.duration_per_image,
            codec: self.codec.clone(),
        }
    }

    /// Run the whole pipeline on the calling thread.
    ///
    /// Temporary frames are removed before this returns, whatever the outcome.
    /// A failed or cancelled encode may leave a partial file at `run.output`.
    pub fn create_video<F>(&self, run: &RunConfig, cancel: &CancelToken, mut progress: F) -> VideoMakerResult<RunSummary>
    where
        F: FnMut(Progress),
    {
        run.validate()?;
        let settings = self.encode_settings(run);
        settings.validate()?;
        cancel.check()?;

        progress(Progress::searching());
        // The concat list lives in the system temp dir, so frame paths must be absolute.
        let input_dir = fs::canonicalize(&run.input_dir)
            .with_context(|| format!("resolving {}", run.input_dir.display()))?;
        let images = find_image_files(&input_dir)?;
        let total = images.len();
        info!(count = total, input = %input_dir.display(), "found images");
        progress(Progress::found(total));

        let mut temp_frames = tempfiles::TempFrameSet::new();
        let mut frames: Vec<PathBuf> = Vec::with_capacity(total);
        let mut fallbacks = 0;

        for (i, image_path) in images.iter().enumerate() {
            cancel.check()?;
            progress(Progress::processing(i, total, image_path));
            match normalize::normalize_frame(image_path, &self.spec, self.on_image_error)? {
                NormalizedFrame::Temporary(p) => {
                    temp_frames.register(p.clone());
                    frames.push(p);
                }
                NormalizedFrame::Original(p) => {
                    fallbacks += 1;
                    frames.push(p);
                }
            }
        }

        cancel.check()?;
        progress(Progress::concatenating(total));
        self.ffmpeg.ensure_available()?;
        encode::ensure_parent_dir(&run.output)?;
        let list = encode::write_concat_list(&frames, run.duration_per_image)?;

        progress(Progress::encoding(total));
        info!(output = %run.output.display(), fps = run.fps, "encoding video");
        encode::run_ffmpeg(&self.ffmpeg, list.path(), &run.output, &settings, cancel)?;

        let duration_secs = total as f64 * run.duration_per_image;
        progress(Progress::complete(total, duration_secs));
        info!(output = %run.output.display(), images = total, fallbacks, "video created");

        Ok(RunSummary {
            output: run.output.clone(),
            images: total,
            fallbacks,
            duration_secs,
        })
    }

    /// Run the pipeline on a worker thread.
    pub fn spawn(&self, run: RunConfig) -> VideoMakerResult<RunHandle> {
        task::spawn_run(self.clone(), run)
    }
}

impl Default for VideoMaker {
    fn default() -> Self {
        Self::new()
    }
}
