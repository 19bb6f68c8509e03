use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VideoMakerError, VideoMakerResult};
use crate::normalize::FrameSpec;

/// File name of the output video when none is given.
pub const DEFAULT_OUTPUT_NAME: &str = "output_video.mp4";

/// What to do when a single image cannot be decoded or resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Log it and put the untouched source file into the video.
    #[default]
    UseOriginal,
    /// Fail the whole run.
    Abort,
}

/// Output resolution preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub width: u32,
    pub height: u32,
}

impl Preset {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Application configuration: presets, defaults and encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub presets: BTreeMap<String, Preset>,
    pub default_preset: String,
    pub default_duration: f64,
    pub default_fps: u32,
    pub codec: String,
    pub jpeg_quality: u8,
    pub on_image_error: FallbackPolicy,
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let presets = [
            ("720p", Preset::new(1280, 720)),
            ("1080p", Preset::new(1920, 1080)),
            ("1440p", Preset::new(2560, 1440)),
            ("4k", Preset::new(3840, 2160)),
            ("square", Preset::new(1080, 1080)),
        ]
        .into_iter()
        .map(|(name, p)| (name.to_string(), p))
        .collect();

        Self {
            presets,
            default_preset: "1080p".to_string(),
            default_duration: 2.0,
            default_fps: 24,
            codec: "libx264".to_string(),
            jpeg_quality: 95,
            on_image_error: FallbackPolicy::UseOriginal,
            ffmpeg_path: None,
        }
    }
}

impl AppConfig {
    /// Parse a config file; `.toml` files are read as TOML, anything else as JSON.
    pub fn from_file(path: &Path) -> VideoMakerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| VideoMakerError::config(format!("reading config {}: {}", path.display(), e)))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let cfg: AppConfig = if is_toml {
            toml::from_str(&text).map_err(|e| {
                VideoMakerError::config(format!("parsing config {}: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&text).map_err(|e| {
                VideoMakerError::config(format!("parsing config {}: {}", path.display(), e))
            })?
        };

        cfg.validate().map_err(|e| match e {
            VideoMakerError::Config(msg) => VideoMakerError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        Ok(cfg)
    }

    /// Places searched for a config file, in order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(d) = dirs::data_dir() {
            let d = d.join("videomaker");
            tried.push(d.join("videomaker.toml"));
            tried.push(d.join("videomaker.json"));
        }
        tried.push(PathBuf::from("videomaker.toml"));
        tried.push(PathBuf::from("videomaker.json"));
        tried
    }

    /// Explicit file if given, else the first config found on the search path,
    /// else the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> VideoMakerResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for p in Self::search_paths() {
            if p.is_file() {
                debug!(path = %p.display(), "loading config");
                return Self::from_file(&p);
            }
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> VideoMakerResult<()> {
        for (name, p) in &self.presets {
            if let Err(VideoMakerError::Config(msg)) = validate_resolution(p.width, p.height) {
                return Err(VideoMakerError::config(format!("preset '{}': {}", name, msg)));
            }
        }
        if !self.presets.contains_key(&self.default_preset) {
            return Err(VideoMakerError::config(format!(
                "default preset '{}' is not defined",
                self.default_preset
            )));
        }
        if !(self.default_duration.is_finite() && self.default_duration > 0.0) {
            return Err(VideoMakerError::config("default_duration must be a positive number of seconds"));
        }
        if self.default_fps == 0 {
            return Err(VideoMakerError::config("default_fps must be non-zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(VideoMakerError::config("jpeg_quality must be between 1 and 100"));
        }
        if self.codec.trim().is_empty() {
            return Err(VideoMakerError::config("codec cannot be empty"));
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// Frame geometry for a preset, `None` meaning the default preset.
    pub fn frame_spec(&self, preset: Option<&str>) -> VideoMakerResult<FrameSpec> {
        let name = preset.unwrap_or(&self.default_preset);
        let p = self.preset(name).ok_or_else(|| {
            let available = self.presets.keys().cloned().collect::<Vec<_>>().join(", ");
            VideoMakerError::config(format!("unknown preset '{}'. Available presets: {}", name, available))
        })?;
        Ok(FrameSpec::new(p.width, p.height).with_quality(self.jpeg_quality))
    }
}

/// yuv420p output needs non-zero, even dimensions.
pub fn validate_resolution(width: u32, height: u32) -> VideoMakerResult<()> {
    if width == 0 || height == 0 {
        return Err(VideoMakerError::config("width/height must be non-zero"));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(VideoMakerError::config(format!(
            "width/height must be even for yuv420p output, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

/// Everything one run needs, fixed for its whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub duration_per_image: f64,
    pub fps: u32,
}

impl RunConfig {
    /// `output` defaults to `output_video.mp4` inside the input folder.
    pub fn new(input_dir: impl Into<PathBuf>, output: Option<PathBuf>, duration_per_image: f64, fps: u32) -> Self {
        let input_dir = input_dir.into();
        let output = output.unwrap_or_else(|| default_output_path(&input_dir));
        Self {
            input_dir,
            output,
            duration_per_image,
            fps,
        }
    }

    pub fn validate(&self) -> VideoMakerResult<()> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(VideoMakerError::config("please select an input folder"));
        }
        if !self.input_dir.is_dir() {
            return Err(VideoMakerError::config(format!(
                "input folder '{}' does not exist",
                self.input_dir.display()
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(VideoMakerError::config("please select an output path"));
        }
        if self.output.is_dir() {
            return Err(VideoMakerError::config(format!(
                "output path '{}' is a directory",
                self.output.display()
            )));
        }
        if !(self.duration_per_image.is_finite() && self.duration_per_image > 0.0) {
            return Err(VideoMakerError::config("duration per image must be greater than zero"));
        }
        if self.fps == 0 {
            return Err(VideoMakerError::config("frames per second must be non-zero"));
        }
        Ok(())
    }
}

pub fn default_output_path(input_dir: &Path) -> PathBuf {
    input_dir.join(DEFAULT_OUTPUT_NAME)
}
