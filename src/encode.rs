use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use tracing::debug;

use crate::error::{VideoMakerError, VideoMakerResult};
use crate::task::CancelToken;
use crate::tempfiles::{scratch_path, TempFileGuard};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Which ffmpeg binary to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FfmpegConfig {
    pub ffmpeg_path: Option<PathBuf>,
}

impl FfmpegConfig {
    pub fn new(ffmpeg_path: Option<PathBuf>) -> Self {
        Self { ffmpeg_path }
    }

    pub fn ffmpeg_cmd(&self) -> OsString {
        match &self.ffmpeg_path {
            Some(p) => p.clone().into_os_string(),
            None => OsString::from("ffmpeg"),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(self.ffmpeg_cmd())
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn ensure_available(&self) -> VideoMakerResult<()> {
        if self.is_available() {
            return Ok(());
        }
        Err(VideoMakerError::encode(format!(
            "ffmpeg is required for encoding, but '{}' could not be run",
            self.ffmpeg_cmd().to_string_lossy()
        )))
    }
}

/// How the slideshow is encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_per_image: f64,
    pub codec: String,
}

impl EncodeSettings {
    pub fn validate(&self) -> VideoMakerResult<()> {
        crate::config::validate_resolution(self.width, self.height)?;
        if self.fps == 0 {
            return Err(VideoMakerError::config("encode fps must be non-zero"));
        }
        if !(self.duration_per_image.is_finite() && self.duration_per_image > 0.0) {
            return Err(VideoMakerError::config("duration per image must be greater than zero"));
        }
        Ok(())
    }

    /// Frames that fall back to the source file keep their own size; scale them
    /// into the canvas so the stream stays a single resolution.
    pub fn video_filter(&self) -> String {
        let (w, h) = (self.width, self.height);
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,format=yuv420p"
        )
    }
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Concat-demuxer script: one `file`/`duration` pair per frame.
///
/// The last file is listed once more without a duration, otherwise the demuxer
/// drops the final entry's duration.
pub fn build_concat_list(frames: &[PathBuf], duration_per_image: f64) -> String {
    let mut content = String::from("ffconcat version 1.0\n");
    for f in frames {
        let _ = writeln!(content, "file '{}'", escape_concat_path(f));
        let _ = writeln!(content, "duration {:.6}", duration_per_image);
    }
    if let Some(last) = frames.last() {
        let _ = writeln!(content, "file '{}'", escape_concat_path(last));
    }
    content
}

fn uses_mp4_family(output: &Path) -> bool {
    output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "mp4" | "m4v" | "mov"))
}

pub fn ffmpeg_args(list: &Path, output: &Path, settings: &EncodeSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(list.as_os_str().to_owned());

    let fps = settings.fps.to_string();
    let vf = settings.video_filter();
    args.extend(
        ["-an", "-vf", vf.as_str(), "-r", fps.as_str(), "-c:v", settings.codec.as_str(), "-pix_fmt", "yuv420p"]
            .into_iter()
            .map(OsString::from),
    );
    if uses_mp4_family(output) {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }
    args.push(output.as_os_str().to_owned());
    args
}

pub fn ensure_parent_dir(path: &Path) -> VideoMakerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Write the concat list for `frames`. The returned guard deletes it.
pub fn write_concat_list(frames: &[PathBuf], duration_per_image: f64) -> VideoMakerResult<TempFileGuard> {
    let guard = TempFileGuard::new(scratch_path("videomaker_concat", "txt"));
    fs::write(guard.path(), build_concat_list(frames, duration_per_image))
        .with_context(|| format!("writing concat list {}", guard.path().display()))?;
    Ok(guard)
}

/// Kill `child`, reap it and collect what its stderr reader gathered.
fn stop_child(child: &mut Child, stderr_reader: JoinHandle<String>) -> String {
    let _ = child.kill();
    let _ = child.wait();
    stderr_reader.join().unwrap_or_default()
}

/// Encode `list` (a concat script) into `output`.
///
/// Blocks until ffmpeg exits. If `cancel` fires first the child is killed and
/// `Cancelled` is returned; whatever ffmpeg already wrote to `output` stays.
pub fn run_ffmpeg(
    ffmpeg: &FfmpegConfig,
    list: &Path,
    output: &Path,
    settings: &EncodeSettings,
    cancel: &CancelToken,
) -> VideoMakerResult<()> {
    let args = ffmpeg_args(list, output, settings);
    debug!(cmd = ?ffmpeg.ffmpeg_cmd(), ?args, "spawning ffmpeg");

    let mut child = Command::new(ffmpeg.ffmpeg_cmd())
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| VideoMakerError::encode(format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}")))?;

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| VideoMakerError::encode("failed to open ffmpeg stderr"))?;
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    });

    let status = loop {
        if cancel.is_cancelled() {
            stop_child(&mut child, stderr_reader);
            return Err(VideoMakerError::Cancelled);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let stderr_text = stop_child(&mut child, stderr_reader);
                return Err(VideoMakerError::encode(format!(
                    "failed to wait for ffmpeg: {e}: {}",
                    stderr_text.trim()
                )));
            }
        }
    };

    let stderr_text = stderr_reader.join().unwrap_or_default();
    if !status.success() {
        return Err(VideoMakerError::encode(format!(
            "ffmpeg exited with status {}: {}",
            status,
            stderr_text.trim()
        )));
    }
    Ok(())
}
