use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use tracing::{debug, warn};

use crate::config::FallbackPolicy;
use crate::error::{VideoMakerError, VideoMakerResult};
use crate::tempfiles::temp_frame_path;

/// Aspect ratios closer than this are stretched instead of padded.
pub const ASPECT_TOLERANCE: f64 = 0.01;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Output geometry and encoding quality of a normalized frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            jpeg_quality: 95,
        }
    }
}

impl FrameSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, jpeg_quality: u8) -> Self {
        self.jpeg_quality = jpeg_quality;
        self
    }
}

/// What the pipeline feeds to the encoder for one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedFrame {
    /// A freshly written temporary frame owned by the run.
    Temporary(PathBuf),
    /// Normalization failed; the untouched source file is used instead.
    Original(PathBuf),
}

impl NormalizedFrame {
    pub fn path(&self) -> &Path {
        match self {
            Self::Temporary(p) | Self::Original(p) => p,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

#[inline]
fn mul_div255(v: u16, a: u16) -> u8 {
    ((v * a + 127) / 255) as u8
}

/// Composite any alpha onto black and return a fresh 8-bit RGB buffer.
///
/// Grayscale, 16-bit and float sources all come out as plain RGB8 with no
/// colour profile attached.
pub fn flatten_to_rgb(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let a = p[3] as u16;
        Rgb([
            mul_div255(p[0] as u16, a),
            mul_div255(p[1] as u16, a),
            mul_div255(p[2] as u16, a),
        ])
    })
}

/// Portrait images are centred horizontally on a black square as tall as they are.
pub fn square_portrait(img: RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    if h <= w {
        return img;
    }
    let mut canvas = RgbImage::from_pixel(h, h, BLACK);
    imageops::replace(&mut canvas, &img, ((h - w) / 2) as i64, 0);
    canvas
}

/// Largest size with the source's aspect ratio that fits inside the target.
pub fn fit_dimensions(width: u32, height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    let ratio = f64::min(
        target_width as f64 / width as f64,
        target_height as f64 / height as f64,
    );
    let w = ((width as f64 * ratio) as u32).clamp(1, target_width);
    let h = ((height as f64 * ratio) as u32).clamp(1, target_height);
    (w, h)
}

/// Resize and pad a decoded image to exactly `width` x `height`.
pub fn normalize_image(img: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let rgb = square_portrait(flatten_to_rgb(img));
    let (w, h) = rgb.dimensions();

    let img_ratio = w as f64 / h as f64;
    let target_ratio = width as f64 / height as f64;
    if (img_ratio - target_ratio).abs() < ASPECT_TOLERANCE {
        return imageops::resize(&rgb, width, height, FilterType::Lanczos3);
    }

    let (new_w, new_h) = fit_dimensions(w, h, width, height);
    let scaled = imageops::resize(&rgb, new_w, new_h, FilterType::Lanczos3);
    let mut canvas = RgbImage::from_pixel(width, height, BLACK);
    imageops::replace(
        &mut canvas,
        &scaled,
        ((width - new_w) / 2) as i64,
        ((height - new_h) / 2) as i64,
    );
    canvas
}

pub fn write_jpeg(img: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(img)
        .with_context(|| format!("encoding {}", path.display()))?;
    writer.flush().with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Decode `source`, normalize it and write the temporary frame next to it.
pub fn normalize_to_temp(source: &Path, spec: &FrameSpec) -> Result<PathBuf> {
    let img = ImageReader::open(source)
        .with_context(|| format!("opening {}", source.display()))?
        .with_guessed_format()
        .with_context(|| format!("reading {}", source.display()))?
        .decode()
        .with_context(|| format!("decoding {}", source.display()))?;

    let frame = normalize_image(&img, spec.width, spec.height);
    let out = temp_frame_path(source);
    if let Err(e) = write_jpeg(&frame, &out, spec.jpeg_quality) {
        // A half-written frame is not tracked by anyone yet.
        let _ = fs::remove_file(&out);
        return Err(e);
    }
    debug!(
        source = %source.display(),
        frame = %out.display(),
        width = img.width(),
        height = img.height(),
        "normalized image"
    );
    Ok(out)
}

/// Normalize one image, applying `policy` when it cannot be processed.
pub fn normalize_frame(
    source: &Path,
    spec: &FrameSpec,
    policy: FallbackPolicy,
) -> VideoMakerResult<NormalizedFrame> {
    match normalize_to_temp(source, spec) {
        Ok(path) => Ok(NormalizedFrame::Temporary(path)),
        Err(e) => match policy {
            FallbackPolicy::UseOriginal => {
                warn!(
                    source = %source.display(),
                    error = %format!("{e:#}"),
                    "could not normalize image, using the original file"
                );
                Ok(NormalizedFrame::Original(source.to_path_buf()))
            }
            FallbackPolicy::Abort => Err(VideoMakerError::image(source, &e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn solid(w: u32, h: u32, px: Rgb<u8>) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, px))
    }

    fn is_black(px: &Rgb<u8>) -> bool {
        px.0.iter().all(|&c| c < 8)
    }

    fn bright_span(img: &RgbImage, y: u32) -> (u32, u32) {
        let xs: Vec<u32> = (0..img.width()).filter(|&x| img.get_pixel(x, y)[0] > 127).collect();
        (*xs.first().unwrap(), *xs.last().unwrap())
    }

    #[test]
    fn output_always_has_target_size() {
        for (w, h) in [(1, 1), (17, 3), (3, 17), (640, 480), (1920, 1080), (4000, 1000)] {
            let out = normalize_image(&solid(w, h, WHITE), 320, 180);
            assert_eq!(out.dimensions(), (320, 180), "source {w}x{h}");
        }
    }

    #[test]
    fn matching_ratio_fills_the_canvas() {
        // 100x56 is within 1% of 16:9 and is stretched rather than padded.
        for (w, h) in [(64, 36), (100, 56)] {
            let out = normalize_image(&solid(w, h, Rgb([220, 10, 10])), 320, 180);
            assert!(
                out.pixels().all(|p| p[0] > 200 && p[1] < 40 && p[2] < 40),
                "padding found for {w}x{h}"
            );
        }
    }

    #[test]
    fn wide_image_is_letterboxed_symmetrically() {
        let out = normalize_image(&solid(200, 50, WHITE), 320, 180);
        // scaled to 320x80, 50 rows of black above and below
        for y in (0..45).chain(135..180) {
            assert!(out.pixels().skip((y * 320) as usize).take(320).all(is_black), "row {y}");
        }
        for y in 55..125 {
            assert_eq!(bright_span(&out, y), (0, 319));
        }
    }

    #[test]
    fn narrow_landscape_is_pillarboxed_symmetrically() {
        let out = normalize_image(&solid(400, 400 * 3 / 4, WHITE), 320, 180);
        // 4:3 fits as 240x180, 40 black columns each side
        let (left, right) = bright_span(&out, 90);
        assert_eq!(left, 40);
        assert_eq!(319 - right, 40);
        assert!(is_black(out.get_pixel(0, 90)));
        assert!(is_black(out.get_pixel(319, 90)));
    }

    #[test]
    fn portrait_is_squared_before_scaling() {
        let squared = square_portrait(RgbImage::from_pixel(60, 120, WHITE));
        assert_eq!(squared.dimensions(), (120, 120));
        assert_eq!(bright_span(&squared, 60), (30, 89));

        let out = normalize_image(&solid(60, 120, WHITE), 320, 180);
        let (left, right) = bright_span(&out, 90);
        let right_pad = 319 - right;
        assert!(left.abs_diff(right_pad) <= 1, "left {left} right {right_pad}");
        // 180x180 square centred at x=70, content in its middle half
        assert!((113..=117).contains(&left), "left edge at {left}");
    }

    #[test]
    fn landscape_is_not_squared() {
        let img = RgbImage::from_pixel(120, 60, WHITE);
        assert_eq!(square_portrait(img).dimensions(), (120, 60));
    }

    #[test]
    fn alpha_is_composited_on_black() {
        let mut rgba = RgbaImage::new(3, 1);
        rgba.put_pixel(0, 0, Rgba([255, 255, 255, 0]));
        rgba.put_pixel(1, 0, Rgba([200, 100, 50, 255]));
        rgba.put_pixel(2, 0, Rgba([200, 100, 50, 128]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([200, 100, 50]));
        assert_eq!(*rgb.get_pixel(2, 0), Rgb([100, 50, 25]));
    }

    #[test]
    fn grayscale_becomes_rgb() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([90])));
        let rgb = flatten_to_rgb(&gray);
        assert!(rgb.pixels().all(|p| *p == Rgb([90, 90, 90])));
    }

    #[test]
    fn fit_never_exceeds_target() {
        assert_eq!(fit_dimensions(400, 300, 320, 180), (240, 180));
        assert_eq!(fit_dimensions(200, 50, 320, 180), (320, 80));
        assert_eq!(fit_dimensions(10_000, 1, 320, 180), (320, 1));
    }

    #[test]
    fn temp_frame_is_written_next_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("wide.png");
        solid(200, 50, WHITE).save(&src).unwrap();

        let spec = FrameSpec::new(320, 180);
        let frame = normalize_frame(&src, &spec, FallbackPolicy::UseOriginal).unwrap();
        assert_eq!(frame, NormalizedFrame::Temporary(dir.path().join("wide_png_temp.jpg")));

        let written = image::open(frame.path()).unwrap();
        assert_eq!((written.width(), written.height()), (320, 180));
    }

    #[test]
    fn sources_differing_in_extension_case_keep_their_own_frames() {
        let dir = tempfile::tempdir().unwrap();
        let red = dir.path().join("a.PNG");
        let green = dir.path().join("a.png");
        solid(64, 36, Rgb([255, 0, 0])).save(&red).unwrap();
        solid(64, 36, Rgb([0, 255, 0])).save(&green).unwrap();

        let spec = FrameSpec::new(64, 36);
        let first = normalize_frame(&red, &spec, FallbackPolicy::Abort).unwrap();
        let second = normalize_frame(&green, &spec, FallbackPolicy::Abort).unwrap();
        assert_ne!(first.path(), second.path());

        let first_px = *image::open(first.path()).unwrap().to_rgb8().get_pixel(32, 18);
        let second_px = *image::open(second.path()).unwrap().to_rgb8().get_pixel(32, 18);
        assert!(first_px[0] > 200 && first_px[1] < 60, "{first_px:?}");
        assert!(second_px[1] > 200 && second_px[0] < 60, "{second_px:?}");
    }

    #[test]
    fn broken_image_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        fs::write(&src, b"definitely not a png").unwrap();

        let frame = normalize_frame(&src, &FrameSpec::new(320, 180), FallbackPolicy::UseOriginal).unwrap();
        assert_eq!(frame, NormalizedFrame::Original(src.clone()));
        assert!(!frame.is_temporary());
        assert!(!temp_frame_path(&src).exists());
    }

    #[test]
    fn broken_image_aborts_under_strict_policy() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.jpg");
        fs::write(&src, b"\xff\xd8 truncated").unwrap();

        let err = normalize_frame(&src, &FrameSpec::new(320, 180), FallbackPolicy::Abort).unwrap_err();
        assert!(matches!(err, VideoMakerError::Image { .. }));
        assert!(src.exists());
    }
}
