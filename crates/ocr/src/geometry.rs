use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bizscan_core::document::lowercase_extension;
use bizscan_core::IMAGE_EXTENSIONS;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;
use tracing::{debug, error, instrument};

const JPEG_QUALITY: u8 = 95;
/// `optimal_size` searches ratios in steps of 1/RATIO_STEPS.
const RATIO_STEPS: u64 = 1000;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Not an image file: {0}")]
    NotAnImage(PathBuf),
    #[error("Unsupported output format {0:?}: only png and jpeg are allowed")]
    UnsupportedFormat(String),
    #[error("Crop ratio {0} is outside (0, 1]")]
    InvalidRatio(f64),
    #[error("Range {start}..{end} is invalid for an extent of {extent}")]
    InvalidRange { start: u32, end: u32, extent: u32 },
    #[error("Operation would leave an empty image")]
    EmptyResult,
    #[error("Invalid size bounds {width}x{height}")]
    InvalidBounds { width: u32, height: u32 },
    #[error("{path} does not fit within {max_width}x{max_height} at any ratio")]
    NoFit { path: PathBuf, max_width: u32, max_height: u32 },
    #[error("Output was not written as an image: {0}")]
    OutputMissing(PathBuf),
    #[error("Download failed with status {0}")]
    Status(u16),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Encodings the toolkit writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl FromStr for OutputFormat {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" => Ok(Self::Jpeg),
            _ => Err(GeometryError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl OutputFormat {
    /// Format implied by a file's extension.
    fn for_path(path: &Path) -> Option<Self> {
        match lowercase_extension(path)?.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// True iff `path` is an existing regular file with a png/jpg/jpeg extension.
/// The content is not inspected.
pub fn is_image(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let ok = lowercase_extension(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
    if !ok {
        error!(path = %path.display(), "Not an image file");
    }
    ok
}

fn require_image(path: &Path) -> Result<(), GeometryError> {
    if is_image(path) {
        Ok(())
    } else {
        Err(GeometryError::NotAnImage(path.to_path_buf()))
    }
}

fn write_as(img: &DynamicImage, path: &Path, format: OutputFormat) -> Result<(), GeometryError> {
    match format {
        OutputFormat::Png => img.save_with_format(path, ImageFormat::Png)?,
        OutputFormat::Jpeg => {
            let out = BufWriter::new(File::create(path)?);
            let encoder = JpegEncoder::new_with_quality(out, JPEG_QUALITY);
            // JPEG carries no alpha channel.
            img.to_rgb8().write_with_encoder(encoder)?;
        }
    }
    Ok(())
}

/// Write back in the encoding the file's own extension names.
fn overwrite(img: &DynamicImage, path: &Path) -> Result<(), GeometryError> {
    let format = OutputFormat::for_path(path).ok_or_else(|| GeometryError::NotAnImage(path.to_path_buf()))?;
    write_as(img, path, format)
}

// ── Cropping ──────────────────────────────────────────────────────────────────

/// Keep the top-left `floor(w * x_ratio) x floor(h * y_ratio)` region, in place.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn crop_by_ratio(path: &Path, x_ratio: f64, y_ratio: f64) -> Result<(), GeometryError> {
    require_image(path)?;
    for ratio in [x_ratio, y_ratio] {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(GeometryError::InvalidRatio(ratio));
        }
    }

    let img = image::open(path)?;
    let width = (f64::from(img.width()) * x_ratio).floor() as u32;
    let height = (f64::from(img.height()) * y_ratio).floor() as u32;
    if width == 0 || height == 0 {
        return Err(GeometryError::EmptyResult);
    }

    overwrite(&img.crop_imm(0, 0, width, height), path)?;
    debug!(width, height, "Cropped");
    require_image(path)
}

fn check_range(start: u32, end: u32, extent: u32) -> Result<(), GeometryError> {
    if start > end || end > extent {
        return Err(GeometryError::InvalidRange { start, end, extent });
    }
    if end - start == extent {
        return Err(GeometryError::EmptyResult);
    }
    Ok(())
}

/// Delete rows `[y1, y2)` and close the gap, in place.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn crop_rows(path: &Path, y1: u32, y2: u32) -> Result<(), GeometryError> {
    require_image(path)?;
    let src = image::open(path)?.to_rgba8();
    check_range(y1, y2, src.height())?;

    let cut = y2 - y1;
    let out = RgbaImage::from_fn(src.width(), src.height() - cut, |x, y| {
        *src.get_pixel(x, if y < y1 { y } else { y + cut })
    });
    overwrite(&DynamicImage::ImageRgba8(out), path)?;
    require_image(path)
}

/// Delete columns `[x1, x2)` and close the gap, in place.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn crop_cols(path: &Path, x1: u32, x2: u32) -> Result<(), GeometryError> {
    require_image(path)?;
    let src = image::open(path)?.to_rgba8();
    check_range(x1, x2, src.width())?;

    let cut = x2 - x1;
    let out = RgbaImage::from_fn(src.width() - cut, src.height(), |x, y| {
        *src.get_pixel(if x < x1 { x } else { x + cut }, y)
    });
    overwrite(&DynamicImage::ImageRgba8(out), path)?;
    require_image(path)
}

// ── Composition and scaling ───────────────────────────────────────────────────

/// Blend `overlay_path` over `source_path` at the given offset and save the
/// result, sized like the source, to `save_path`. The overlay is clipped.
#[instrument(skip_all, fields(source = %source_path.display(), overlay = %overlay_path.display()))]
pub fn composite(
    source_path: &Path,
    overlay_path: &Path,
    save_path: &Path,
    x_offset: i64,
    y_offset: i64,
) -> Result<(), GeometryError> {
    require_image(source_path)?;
    require_image(overlay_path)?;
    let format = OutputFormat::for_path(save_path)
        .ok_or_else(|| GeometryError::NotAnImage(save_path.to_path_buf()))?;

    let source = image::open(source_path)?.to_rgba8();
    let overlay = image::open(overlay_path)?.to_rgba8();

    let mut canvas = RgbaImage::new(source.width(), source.height());
    imageops::overlay(&mut canvas, &source, 0, 0);
    imageops::overlay(&mut canvas, &overlay, x_offset, y_offset);

    write_as(&DynamicImage::ImageRgba8(canvas), save_path, format)
}

/// Resample to exactly `width x height` and save as `format` ("png" or "jpeg").
#[instrument(skip_all, fields(path = %path.display(), save = %save_path.display()))]
pub fn resize(
    path: &Path,
    width: u32,
    height: u32,
    format: &str,
    save_path: &Path,
) -> Result<(), GeometryError> {
    require_image(path)?;
    let format = format.parse::<OutputFormat>().inspect_err(|e| error!("{e}"))?;
    if width == 0 || height == 0 {
        return Err(GeometryError::InvalidBounds { width, height });
    }

    let img = image::open(path)?;
    let resized = img.resize_exact(width, height, FilterType::CatmullRom);
    write_as(&resized, save_path, format)?;

    if !is_image(save_path) {
        error!(save = %save_path.display(), "Resized image was not created");
        return Err(GeometryError::OutputMissing(save_path.to_path_buf()));
    }
    Ok(())
}

/// Largest `(w, h)` with the original aspect ratio that fits within the bounds.
///
/// The scale factor is `n / 1000` for the largest positive integer `n` with
/// `w * n / 1000 <= max_width` and `h * n / 1000 <= max_height`; the returned
/// dimensions are the floored products. Works for shrinking and enlarging.
pub fn optimal_size(path: &Path, max_width: u32, max_height: u32) -> Result<(u32, u32), GeometryError> {
    require_image(path)?;
    if max_width == 0 || max_height == 0 {
        return Err(GeometryError::InvalidBounds { width: max_width, height: max_height });
    }

    let (width, height) = image::image_dimensions(path)?;
    if width == 0 || height == 0 {
        return Err(GeometryError::EmptyResult);
    }
    let (w, h) = (u64::from(width), u64::from(height));

    let steps = (u64::from(max_width) * RATIO_STEPS / w).min(u64::from(max_height) * RATIO_STEPS / h);
    if steps == 0 {
        return Err(GeometryError::NoFit { path: path.to_path_buf(), max_width, max_height });
    }

    // Both products are bounded by the max dimensions, so they fit in u32.
    let fit = ((w * steps / RATIO_STEPS) as u32, (h * steps / RATIO_STEPS) as u32);
    debug!(width, height, steps, fit_width = fit.0, fit_height = fit.1, "Optimal size");
    Ok(fit)
}

/// Download an image and save it as `format` ("png" or "jpeg").
#[instrument(skip_all, fields(save = %save_path.display()))]
pub fn fetch_image(url: &str, save_path: &Path, format: &str) -> Result<(), GeometryError> {
    let format = format.parse::<OutputFormat>()?;

    let response = reqwest::blocking::get(url)?;
    let status = response.status().as_u16();
    if status != 200 && status != 201 {
        error!(status, "Image download failed");
        return Err(GeometryError::Status(status));
    }
    let bytes = response.bytes()?;

    let img = image::load_from_memory(&bytes)?;
    write_as(&img, save_path, format)?;

    if !is_image(save_path) {
        error!("Downloaded image was not created");
        return Err(GeometryError::OutputMissing(save_path.to_path_buf()));
    }
    Ok(())
}
