use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::imageops::FilterType as ResizeFilter;
use image::{DynamicImage, ImageEncoder};
use log::debug;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

use crate::modules::generator::{EncodedImage, MIME_JPEG, MIME_PNG, MIME_WEBP};
use crate::utils::is_heic;

pub const MAX_LONG_SIDE: u32 = 2048;
pub const MAX_SHORT_SIDE: u32 = 768;
const JPEG_QUALITY: u8 = 85;
const WEBP_QUALITY: f32 = 80.0;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("HEIC conversion failed: {0}")]
    Heic(String),
    #[error("cannot encode image as {format}: {message}")]
    Encode { format: &'static str, message: String },
    #[error("no supported image format among {0:?}")]
    NoSupportedFormat(Vec<&'static str>),
}

/// Decode, downscale and re-encode `path` for upload.
///
/// Blocking; run it on a blocking worker.
pub fn load_for_upload(path: &Path, accepted: &[&'static str]) -> Result<EncodedImage, ImageLoadError> {
    let img = if is_heic(path) {
        debug!("Converting HEIC {}", path.display());
        let jpeg = convert_heic_to_jpeg(path)?;
        image::load_from_memory(&jpeg)?
    } else {
        image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?
    };

    let img = resize_to_fit(img, MAX_LONG_SIDE, MAX_SHORT_SIDE);
    encode_supported(&img, accepted)
}

/// Shrink `img` so neither side exceeds its cap. Never upscales.
pub fn resize_to_fit(img: DynamicImage, max_long_side: u32, max_short_side: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return img;
    }
    let (long, short) = if width >= height {
        (width, height)
    } else {
        (height, width)
    };
    let scale = f64::min(
        max_long_side as f64 / long as f64,
        max_short_side as f64 / short as f64,
    );
    if scale >= 1.0 {
        return img;
    }
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    debug!("Resizing {width}x{height} to {new_width}x{new_height}");
    img.resize_exact(new_width, new_height, ResizeFilter::Lanczos3)
}

/// Encode in the first accepted format of JPEG, PNG, WEBP.
pub fn encode_supported(img: &DynamicImage, accepted: &[&'static str]) -> Result<EncodedImage, ImageLoadError> {
    for mime_type in [MIME_JPEG, MIME_PNG, MIME_WEBP] {
        if !accepted.contains(&mime_type) {
            continue;
        }
        let bytes = match mime_type {
            MIME_JPEG => encode_jpeg(img)?,
            MIME_PNG => encode_png(img)?,
            _ => encode_webp(img)?,
        };
        return Ok(EncodedImage { bytes, mime_type });
    }
    Err(ImageLoadError::NoSupportedFormat(accepted.to_vec()))
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, ImageLoadError> {
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ColorType::Rgb8,
    )?;
    Ok(buffer)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ImageLoadError> {
    let rgba = img.to_rgba8();
    let mut buffer = Vec::new();
    PngEncoder::new_with_quality(&mut buffer, CompressionType::Fast, FilterType::Sub).write_image(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(buffer)
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>, ImageLoadError> {
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&img).map_err(|message| ImageLoadError::Encode {
        format: "webp",
        message: message.to_string(),
    })?;
    Ok(encoder.encode(WEBP_QUALITY).to_vec())
}

/// Convert a HEIC file to JPEG bytes with the platform's converter.
///
/// macOS ships `sips`; elsewhere `heif-convert` (libheif) or ImageMagick's
/// `magick` must be installed.
pub fn convert_heic_to_jpeg(path: &Path) -> Result<Vec<u8>, ImageLoadError> {
    let output = tempfile::Builder::new()
        .prefix("image-renamer-")
        .suffix(".jpg")
        .tempfile()?;
    let out_path = output.path();

    let attempts: Vec<(&str, Vec<&std::ffi::OsStr>)> = if cfg!(target_os = "macos") {
        vec![(
            "sips",
            vec![
                "-s".as_ref(),
                "format".as_ref(),
                "jpeg".as_ref(),
                path.as_os_str(),
                "--out".as_ref(),
                out_path.as_os_str(),
            ],
        )]
    } else {
        vec![
            ("heif-convert", vec![path.as_os_str(), out_path.as_os_str()]),
            ("magick", vec![path.as_os_str(), out_path.as_os_str()]),
        ]
    };

    let mut failures = Vec::new();
    for (program, args) in attempts {
        match Command::new(program).args(&args).output() {
            Ok(result) if result.status.success() => {
                debug!("Converted {} with {}", path.display(), program);
                return Ok(std::fs::read(out_path)?);
            }
            Ok(result) => failures.push(format!(
                "{program}: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )),
            Err(e) => failures.push(format!("{program}: {e}")),
        }
    }

    Err(ImageLoadError::Heic(failures.join("; ")))
}
