pub mod params;

use crate::config::{ImageFormat, TransformConfig};
use crate::LogoKitError;
use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, Rgba, RgbaImage};
use params::{CropRect, FitMode, TransformOptions, MAX_DIMENSION, MAX_OUTPUT_PIXELS};
use std::io::Cursor;

/// One transformed copy of a source image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageVariant {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: usize,
}

impl ImageVariant {
    /// Rebuilds variant metadata from already-encoded bytes, reading only headers.
    pub fn from_encoded(bytes: Bytes) -> Result<Self, LogoKitError> {
        let (width, height, format) = probe(&bytes)?;
        Ok(Self { size_bytes: bytes.len(), bytes, width, height, format })
    }
}

/// Decodes raw image bytes into memory-resident representation.
///
/// Returns the decoded image together with the source format when it is one
/// we can encode back to.
///
/// # Errors
/// Returns `LogoKitError::TransformError` if the format cannot be detected
/// from magic bytes or the data is corrupted.
pub fn decode_image(bytes: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>), LogoKitError> {
    let guessed = image::guess_format(bytes)
        .map_err(|e| LogoKitError::TransformError(e.to_string()))?;

    let img = image::load_from_memory_with_format(bytes, guessed)
        .map_err(|e| LogoKitError::TransformError(e.to_string()))?;

    Ok((img, supported_format(guessed)))
}

fn supported_format(format: image::ImageFormat) -> Option<ImageFormat> {
    match format {
        image::ImageFormat::WebP => Some(ImageFormat::Webp),
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::Avif => Some(ImageFormat::Avif),
        _ => None,
    }
}

/// Reads dimensions and format from encoded bytes without decoding pixels.
pub fn probe(bytes: &[u8]) -> Result<(u32, u32, ImageFormat), LogoKitError> {
    let guessed = image::guess_format(bytes)
        .map_err(|e| LogoKitError::TransformError(e.to_string()))?;
    let format = supported_format(guessed)
        .ok_or_else(|| LogoKitError::TransformError(format!("Unsupported format {:?}", guessed)))?;

    // No AVIF decoder is compiled in, so read the `ispe` property box directly.
    if format == ImageFormat::Avif {
        let (w, h) = avif_dimensions(bytes)
            .ok_or_else(|| LogoKitError::TransformError("AVIF without ispe box".into()))?;
        return Ok((w, h, format));
    }

    let (w, h) = image::ImageReader::with_format(Cursor::new(bytes), guessed)
        .into_dimensions()
        .map_err(|e| LogoKitError::TransformError(e.to_string()))?;
    Ok((w, h, format))
}

fn avif_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let pos = bytes.windows(4).position(|w| w == b"ispe")?;
    // 4 bytes of version/flags precede width and height.
    let body = bytes.get(pos + 8..pos + 16)?;
    let w = u32::from_be_bytes(body[0..4].try_into().ok()?);
    let h = u32::from_be_bytes(body[4..8].try_into().ok()?);
    Some((w, h))
}

/// Keeps only `rect` of the image.
///
/// # Errors
/// `LogoKitError::InvalidOptions` when the rectangle is not inside the image.
pub fn crop_image(img: DynamicImage, rect: CropRect) -> Result<DynamicImage, LogoKitError> {
    let (w, h) = img.dimensions();
    let fits = rect.x.checked_add(rect.width).is_some_and(|r| r <= w)
        && rect.y.checked_add(rect.height).is_some_and(|b| b <= h);
    if !fits {
        return Err(LogoKitError::InvalidOptions(format!(
            "crop {}x{}+{}+{} exceeds image {}x{}",
            rect.width, rect.height, rect.x, rect.y, w, h
        )));
    }
    Ok(img.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

/// Resizes the image according to `fit`.
///
/// With a single dimension the other one is scaled proportionally and `fit`
/// has no effect. With neither, the image is returned unchanged.
/// Lanczos3 is used throughout.
///
/// # Errors
/// `LogoKitError::InvalidOptions` when the computed output (or the
/// intermediate `cover` scales through) exceeds `MAX_DIMENSION` on either
/// edge or `MAX_OUTPUT_PIXELS` in area. Checked before anything is allocated.
pub fn resize_image(
    img: DynamicImage,
    w: Option<u32>,
    h: Option<u32>,
    fit: FitMode,
    background: [u8; 4],
) -> Result<DynamicImage, LogoKitError> {
    let (orig_w, orig_h) = img.dimensions();
    let scaled = |scale: f64| {
        (
            ((orig_w as f64 * scale).round() as u64).max(1),
            ((orig_h as f64 * scale).round() as u64).max(1),
        )
    };

    let (target_w, target_h) = match (w, h) {
        (None, None) => return Ok(img),
        (Some(w), None) => {
            let (_, h) = scaled(w as f64 / orig_w as f64);
            let (w, h) = check_output(w.max(1) as u64, h)?;
            return Ok(img.resize_exact(w, h, FilterType::Lanczos3));
        }
        (None, Some(h)) => {
            let (w, _) = scaled(h as f64 / orig_h as f64);
            let (w, h) = check_output(w, h.max(1) as u64)?;
            return Ok(img.resize_exact(w, h, FilterType::Lanczos3));
        }
        (Some(w), Some(h)) => (w, h),
    };
    check_output(target_w as u64, target_h as u64)?;

    // Scale at which the image covers the box; `cover` and `outside` both
    // pass through an image of this size.
    let covering = || {
        let (w, h) = scaled(f64::max(
            target_w as f64 / orig_w as f64,
            target_h as f64 / orig_h as f64,
        ));
        check_output(w, h)
    };

    Ok(match fit {
        FitMode::Fill => img.resize_exact(target_w, target_h, FilterType::Lanczos3),
        FitMode::Inside => img.resize(target_w, target_h, FilterType::Lanczos3),
        FitMode::Cover => {
            covering()?;
            img.resize_to_fill(target_w, target_h, FilterType::Lanczos3)
        }
        FitMode::Outside => {
            let (w, h) = covering()?;
            img.resize_exact(w, h, FilterType::Lanczos3)
        }
        FitMode::Contain => {
            let inner = img.resize(target_w, target_h, FilterType::Lanczos3).to_rgba8();
            let mut canvas = RgbaImage::from_pixel(target_w, target_h, Rgba(background));
            let x = (target_w - inner.width()) / 2;
            let y = (target_h - inner.height()) / 2;
            image::imageops::overlay(&mut canvas, &inner, x as i64, y as i64);
            DynamicImage::ImageRgba8(canvas)
        }
    })
}

fn check_output(w: u64, h: u64) -> Result<(u32, u32), LogoKitError> {
    let max = MAX_DIMENSION as u64;
    if w > max || h > max || w * h > MAX_OUTPUT_PIXELS {
        return Err(LogoKitError::InvalidOptions(format!(
            "resize would produce {}x{}, limit is {} per edge and {} pixels",
            w, h, MAX_DIMENSION, MAX_OUTPUT_PIXELS
        )));
    }
    Ok((w as u32, h as u32))
}

/// Scales the image down, keeping aspect ratio, until it fits the bounds.
/// Never upscales.
pub fn bound_image(img: DynamicImage, max_w: Option<u32>, max_h: Option<u32>) -> DynamicImage {
    let (w, h) = img.dimensions();
    let scale_w = max_w.map_or(1.0, |m| m as f64 / w as f64);
    let scale_h = max_h.map_or(1.0, |m| m as f64 / h as f64);
    let scale = scale_w.min(scale_h);
    if scale >= 1.0 {
        return img;
    }

    let new_w = ((w as f64 * scale).round() as u32).clamp(1, max_w.unwrap_or(u32::MAX));
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, max_h.unwrap_or(u32::MAX));
    img.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

/// Composites transparent pixels over an opaque background colour.
fn flatten(img: &DynamicImage, background: [u8; 4]) -> image::RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let [br, bg, bb, _] = background;
    let rgba = img.to_rgba8();
    image::RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let blend = |fg: u8, bgc: u8| -> u8 {
            ((fg as u16 * a as u16 + bgc as u16 * (255 - a as u16)) / 255) as u8
        };
        image::Rgb([blend(r, br), blend(g, bg), blend(b, bb)])
    })
}

/// Encodes image to specified format with quality control.
///
/// - **JPEG**: alpha flattened onto `background`, DCT-based lossy compression
/// - **PNG**: lossless, quality ignored
/// - **WebP**: lossy via libwebp, alpha preserved
/// - **AVIF**: RGBA with AV1 compression (slowest, best compression)
///
/// Quality is clamped to [1, 100].
///
/// # Errors
/// Returns `LogoKitError::TransformError` on encoder failures.
pub fn encode_image(
    img: &DynamicImage,
    fmt: ImageFormat,
    quality: u8,
    background: [u8; 4],
) -> Result<Vec<u8>, LogoKitError> {
    let mut out = Vec::new();
    let q = quality.clamp(1, 100);

    match fmt {
        ImageFormat::Jpeg => {
            let rgb = flatten(img, background);
            let (w, h) = rgb.dimensions();
            let enc = JpegEncoder::new_with_quality(&mut out, q);
            enc.write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| LogoKitError::TransformError(e.to_string()))?;
        }
        ImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
                .map_err(|e| LogoKitError::TransformError(e.to_string()))?;
        }
        ImageFormat::Webp => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let encoded = webp::Encoder::from_rgba(rgba.as_raw(), w, h)
                .encode_simple(false, q as f32)
                .map_err(|e| LogoKitError::TransformError(format!("webp: {:?}", e)))?;
            out.extend_from_slice(&encoded);
        }
        ImageFormat::Avif => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            // Speed 4 balances encoding time and compression ratio
            let enc = AvifEncoder::new_with_speed_quality(&mut out, 4, q);
            enc.write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                .map_err(|e| LogoKitError::TransformError(e.to_string()))?;
        }
    }

    Ok(out)
}

/// Runs the full decode, crop, resize, bound, encode chain for one derivative.
pub fn apply(
    source: &[u8],
    options: &TransformOptions,
    defaults: &TransformConfig,
) -> Result<ImageVariant, LogoKitError> {
    let (mut img, source_format) = decode_image(source)?;
    let background = options.background.unwrap_or(defaults.background);

    if let Some(rect) = options.crop {
        img = crop_image(img, rect)?;
    }
    if options.has_resize() {
        let fit = options.fit.unwrap_or(defaults.default_fit);
        img = resize_image(img, options.width, options.height, fit, background)?;
    }
    img = bound_image(img, options.max_width, options.max_height);

    let format = options.format.or(source_format).unwrap_or(ImageFormat::Png);
    let quality = options.quality.unwrap_or(defaults.default_quality);
    let encoded = encode_image(&img, format, quality, background)?;
    let (width, height) = img.dimensions();

    Ok(ImageVariant {
        size_bytes: encoded.len(),
        bytes: Bytes::from(encoded),
        width,
        height,
        format,
    })
}
