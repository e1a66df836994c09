//! Source image preprocessing.
//!
//! Every source image of a batch is prepared once, before the first call, and
//! the encoded bytes are reused by all variants.

use crate::error::Result;
use crate::image::types::ImageFormat;
use base64::Engine;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;

/// A source image in wire-ready form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes.
    pub data: Vec<u8>,
    /// Encoding of `data`.
    pub format: ImageFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl EncodedImage {
    /// Returns the bytes as standard base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the MIME type of the encoding.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Prepares one source image.
///
/// Images already in a supported encoding and within `max_dimension` on both
/// sides pass through untouched. Larger images are downscaled with their aspect
/// ratio preserved; unsupported encodings are converted to PNG.
pub fn prepare_image(bytes: &[u8], max_dimension: u32) -> Result<EncodedImage> {
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = (decoded.width(), decoded.height());
    let detected = ImageFormat::from_magic_bytes(bytes);
    let oversized = width > max_dimension || height > max_dimension;

    if let (Some(format), false) = (detected, oversized) {
        return Ok(EncodedImage {
            data: bytes.to_vec(),
            format,
            width,
            height,
        });
    }

    let resized = if oversized {
        let scaled = decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3);
        tracing::debug!(
            from_width = width,
            from_height = height,
            to_width = scaled.width(),
            to_height = scaled.height(),
            "downscaled source image"
        );
        scaled
    } else {
        decoded
    };

    // JPEG stays JPEG; everything else is normalized to lossless PNG.
    let (target, prepared) = match detected {
        Some(ImageFormat::Jpeg) => (
            ImageFormat::Jpeg,
            DynamicImage::ImageRgb8(resized.to_rgb8()),
        ),
        _ => (ImageFormat::Png, resized),
    };

    let mut data = Vec::new();
    prepared.write_to(&mut Cursor::new(&mut data), target.to_image_crate())?;

    Ok(EncodedImage {
        width: prepared.width(),
        height: prepared.height(),
        data,
        format: target,
    })
}

/// Prepares the images of one request, preserving their order.
pub fn prepare_images<'a>(
    images: impl IntoIterator<Item = &'a [u8]>,
    max_dimension: u32,
) -> Result<Vec<EncodedImage>> {
    images
        .into_iter()
        .map(|bytes| prepare_image(bytes, max_dimension))
        .collect()
}
