//! Stand-in images for failed variants.

use crate::image::types::{data_url, ImageFormat};
use std::path::PathBuf;

/// A 1x1 transparent PNG used when the bundled asset is unavailable.
pub const FALLBACK_PLACEHOLDER_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Image shown in the slot of a failed variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Encoded bytes.
    pub data: Vec<u8>,
    /// Encoding of `data`.
    pub format: ImageFormat,
}

impl Placeholder {
    /// The hardcoded minimal placeholder.
    pub fn fallback() -> Self {
        Self {
            data: FALLBACK_PLACEHOLDER_PNG.to_vec(),
            format: ImageFormat::Png,
        }
    }

    /// Returns the placeholder as a data URL.
    pub fn to_data_url(&self) -> String {
        data_url(self.format, &self.data)
    }
}

/// Loads the placeholder asset from disk, falling back to a built-in image.
#[derive(Debug, Clone)]
pub struct PlaceholderSource {
    path: PathBuf,
}

impl PlaceholderSource {
    /// Creates a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the asset. Never fails.
    pub async fn load(&self) -> Placeholder {
        match tokio::fs::read(&self.path).await {
            Ok(data) => match ImageFormat::from_magic_bytes(&data) {
                Some(format) => Placeholder { data, format },
                None => {
                    tracing::warn!(
                        path = %self.path.display(),
                        "placeholder asset is not a recognized image, using fallback"
                    );
                    Placeholder::fallback()
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "placeholder asset unavailable, using fallback: {e}"
                );
                Placeholder::fallback()
            }
        }
    }
}
