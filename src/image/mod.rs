//! Image handling: formats, preprocessing and placeholders.

pub mod encode;
mod placeholder;
mod types;

pub use encode::{prepare_image, prepare_images, EncodedImage};
pub use placeholder::{Placeholder, PlaceholderSource, FALLBACK_PLACEHOLDER_PNG};
pub use types::{GeneratedImage, GenerationMetadata, ImageFormat};
