#![warn(missing_docs)]
//! genbatch - batch variant generation over AI image-editing APIs.
//!
//! A [`BatchGenerator`] takes one edit request and asks an [`ImageTransform`]
//! backend for several variants of it, one call at a time. Each call gets its
//! own style descriptor, a random seed and a temperature taken from a ramp, so
//! the variants spread out in a controlled way. Failures after the first
//! variant are kept in place as placeholders instead of stopping the batch.
//!
//! # Quick Start
//!
//! ```no_run
//! use genbatch::{BatchGenerator, GeminiTransform, GenerationRequest, Intensity};
//!
//! #[tokio::main]
//! async fn main() -> genbatch::Result<()> {
//!     let transform = GeminiTransform::builder().build()?;
//!     let generator = BatchGenerator::new(transform);
//!
//!     let request = GenerationRequest::new(std::fs::read("photo.png")?, "Make it autumn")
//!         .with_variant_count(4)
//!         .with_intensity(Intensity::Moderate);
//!
//!     for variant in generator.run(&request).await? {
//!         println!("variant {}: ok = {}", variant.index(), variant.is_ok());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini` (default): Gemini backend
//! - `cli`: command-line interface

mod config;
mod error;

pub mod batch;
pub mod image;
pub mod transform;

#[cfg(feature = "cli")]
#[doc(hidden)]
pub mod logging;

pub use batch::{
    BatchGenerator, CallParameters, CancellationFlag, GenerationRequest, Intensity,
    ProgressEvent, VariantResult,
};
pub use config::{
    BatchConfig, DEFAULT_MAX_DIMENSION, DEFAULT_PACING_DELAY, DEFAULT_PLACEHOLDER_PATH,
};
pub use error::{ErrorKind, GenBatchError, Result};
pub use image::{EncodedImage, GeneratedImage, GenerationMetadata, ImageFormat, Placeholder};
pub use transform::{ImageTransform, TransformRequest};

#[cfg(feature = "gemini")]
pub use transform::{GeminiModel, GeminiTransform, GeminiTransformBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::batch::{
        BatchGenerator, CancellationFlag, GenerationRequest, Intensity, ProgressEvent,
        VariantResult,
    };
    pub use crate::config::BatchConfig;
    pub use crate::error::{ErrorKind, GenBatchError, Result};
    pub use crate::transform::{ImageTransform, TransformRequest};

    #[cfg(feature = "gemini")]
    pub use crate::transform::GeminiTransform;
}
