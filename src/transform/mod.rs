//! The external image transform and its backends.

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiModel, GeminiTransform, GeminiTransformBuilder};

use crate::error::Result;
use crate::image::{EncodedImage, GeneratedImage};
use async_trait::async_trait;
use std::sync::Arc;

/// Upper temperature bound assumed when a backend does not say otherwise.
pub const DEFAULT_MAX_TEMPERATURE: f32 = 2.0;

/// One call to the external transform.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Source images, primary first.
    pub images: Vec<EncodedImage>,
    /// Full instruction sent to the model.
    pub instruction: String,
    /// Sampling seed.
    pub seed: Option<u64>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl TransformRequest {
    /// Creates a request with the given images and instruction.
    pub fn new(images: Vec<EncodedImage>, instruction: impl Into<String>) -> Self {
        Self {
            images,
            instruction: instruction.into(),
            seed: None,
            temperature: None,
        }
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Maps source images plus an instruction to a new image.
///
/// This is the only network boundary the batch orchestrator depends on.
#[async_trait]
pub trait ImageTransform: Send + Sync {
    /// Produces one image.
    async fn transform(&self, request: &TransformRequest) -> Result<GeneratedImage>;

    /// Returns the name of this backend for display.
    fn name(&self) -> &str;

    /// Highest temperature the backend accepts.
    fn max_temperature(&self) -> f32 {
        DEFAULT_MAX_TEMPERATURE
    }

    /// Checks if the backend is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}

#[async_trait]
impl<T: ImageTransform + ?Sized> ImageTransform for Arc<T> {
    async fn transform(&self, request: &TransformRequest) -> Result<GeneratedImage> {
        (**self).transform(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn max_temperature(&self) -> f32 {
        (**self).max_temperature()
    }

    async fn health_check(&self) -> Result<()> {
        (**self).health_check().await
    }
}
