//! Sequential batch generation.

use crate::batch::cancel::CancellationFlag;
use crate::batch::types::{GenerationRequest, ProgressEvent, VariantResult};
use crate::batch::variation::{compose_instruction, variant_descriptor, CallParameters};
use crate::config::BatchConfig;
use crate::error::{GenBatchError, Result};
use crate::image::{prepare_images, Placeholder, PlaceholderSource};
use crate::transform::{ImageTransform, TransformRequest};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Runs batches of variant generations against one transform backend.
///
/// Calls are issued one at a time, in order, with a pause between them. A
/// failure of the first call aborts the batch; later failures are recorded as
/// [`VariantResult::Failed`] and the batch carries on.
pub struct BatchGenerator<T> {
    transform: T,
    config: BatchConfig,
    placeholders: PlaceholderSource,
}

impl<T: ImageTransform> BatchGenerator<T> {
    /// Creates a generator with default configuration.
    pub fn new(transform: T) -> Self {
        Self::with_config(transform, BatchConfig::default())
    }

    /// Creates a generator with the given configuration.
    pub fn with_config(transform: T, config: BatchConfig) -> Self {
        let placeholders = PlaceholderSource::new(&config.placeholder_path);
        Self {
            transform,
            config,
            placeholders,
        }
    }

    /// The backend.
    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// The configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Runs a batch without progress reporting or cancellation.
    pub async fn run(&self, request: &GenerationRequest) -> Result<Vec<VariantResult>> {
        self.run_with(request, |_| {}, &CancellationFlag::new()).await
    }

    /// Runs a batch, reporting each completed call to `progress`.
    ///
    /// Returns the results in call order. Stops issuing calls once `cancel` is
    /// set and returns what was collected so far.
    pub async fn run_with<P>(
        &self,
        request: &GenerationRequest,
        mut progress: P,
        cancel: &CancellationFlag,
    ) -> Result<Vec<VariantResult>>
    where
        P: FnMut(&ProgressEvent<'_>) + Send,
    {
        request.validate()?;

        // Encode once; every call of the batch reuses the same bytes.
        let images = prepare_images(request.source_images(), self.config.max_dimension)?;

        let count = request.variant_count;
        let intensity = request.intensity;
        let max_temperature = self.transform.max_temperature();
        let mut rng = StdRng::from_entropy();
        let mut call = TransformRequest::new(images, String::new());
        let placeholder: OnceCell<Placeholder> = OnceCell::new();
        let mut results = Vec::with_capacity(count);
        let mut backoff: Option<Duration> = None;

        tracing::info!(
            backend = self.transform.name(),
            count,
            %intensity,
            images = call.images.len(),
            "starting batch"
        );

        for index in 0..count {
            if cancel.is_cancelled() {
                tracing::info!(completed = results.len(), count, "batch cancelled");
                break;
            }

            let params =
                CallParameters::for_call(intensity, index, count, max_temperature, &mut rng);
            call.instruction = compose_instruction(
                &request.instruction,
                variant_descriptor(intensity, index),
            );
            call.seed = Some(params.seed);
            call.temperature = Some(params.temperature);

            tracing::debug!(
                index,
                seed = params.seed,
                temperature = params.temperature,
                "issuing transform call"
            );

            let result = match self.transform.transform(&call).await {
                Ok(image) => VariantResult::Generated {
                    index,
                    image,
                    params,
                },
                Err(e) if index == 0 => {
                    tracing::warn!(kind = %e.kind(), "first variant failed, aborting batch: {e}");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        index,
                        kind = %e.kind(),
                        retryable = e.is_retryable(),
                        "variant failed: {e}"
                    );
                    backoff = e.retry_after();
                    let placeholder = placeholder
                        .get_or_init(|| self.placeholders.load())
                        .await
                        .clone();
                    VariantResult::Failed {
                        index,
                        placeholder,
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };

            results.push(result);
            if let Some(result) = results.last() {
                progress(&ProgressEvent {
                    current: index + 1,
                    total: count,
                    result,
                });
            }

            if index + 1 < count {
                // A server hint after a failed call stretches the pause, never shortens it.
                let pacing = self.config.pacing_delay;
                let pause = backoff.take().map_or(pacing, |hint| hint.max(pacing));
                if !pause.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = cancel.cancelled() => {}
                    }
                }
            }
        }

        if results.is_empty() {
            return Err(if cancel.is_cancelled() {
                GenBatchError::Cancelled
            } else {
                GenBatchError::BatchFailed(format!("none of the {count} variants completed"))
            });
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        tracing::info!(
            succeeded,
            failed = results.len() - succeeded,
            count,
            "batch finished"
        );

        Ok(results)
    }
}
