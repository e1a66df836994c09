//! Batch variants example - four takes on one edit, with progress.
//!
//! Run with: `cargo run --example batch_variants -- <input_image.png>`
//!
//! Requires `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) environment variable.

use genbatch::{
    BatchConfig, BatchGenerator, CancellationFlag, GeminiTransform, GenerationRequest, Intensity,
    VariantResult,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> genbatch::Result<()> {
    let input_path = std::env::args()
        .nth(1)
        .expect("Usage: batch_variants <input_image.png>");

    let transform = GeminiTransform::builder().build()?;
    let config = BatchConfig::from_env().with_pacing_delay(Duration::from_millis(1000));
    let generator = BatchGenerator::with_config(transform, config);

    let request = GenerationRequest::new(
        std::fs::read(&input_path)?,
        "Turn the scene into a rainy evening",
    )
    .with_variant_count(4)
    .with_intensity(Intensity::Dramatic);

    let cancel = CancellationFlag::new();
    let results = generator
        .run_with(
            &request,
            |event| println!("{}/{} done", event.current, event.total),
            &cancel,
        )
        .await?;

    for result in &results {
        match result {
            VariantResult::Generated { index, image, params } => {
                let path = format!("variant-{}.{}", index + 1, image.format.extension());
                image.save(&path)?;
                println!(
                    "{path}: seed {} temperature {:.2}",
                    params.seed, params.temperature
                );
            }
            VariantResult::Failed { index, message, .. } => {
                println!("variant {} failed: {message}", index + 1);
            }
        }
    }

    Ok(())
}
