//! CLI for genbatch - batch variant generation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use genbatch::batch::variation::{temperature_for, variant_descriptor};
use genbatch::{
    BatchConfig, BatchGenerator, CancellationFlag, GeminiModel, GeminiTransform,
    GenerationRequest, ImageTransform, Intensity, VariantResult,
};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Exit status after a second Ctrl-C (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "genbatch")]
#[command(about = "Generate several AI-edited variants of an image in one batch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug details (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate variants of an edit
    Vary(VaryArgs),

    /// Check that the backend is reachable and the API key is accepted
    Check(BackendArgs),

    /// List intensity tiers and their style descriptors
    Intensities,
}

#[derive(Args)]
struct VaryArgs {
    /// The edit instruction
    instruction: String,

    /// Image to edit
    #[arg(short, long)]
    input: PathBuf,

    /// Additional reference image (up to two)
    #[arg(long = "aux", value_name = "PATH")]
    auxiliary: Vec<PathBuf>,

    /// Number of variants
    #[arg(short = 'n', long, default_value_t = 4)]
    count: usize,

    /// How far variants diverge
    #[arg(long, value_enum, default_value = "moderate")]
    intensity: IntensityArg,

    /// Directory for the variant files
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Pause between calls in milliseconds (default 1500 or GENBATCH_PACING_MS)
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Downscale sources larger than this (default 2048 or GENBATCH_MAX_DIMENSION)
    #[arg(long)]
    max_dimension: Option<u32>,

    /// Placeholder image for failed variants
    #[arg(long)]
    placeholder: Option<PathBuf>,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args)]
struct BackendArgs {
    /// Gemini model
    #[arg(short, long, value_enum, default_value = "nano-banana")]
    model: ModelArg,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IntensityArg {
    Subtle,
    Moderate,
    Dramatic,
}

impl From<IntensityArg> for Intensity {
    fn from(arg: IntensityArg) -> Self {
        match arg {
            IntensityArg::Subtle => Intensity::Subtle,
            IntensityArg::Moderate => Intensity::Moderate,
            IntensityArg::Dramatic => Intensity::Dramatic,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    NanoBanana,
    NanoBananaPro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => GeminiModel::NanoBananaPro,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    genbatch::logging::init(cli.verbose);

    match cli.command {
        Commands::Vary(args) => {
            vary(args, cli.json).await?;
        }
        Commands::Check(args) => {
            check(args, cli.json).await?;
        }
        Commands::Intensities => {
            list_intensities(cli.json)?;
        }
    }

    Ok(())
}

fn build_transform(args: &BackendArgs) -> anyhow::Result<GeminiTransform> {
    let mut builder = GeminiTransform::builder().model(args.model.into());
    if let Some(secs) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

async fn vary(args: VaryArgs, json_output: bool) -> anyhow::Result<()> {
    let mut config = BatchConfig::from_env();
    if let Some(ms) = args.pacing_ms {
        config = config.with_pacing_delay(Duration::from_millis(ms));
    }
    if let Some(px) = args.max_dimension {
        config = config.with_max_dimension(px);
    }
    if let Some(path) = args.placeholder {
        config = config.with_placeholder_path(path);
    }

    let mut request = GenerationRequest::new(std::fs::read(&args.input)?, &args.instruction)
        .with_variant_count(args.count)
        .with_intensity(args.intensity.into());
    for path in &args.auxiliary {
        request = request.with_auxiliary_image(std::fs::read(path)?);
    }

    std::fs::create_dir_all(&args.output_dir)?;

    let generator = BatchGenerator::with_config(build_transform(&args.backend)?, config);

    let cancel = CancellationFlag::new();
    tokio::spawn(watch_ctrl_c(cancel.clone()));

    let results = generator
        .run_with(
            &request,
            |event| {
                let status = match event.result.error_message() {
                    None => "ok".to_string(),
                    Some(message) => format!("failed: {message}"),
                };
                eprintln!("[{}/{}] {}", event.current, event.total, status);
            },
            &cancel,
        )
        .await?;

    let mut written = Vec::with_capacity(results.len());
    for result in &results {
        let (path, bytes) = match result {
            VariantResult::Generated { index, image, .. } => (
                args.output_dir
                    .join(format!("variant-{:02}.{}", index + 1, image.format.extension())),
                &image.data,
            ),
            VariantResult::Failed {
                index, placeholder, ..
            } => (
                args.output_dir.join(format!(
                    "variant-{:02}-failed.{}",
                    index + 1,
                    placeholder.format.extension()
                )),
                &placeholder.data,
            ),
        };
        std::fs::write(&path, bytes)?;
        written.push(path);
    }

    let succeeded = results.iter().filter(|r| r.is_ok()).count();

    if json_output {
        let variants: Vec<_> = results
            .iter()
            .zip(&written)
            .map(|(result, path)| match result {
                VariantResult::Generated {
                    index,
                    image,
                    params,
                } => serde_json::json!({
                    "index": index,
                    "success": true,
                    "output": path.display().to_string(),
                    "size_bytes": image.size(),
                    "seed": params.seed,
                    "temperature": params.temperature,
                    "duration_ms": image.metadata.duration_ms,
                }),
                VariantResult::Failed {
                    index,
                    kind,
                    message,
                    ..
                } => serde_json::json!({
                    "index": index,
                    "success": false,
                    "output": path.display().to_string(),
                    "error_kind": kind,
                    "error": message,
                }),
            })
            .collect();
        let summary = serde_json::json!({
            "requested": args.count,
            "completed": results.len(),
            "succeeded": succeeded,
            "cancelled": cancel.is_cancelled(),
            "variants": variants,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Generated {}/{} variants in {} via {}",
            succeeded,
            args.count,
            args.output_dir.display(),
            generator.transform().name()
        );
        for path in &written {
            println!("  {}", path.display());
        }
    }

    Ok(())
}

async fn watch_ctrl_c(cancel: CancellationFlag) {
    let next = || async { tokio::signal::ctrl_c().await.is_ok() };
    if let Some(code) = handle_interrupts(next, &cancel).await {
        eprintln!("Interrupted");
        std::process::exit(code);
    }
}

/// First interrupt cancels the batch, the second asks to exit.
///
/// Returns the exit code on a second interrupt, or `None` once `next_interrupt`
/// reports that no more interrupts can arrive.
async fn handle_interrupts<F, Fut>(mut next_interrupt: F, cancel: &CancellationFlag) -> Option<i32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut pressed = false;
    while next_interrupt().await {
        if pressed {
            return Some(INTERRUPTED_EXIT_CODE);
        }
        pressed = true;
        eprintln!("Cancelling after the current variant (Ctrl-C again to quit)...");
        cancel.cancel();
    }
    None
}

async fn check(args: BackendArgs, json_output: bool) -> anyhow::Result<()> {
    let transform = build_transform(&args)?;
    let model = GeminiModel::from(args.model).as_str();
    let outcome = transform.health_check().await;

    if json_output {
        let result = serde_json::json!({
            "backend": transform.name(),
            "model": model,
            "healthy": outcome.is_ok(),
            "error": outcome.as_ref().err().map(|e| e.to_string()),
            "error_kind": outcome.as_ref().err().map(|e| e.kind()),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &outcome {
            Ok(()) => println!("✓ {} ({}) is reachable", transform.name(), model),
            Err(e) => println!("✗ {} ({}): {}", transform.name(), model, e),
        }
    }

    outcome.map_err(Into::into)
}

fn list_intensities(json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct TierInfo {
        name: &'static str,
        temperature_min: f32,
        temperature_max: f32,
        descriptors: &'static [&'static str],
    }

    let tiers: Vec<TierInfo> = Intensity::ALL
        .iter()
        .map(|&intensity| TierInfo {
            name: intensity.as_str(),
            temperature_min: temperature_for(intensity, 0, 2, f32::MAX),
            temperature_max: temperature_for(intensity, 1, 2, f32::MAX),
            descriptors: intensity.descriptors(),
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&tiers)?);
    } else {
        for (tier, intensity) in tiers.iter().zip(Intensity::ALL) {
            println!(
                "{} (temperature {:.2}-{:.2})",
                tier.name, tier.temperature_min, tier.temperature_max
            );
            for i in 0..tier.descriptors.len() {
                println!("  {}. {}", i + 1, variant_descriptor(intensity, i));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interrupts(count: usize) -> impl FnMut() -> std::future::Ready<bool> {
        let mut remaining = count;
        move || {
            let more = remaining > 0;
            remaining = remaining.saturating_sub(1);
            std::future::ready(more)
        }
    }

    #[tokio::test]
    async fn test_second_interrupt_exits() {
        let cancel = CancellationFlag::new();
        let code = handle_interrupts(interrupts(2), &cancel).await;
        assert_eq!(code, Some(INTERRUPTED_EXIT_CODE));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_single_interrupt_only_cancels() {
        let cancel = CancellationFlag::new();
        let code = handle_interrupts(interrupts(1), &cancel).await;
        assert_eq!(code, None);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_no_interrupt_leaves_batch_running() {
        let cancel = CancellationFlag::new();
        assert_eq!(handle_interrupts(interrupts(0), &cancel).await, None);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_vary_args_parse() {
        let cli = Cli::try_parse_from([
            "genbatch", "vary", "Make it autumn", "-i", "in.png", "--aux", "ref.png", "-n", "3",
            "--intensity", "dramatic", "-o", "out",
        ])
        .unwrap();
        match cli.command {
            Commands::Vary(args) => {
                assert_eq!(args.count, 3);
                assert_eq!(args.auxiliary, vec![PathBuf::from("ref.png")]);
                assert_eq!(Intensity::from(args.intensity), Intensity::Dramatic);
            }
            _ => panic!("expected vary"),
        }
    }
}
