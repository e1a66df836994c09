//! Batch variant generation.

mod cancel;
mod orchestrator;
mod types;
pub mod variation;

pub use cancel::CancellationFlag;
pub use orchestrator::BatchGenerator;
pub use types::{
    parse_tagged_uri, GenerationRequest, ProgressEvent, VariantResult, ERROR_TAG,
    MAX_AUXILIARY_IMAGES,
};
pub use variation::{CallParameters, Intensity};
