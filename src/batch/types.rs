//! Batch request, result and progress types.

use crate::batch::variation::{CallParameters, Intensity};
use crate::error::{ErrorKind, GenBatchError, Result};
use crate::image::{GeneratedImage, Placeholder};

/// Maximum number of auxiliary images in one request.
pub const MAX_AUXILIARY_IMAGES: usize = 2;

/// Separator between a placeholder URI and its error message in a tagged URI.
pub const ERROR_TAG: &str = "#genbatch-error=";

/// A request for several variants of one edit.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Image being edited (raw bytes).
    pub primary_image: Vec<u8>,
    /// Additional reference images, sent after the primary one.
    pub auxiliary_images: Vec<Vec<u8>>,
    /// The user's instruction.
    pub instruction: String,
    /// Number of variants to produce.
    pub variant_count: usize,
    /// How far variants diverge.
    pub intensity: Intensity,
}

impl GenerationRequest {
    /// Creates a single-variant request at moderate intensity.
    pub fn new(primary_image: Vec<u8>, instruction: impl Into<String>) -> Self {
        Self {
            primary_image,
            auxiliary_images: Vec::new(),
            instruction: instruction.into(),
            variant_count: 1,
            intensity: Intensity::default(),
        }
    }

    /// Adds an auxiliary image.
    pub fn with_auxiliary_image(mut self, image: Vec<u8>) -> Self {
        self.auxiliary_images.push(image);
        self
    }

    /// Sets the number of variants.
    pub fn with_variant_count(mut self, count: usize) -> Self {
        self.variant_count = count;
        self
    }

    /// Sets the intensity.
    pub fn with_intensity(mut self, intensity: Intensity) -> Self {
        self.intensity = intensity;
        self
    }

    /// Primary image followed by the auxiliary images.
    pub fn source_images(&self) -> impl Iterator<Item = &[u8]> {
        std::iter::once(self.primary_image.as_slice())
            .chain(self.auxiliary_images.iter().map(Vec::as_slice))
    }

    /// Checks the request invariants.
    pub fn validate(&self) -> Result<()> {
        if self.variant_count == 0 {
            return Err(GenBatchError::InvalidRequest(
                "variant count must be at least 1".into(),
            ));
        }
        if self.primary_image.is_empty() {
            return Err(GenBatchError::InvalidRequest(
                "a source image is required".into(),
            ));
        }
        if self.auxiliary_images.len() > MAX_AUXILIARY_IMAGES {
            return Err(GenBatchError::InvalidRequest(format!(
                "at most {MAX_AUXILIARY_IMAGES} auxiliary images are supported, got {}",
                self.auxiliary_images.len()
            )));
        }
        Ok(())
    }
}

/// Outcome of one variant.
#[derive(Debug, Clone)]
pub enum VariantResult {
    /// The transform produced an image.
    Generated {
        /// Zero-based call index.
        index: usize,
        /// The image.
        image: GeneratedImage,
        /// Parameters the call was made with.
        params: CallParameters,
    },
    /// The call failed; a placeholder keeps the slot.
    Failed {
        /// Zero-based call index.
        index: usize,
        /// Stand-in image.
        placeholder: Placeholder,
        /// Failure classification.
        kind: ErrorKind,
        /// Human-readable error.
        message: String,
    },
}

impl VariantResult {
    /// Zero-based call index.
    pub fn index(&self) -> usize {
        match self {
            Self::Generated { index, .. } | Self::Failed { index, .. } => *index,
        }
    }

    /// Returns true for a generated image.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }

    /// Error message of a failed variant.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            Self::Generated { .. } => None,
        }
    }

    /// The image (or placeholder) as a data URL.
    pub fn to_data_url(&self) -> String {
        match self {
            Self::Generated { image, .. } => image.to_data_url(),
            Self::Failed { placeholder, .. } => placeholder.to_data_url(),
        }
    }
}

/// Emitted after each completed call, successful or not.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    /// One-based number of completed calls.
    pub current: usize,
    /// Number of variants requested.
    pub total: usize,
    /// Result of the call that just completed.
    pub result: &'a VariantResult,
}

impl ProgressEvent<'_> {
    /// Single-string rendering for UIs that only take a URI.
    ///
    /// Failed variants carry their percent-encoded message after [`ERROR_TAG`].
    pub fn tagged_uri(&self) -> String {
        let uri = self.result.to_data_url();
        match self.result.error_message() {
            Some(message) => format!("{uri}{ERROR_TAG}{}", percent_encode(message)),
            None => uri,
        }
    }
}

/// Splits a tagged URI into the image URI and the decoded error message, if any.
pub fn parse_tagged_uri(tagged: &str) -> (&str, Option<String>) {
    match tagged.split_once(ERROR_TAG) {
        Some((uri, encoded)) => (uri, Some(percent_decode(encoded))),
        None => (tagged, None),
    }
}

// Same unreserved set as JavaScript's encodeURIComponent.
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&b)
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{GenerationMetadata, ImageFormat};

    fn failed(message: &str) -> VariantResult {
        VariantResult::Failed {
            index: 1,
            placeholder: Placeholder::fallback(),
            kind: ErrorKind::SafetyBlocked,
            message: message.to_string(),
        }
    }

    fn generated() -> VariantResult {
        VariantResult::Generated {
            index: 0,
            image: GeneratedImage::new(
                vec![1, 2, 3],
                ImageFormat::Png,
                GenerationMetadata::default(),
            ),
            params: CallParameters {
                seed: 9,
                temperature: 0.3,
            },
        }
    }

    #[test]
    fn test_validate() {
        let ok = GenerationRequest::new(vec![1], "edit").with_variant_count(3);
        assert!(ok.validate().is_ok());

        let zero = GenerationRequest::new(vec![1], "edit").with_variant_count(0);
        assert!(matches!(zero.validate(), Err(GenBatchError::InvalidRequest(_))));

        let no_image = GenerationRequest::new(Vec::new(), "edit");
        assert!(no_image.validate().is_err());

        let too_many = GenerationRequest::new(vec![1], "fuse")
            .with_auxiliary_image(vec![2])
            .with_auxiliary_image(vec![3])
            .with_auxiliary_image(vec![4]);
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_source_images_order() {
        let req = GenerationRequest::new(vec![1], "fuse")
            .with_auxiliary_image(vec![2])
            .with_auxiliary_image(vec![3]);
        let sources: Vec<&[u8]> = req.source_images().collect();
        assert_eq!(sources, vec![&[1u8][..], &[2u8][..], &[3u8][..]]);
    }

    #[test]
    fn test_variant_result_accessors() {
        let ok = generated();
        assert!(ok.is_ok());
        assert_eq!(ok.index(), 0);
        assert_eq!(ok.error_message(), None);
        assert_eq!(ok.to_data_url(), "data:image/png;base64,AQID");

        let bad = failed("blocked");
        assert!(!bad.is_ok());
        assert_eq!(bad.index(), 1);
        assert_eq!(bad.error_message(), Some("blocked"));
    }

    #[test]
    fn test_tagged_uri_success_is_plain() {
        let result = generated();
        let event = ProgressEvent {
            current: 1,
            total: 3,
            result: &result,
        };
        assert_eq!(event.tagged_uri(), "data:image/png;base64,AQID");
        assert_eq!(parse_tagged_uri(&event.tagged_uri()).1, None);
    }

    #[test]
    fn test_tagged_uri_round_trips_error_message() {
        let message = "content blocked: unsafe edit (50% / \"über\")";
        let result = failed(message);
        let event = ProgressEvent {
            current: 2,
            total: 3,
            result: &result,
        };

        let tagged = event.tagged_uri();
        assert!(tagged.contains(ERROR_TAG));
        assert!(!tagged.contains(' '));

        let (uri, decoded) = parse_tagged_uri(&tagged);
        assert_eq!(uri, Placeholder::fallback().to_data_url());
        assert_eq!(decoded.as_deref(), Some(message));
    }

    #[test]
    fn test_percent_encoding_matches_encode_uri_component() {
        assert_eq!(percent_encode("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(percent_encode("safe-_.!~*'()"), "safe-_.!~*'()");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
