//! Per-call variation: style descriptors, temperature ramp and seeds.
//!
//! Everything here is pure arithmetic so it can be tested without a backend.

use crate::error::{GenBatchError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest seed handed out. Backends with 32-bit signed seeds accept it.
pub const MAX_SEED: u64 = i32::MAX as u64;

/// How far the variants of one batch drift from each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    /// Small, faithful variations.
    Subtle,
    /// Noticeable but recognizable variations.
    #[default]
    Moderate,
    /// Bold reinterpretations.
    Dramatic,
}

const SUBTLE_DESCRIPTORS: &[&str] = &[
    "Keep the composition intact; slightly warm the color balance.",
    "Keep the composition intact; soften the lighting a touch.",
    "Keep the composition intact; add a hint of film grain.",
    "Keep the composition intact; cool the shadows slightly.",
    "Keep the composition intact; lift the contrast a little.",
];

const MODERATE_DESCRIPTORS: &[&str] = &[
    "Reinterpret the lighting as golden hour.",
    "Shift the palette toward muted pastel tones.",
    "Render with a soft painterly texture.",
    "Use moody, low-key lighting with deep shadows.",
    "Give the scene a crisp, high-clarity editorial look.",
    "Shift the palette toward teal and orange.",
];

const DRAMATIC_DESCRIPTORS: &[&str] = &[
    "Reimagine the scene as a bold comic-book illustration.",
    "Transform the setting into a neon-lit night scene.",
    "Render it as an impressionist oil painting with heavy brushstrokes.",
    "Recast everything in a surreal, dreamlike atmosphere.",
    "Restyle it as a vintage hand-tinted photograph.",
    "Turn it into a high-contrast black-and-white graphic poster.",
    "Reimagine it in a watercolor style with loose washes.",
];

impl Intensity {
    /// All tiers, mildest first.
    pub const ALL: [Intensity; 3] = [Self::Subtle, Self::Moderate, Self::Dramatic];

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subtle => "subtle",
            Self::Moderate => "moderate",
            Self::Dramatic => "dramatic",
        }
    }

    /// Parses a tier name, falling back to [`Intensity::Moderate`].
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!(value, "unrecognized intensity, using moderate");
            Self::Moderate
        })
    }

    /// Ordered style descriptors for this tier.
    pub fn descriptors(&self) -> &'static [&'static str] {
        match self {
            Self::Subtle => SUBTLE_DESCRIPTORS,
            Self::Moderate => MODERATE_DESCRIPTORS,
            Self::Dramatic => DRAMATIC_DESCRIPTORS,
        }
    }

    /// Temperature of the first call and the span covered by the ramp.
    pub fn temperature_ramp(&self) -> (f32, f32) {
        match self {
            Self::Subtle => (0.3, 0.2),
            Self::Moderate => (0.5, 0.4),
            Self::Dramatic => (0.8, 0.6),
        }
    }
}

impl FromStr for Intensity {
    type Err = GenBatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subtle" => Ok(Self::Subtle),
            "moderate" => Ok(Self::Moderate),
            "dramatic" => Ok(Self::Dramatic),
            other => Err(GenBatchError::InvalidRequest(format!(
                "unknown intensity '{other}' (expected subtle, moderate or dramatic)"
            ))),
        }
    }
}

impl std::fmt::Display for Intensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor for the variant at `index`, reusing the list cyclically.
pub fn variant_descriptor(intensity: Intensity, index: usize) -> &'static str {
    let list = intensity.descriptors();
    list[index % list.len()]
}

/// Appends a style descriptor to the user's instruction.
pub fn compose_instruction(instruction: &str, descriptor: &str) -> String {
    let instruction = instruction.trim_end();
    if instruction.is_empty() {
        descriptor.to_string()
    } else {
        format!("{instruction}\n\n{descriptor}")
    }
}

/// Temperature for call `index` of `count`, clamped to `[0, max_temperature]`.
///
/// Ramps linearly from the tier's base to base + span, so it never decreases
/// with the index.
pub fn temperature_for(
    intensity: Intensity,
    index: usize,
    count: usize,
    max_temperature: f32,
) -> f32 {
    let (base, span) = intensity.temperature_ramp();
    let steps = count.saturating_sub(1).max(1) as f32;
    let raw = base + index as f32 * span / steps;
    raw.clamp(0.0, max_temperature.max(0.0))
}

/// Sampling parameters of one call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallParameters {
    /// Random seed, independent per call.
    pub seed: u64,
    /// Ramped temperature.
    pub temperature: f32,
}

impl CallParameters {
    /// Computes parameters for call `index` of `count`, drawing the seed from `rng`.
    pub fn for_call<R: Rng + ?Sized>(
        intensity: Intensity,
        index: usize,
        count: usize,
        max_temperature: f32,
        rng: &mut R,
    ) -> Self {
        Self {
            seed: rng.gen_range(0..=MAX_SEED),
            temperature: temperature_for(intensity, index, count, max_temperature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_descriptor_selection_is_cyclic() {
        for intensity in Intensity::ALL {
            let len = intensity.descriptors().len();
            for i in 0..len * 3 {
                assert_eq!(
                    variant_descriptor(intensity, i),
                    variant_descriptor(intensity, i % len)
                );
            }
            assert_eq!(variant_descriptor(intensity, 0), intensity.descriptors()[0]);
            assert_eq!(variant_descriptor(intensity, len), intensity.descriptors()[0]);
        }
    }

    #[test]
    fn test_compose_instruction() {
        assert_eq!(
            compose_instruction("Make it winter.  ", "Use soft light."),
            "Make it winter.\n\nUse soft light."
        );
        assert_eq!(compose_instruction("   ", "Use soft light."), "Use soft light.");
    }

    #[test]
    fn test_temperature_ramp_is_non_decreasing() {
        for intensity in Intensity::ALL {
            for count in 1..=12 {
                let temps: Vec<f32> = (0..count)
                    .map(|i| temperature_for(intensity, i, count, 2.0))
                    .collect();
                assert!(
                    temps.windows(2).all(|w| w[0] <= w[1]),
                    "{intensity} x{count}: {temps:?}"
                );
            }
        }
    }

    #[test]
    fn test_temperature_ramp_endpoints() {
        let first = temperature_for(Intensity::Moderate, 0, 5, 2.0);
        let last = temperature_for(Intensity::Moderate, 4, 5, 2.0);
        assert!((first - 0.5).abs() < 1e-6);
        assert!((last - 0.9).abs() < 1e-6);

        // A single call sits at the base of its tier.
        assert!((temperature_for(Intensity::Dramatic, 0, 1, 2.0) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_tiers_are_ordered() {
        let subtle = temperature_for(Intensity::Subtle, 0, 1, 2.0);
        let moderate = temperature_for(Intensity::Moderate, 0, 1, 2.0);
        let dramatic = temperature_for(Intensity::Dramatic, 0, 1, 2.0);
        assert!(subtle < moderate && moderate < dramatic);
    }

    #[test]
    fn test_temperature_is_clamped_to_backend_limit() {
        for i in 0..4 {
            assert!(temperature_for(Intensity::Dramatic, i, 4, 1.0) <= 1.0);
        }
        assert_eq!(temperature_for(Intensity::Dramatic, 3, 4, 1.0), 1.0);
    }

    #[test]
    fn test_call_parameters_seed_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..100 {
            let params = CallParameters::for_call(Intensity::Subtle, i, 100, 2.0, &mut rng);
            assert!(params.seed <= MAX_SEED);
        }
    }

    #[test]
    fn test_parse_intensity() {
        assert_eq!("subtle".parse::<Intensity>().unwrap(), Intensity::Subtle);
        assert_eq!(" Dramatic ".parse::<Intensity>().unwrap(), Intensity::Dramatic);
        assert!(matches!(
            "wild".parse::<Intensity>(),
            Err(GenBatchError::InvalidRequest(_))
        ));

        assert_eq!(Intensity::parse_lenient("wild"), Intensity::Moderate);
        assert_eq!(Intensity::parse_lenient("subtle"), Intensity::Subtle);
    }

    #[test]
    fn test_intensity_serde() {
        assert_eq!(
            serde_json::to_string(&Intensity::Dramatic).unwrap(),
            "\"dramatic\""
        );
        let parsed: Intensity = serde_json::from_str("\"subtle\"").unwrap();
        assert_eq!(parsed, Intensity::Subtle);
    }
}
