use std::{fmt, str::FromStr};

use ndarray::{concatenate, prelude::*};

use super::EncoderModel;
use crate::{CleanerError, Result};

/// Hand-crafted per-line features appended to the encoder embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Character count, capped at 200 and scaled to `[0, 1]`.
    Length,
    Blank,
    /// Starts with `>`.
    Quoted,
    HasAt,
    HasDigits,
    Greeting,
    Closing,
    /// `From:`-style header keys and `... wrote:` attributions.
    HeaderKey,
    /// Relative position of the line in its thread.
    Position,
}

pub const ALL_FEATURES: [Feature; 9] = [
    Feature::Length,
    Feature::Blank,
    Feature::Quoted,
    Feature::HasAt,
    Feature::HasDigits,
    Feature::Greeting,
    Feature::Closing,
    Feature::HeaderKey,
    Feature::Position,
];

const GREETINGS: [&str; 6] = ["hi", "hello", "dear", "hey", "good morning", "good afternoon"];
const CLOSINGS: [&str; 7] = [
    "best",
    "regards",
    "kind regards",
    "thanks",
    "thank you",
    "cheers",
    "sincerely",
];
const HEADER_KEYS: [&str; 6] = ["from:", "to:", "cc:", "subject:", "sent:", "date:"];

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Blank => "blank",
            Self::Quoted => "quoted",
            Self::HasAt => "has_at",
            Self::HasDigits => "has_digits",
            Self::Greeting => "greeting",
            Self::Closing => "closing",
            Self::HeaderKey => "header_key",
            Self::Position => "position",
        }
    }

    /// Resolves a list of feature names, failing on the first unknown one.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Feature>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }

    /// The feature's value for line `index` of a thread of `len` lines.
    pub fn compute(self, line: &str, index: usize, len: usize) -> f32 {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        let value = match self {
            Self::Length => return line.chars().count().min(200) as f32 / 200.,
            Self::Blank => trimmed.is_empty(),
            Self::Quoted => trimmed.starts_with('>'),
            Self::HasAt => line.contains('@'),
            Self::HasDigits => line.chars().any(|c| c.is_ascii_digit()),
            Self::Greeting => GREETINGS.iter().any(|g| starts_with_word(&lower, g)),
            Self::Closing => CLOSINGS.iter().any(|c| starts_with_word(&lower, c)),
            Self::HeaderKey => {
                HEADER_KEYS.iter().any(|k| lower.starts_with(k)) || lower.ends_with("wrote:")
            }
            Self::Position => {
                return if len > 1 {
                    index as f32 / (len - 1) as f32
                } else {
                    0.
                }
            }
        };

        value as u8 as f32
    }
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .is_some_and(|rest| rest.chars().next().map_or(true, |c| !c.is_alphanumeric()))
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = CleanerError;

    fn from_str(s: &str) -> Result<Self> {
        ALL_FEATURES
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| CleanerError::UnknownFeature(s.to_string()))
    }
}

/// Turns the lines of a thread into the classifier's input matrix:
/// the encoder embedding of each line followed by its hand-crafted features.
#[derive(Debug, Clone)]
pub struct FeatureCreator {
    pub encoder: EncoderModel,
    features: Vec<Feature>,
}

impl FeatureCreator {
    pub fn new(encoder: EncoderModel, features: Vec<Feature>) -> Self {
        Self { encoder, features }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Width of the produced matrix.
    pub fn output_dim(&self) -> usize {
        self.encoder.dim() + self.features.len()
    }

    pub fn create<S: AsRef<str>>(&self, lines: &[S]) -> Result<Array2<f32>> {
        let embeddings = self.encoder.embed(lines)?;

        let n = lines.len();
        let mut handcrafted = Array2::zeros((n, self.features.len()));
        for (i, line) in lines.iter().enumerate() {
            for (j, feature) in self.features.iter().enumerate() {
                handcrafted[[i, j]] = feature.compute(line.as_ref(), i, n);
            }
        }

        Ok(concatenate![Axis(1), embeddings, handcrafted])
    }
}
