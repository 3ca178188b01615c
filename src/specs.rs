//! Request records accepted at the CLI/service boundary.
//!
//! Construction is the only validation step: a record exists only if every
//! required field was present and well typed. Nothing else (path existence,
//! value ranges) is checked here.

use std::{fmt, fs, path::Path, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{CleanerError, Result};

/// Where a model artifact is loaded from.
///
/// Specs carry the origin as a plain string; it is parsed when the model
/// store resolves them, so an unknown origin fails the load, not the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A directory named after the id under the configured models dir.
    Local,
    /// The artifacts of a tracked run whose run id is the given id.
    Tracker,
    /// A freshly initialised model; the id only names it.
    Init,
}

impl Origin {
    pub fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Tracker => "tracker",
            Self::Init => "init",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Origin {
    type Err = CleanerError;

    fn from_str(s: &str) -> Result<Self> {
        [Self::Local, Self::Tracker, Self::Init]
            .into_iter()
            .find(|origin| origin.name() == s)
            .ok_or_else(|| CleanerError::InvalidRequest(format!("unknown origin: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSpecs {
    pub origin: String,
    pub encoder: String,
}

impl EncoderSpecs {
    pub fn new(origin: Origin, encoder: impl Into<String>) -> Self {
        Self {
            origin: origin.to_string(),
            encoder: encoder.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpecs {
    pub origin: String,
    pub classifier_id: String,
    #[serde(default)]
    pub encoder_id: Option<String>,
    /// Origin of `encoder_id`. Defaults to `origin`, or to `tracker` when
    /// the classifier itself is freshly initialised.
    #[serde(default)]
    pub encoder_origin: Option<String>,
    #[serde(default)]
    pub encoder_dim: Option<usize>,
    #[serde(default)]
    pub features: Option<Vec<String>>,
}

impl PipelineSpecs {
    /// Specs with only the required fields set.
    pub fn new(origin: Origin, classifier_id: impl Into<String>) -> Self {
        Self {
            origin: origin.to_string(),
            classifier_id: classifier_id.into(),
            encoder_id: None,
            encoder_origin: None,
            encoder_dim: None,
            features: None,
        }
    }
}

/// Hyperparameters of a single training invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpecs {
    pub run_name: String,
    pub csv_path: String,
    pub metrics: Vec<String>,
    pub lr: f32,
    pub epochs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRequest {
    pub pipeline: PipelineSpecs,
    pub threads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierTrainRequest {
    pub run: RunSpecs,
    pub pipeline: PipelineSpecs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderTrainRequest {
    pub run: RunSpecs,
    pub encoder: EncoderSpecs,
}

/// JSON construction shared by every request record.
pub trait FromJson: DeserializeOwned {
    /// Builds the record from a JSON document.
    ///
    /// # Errors
    /// `CleanerError::InvalidRequest` if a required field is missing or mistyped.
    fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CleanerError::InvalidRequest(e.to_string()))
    }

    /// Reads and builds the record from a JSON file.
    fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl FromJson for EncoderSpecs {}
impl FromJson for PipelineSpecs {}
impl FromJson for RunSpecs {}
impl FromJson for SegmentRequest {}
impl FromJson for ClassifierTrainRequest {}
impl FromJson for EncoderTrainRequest {}
