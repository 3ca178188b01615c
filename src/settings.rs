use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "EMAIL_CLEANING";

/// Name of the optional settings file looked up in the working directory.
pub const DEFAULT_FILE: &str = "email_cleaning.toml";

/// Runtime settings shared by the segmenting and training services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory of the local experiment tracker.
    #[serde(default = "default_tracking_dir")]
    pub tracking_dir: PathBuf,
    /// Where trained artifacts are staged before being handed to the tracker.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Root of the `local` model origin.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_classifier_experiment")]
    pub classifier_experiment: String,
    #[serde(default = "default_encoder_experiment")]
    pub encoder_experiment: String,
    /// Lines per step when training the encoder.
    #[serde(default = "default_line_batch_size")]
    pub line_batch_size: usize,
    /// Token budget per line, `[CLS]` and `[SEP]` included.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Seed for weight initialisation and dropout. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracking_dir: default_tracking_dir(),
            staging_dir: default_staging_dir(),
            models_dir: default_models_dir(),
            classifier_experiment: default_classifier_experiment(),
            encoder_experiment: default_encoder_experiment(),
            line_batch_size: default_line_batch_size(),
            max_tokens: default_max_tokens(),
            seed: None,
        }
    }
}

impl Settings {
    /// Loads the settings from all sources.
    ///
    /// Later sources win: built-in defaults, then `email_cleaning.toml` in the
    /// working directory (if any), then `path` (if given, must exist), then
    /// `EMAIL_CLEANING_*` environment variables.
    ///
    /// # Errors
    /// Returns a config error if a source cannot be read or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(DEFAULT_FILE).required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}

fn default_tracking_dir() -> PathBuf {
    PathBuf::from("./mlruns")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_classifier_experiment() -> String {
    "EC_classifier_training".into()
}

fn default_encoder_experiment() -> String {
    "EC_encoder_training".into()
}

fn default_line_batch_size() -> usize {
    32
}

fn default_max_tokens() -> usize {
    64
}
