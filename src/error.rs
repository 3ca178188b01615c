use std::{error::Error, fmt, io, path::PathBuf};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, CleanerError>;

/// All errors that can occur while segmenting threads or training models.
#[derive(Debug)]
pub enum CleanerError {
    /// An underlying I/O error.
    Io(io::Error),
    /// A request record was missing a field or had a mistyped one.
    InvalidRequest(String),
    /// A dataset row could not be turned into a sample.
    InvalidData(String),
    /// The CSV reader failed.
    Csv(csv::Error),
    /// A metric name not present in the metric registry.
    UnknownMetric(String),
    /// A line feature name not known to the feature creator.
    UnknownFeature(String),
    /// Two tensors or configs disagree on a dimension.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// No stored model was found where the specs pointed.
    ModelNotFound(PathBuf),
    /// The tracker has no run with this id.
    RunNotFound(String),
    /// A logging call was made outside a run.
    NoActiveRun,
    /// `start_run` was called while another run was still open.
    RunAlreadyActive(String),
    /// The staging directory for a run already exists.
    StagingConflict(PathBuf),
    /// Model weights or metadata could not be (de)serialized.
    Serialization(String),
    /// Training, encoding or persisting a tokenizer failed.
    Tokenizer(String),
    /// The layered configuration could not be built.
    Config(config::ConfigError),
}

impl fmt::Display for CleanerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Self::Csv(e) => write!(f, "csv error: {e}"),
            Self::UnknownMetric(name) => write!(f, "unknown metric: {name}"),
            Self::UnknownFeature(name) => write!(f, "unknown feature: {name}"),
            Self::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} shape mismatch: got {got}, expected {expected}"),
            Self::ModelNotFound(path) => write!(f, "no model found at {}", path.display()),
            Self::RunNotFound(id) => write!(f, "run {id} not found"),
            Self::NoActiveRun => write!(f, "no active run"),
            Self::RunAlreadyActive(id) => write!(f, "run {id} is still active"),
            Self::StagingConflict(path) => {
                write!(f, "staging dir {} already exists", path.display())
            }
            Self::Serialization(msg) => write!(f, "serialization error: {msg}"),
            Self::Tokenizer(msg) => write!(f, "tokenizer error: {msg}"),
            Self::Config(e) => write!(f, "config error: {e}"),
        }
    }
}

impl Error for CleanerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CleanerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for CleanerError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<serde_json::Error> for CleanerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<safetensors::SafeTensorError> for CleanerError {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ndarray::ShapeError> for CleanerError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for CleanerError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e)
    }
}
