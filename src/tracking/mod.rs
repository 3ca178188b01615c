//! Experiment tracking: named runs with parameters, metrics and artifacts.

mod file;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub use file::{FileTracker, RunRecord};

use crate::{
    model::{ClassifierModel, Encoder},
    tokenizer::Tokenizer,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        };
        f.write_str(status)
    }
}

/// Identity of a started run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
}

/// Something that can be written to a directory and logged as a model.
pub trait Artifact {
    fn save_to(&self, dir: &Path) -> Result<()>;
}

impl Artifact for ClassifierModel {
    fn save_to(&self, dir: &Path) -> Result<()> {
        self.save(dir)
    }
}

impl Artifact for Encoder {
    fn save_to(&self, dir: &Path) -> Result<()> {
        self.save_pretrained(dir)
    }
}

impl Artifact for Tokenizer {
    fn save_to(&self, dir: &Path) -> Result<()> {
        self.save_pretrained(dir)
    }
}

/// The experiment tracker the training services report to.
///
/// At most one run is active at a time; every `log_*` call targets it.
pub trait Tracker {
    /// Selects (creating if needed) the experiment new runs are filed under.
    fn set_experiment(&mut self, name: &str) -> Result<()>;

    /// Starts a named run in the current experiment.
    fn start_run(&mut self, run_name: &str) -> Result<RunInfo>;

    /// Ends the active run with the given status.
    fn end_run(&mut self, status: RunStatus) -> Result<()>;

    fn log_params(&mut self, params: &[(&str, String)]) -> Result<()>;

    fn log_metrics(&mut self, metrics: &[(&str, f64)]) -> Result<()>;

    /// Copies the contents of `local_dir` under `artifact_path` of the active run.
    fn log_artifacts(&mut self, local_dir: &Path, artifact_path: &str) -> Result<()>;

    /// Persists a model under `artifact_path` of the active run.
    fn log_model(&mut self, model: &dyn Artifact, artifact_path: &str) -> Result<()>;

    /// Local directory holding `artifact_path` of run `run_id`.
    fn artifact_dir(&self, run_id: &str, artifact_path: &str) -> Result<PathBuf>;
}

/// Runs `f` inside a tracked run.
///
/// The run is ended `Finished` if `f` succeeds and `Failed` if it errors, in
/// which case `f`'s error is returned as is.
pub fn with_run<K, T, F>(tracker: &mut K, run_name: &str, f: F) -> Result<T>
where
    K: Tracker + ?Sized,
    F: FnOnce(&mut K, &RunInfo) -> Result<T>,
{
    let run = tracker.start_run(run_name)?;
    log::info!("started run {} ({})", run.run_name, run.run_id);

    match f(tracker, &run) {
        Ok(value) => {
            tracker.end_run(RunStatus::Finished)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(end_err) = tracker.end_run(RunStatus::Failed) {
                log::warn!("failed to end run {}: {end_err}", run.run_id);
            }
            Err(e)
        }
    }
}
