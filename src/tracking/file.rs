use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Artifact, RunInfo, RunStatus, Tracker};
use crate::{CleanerError, Result};

pub const DEFAULT_EXPERIMENT: &str = "Default";

const RUN_FILE: &str = "run.json";
const ARTIFACTS_DIR: &str = "artifacts";

/// Everything the tracker knows about a run, as stored in its `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

/// A tracker backed by a local directory:
/// `<root>/<experiment>/<run_id>/{run.json, artifacts/}`.
#[derive(Debug)]
pub struct FileTracker {
    root: PathBuf,
    experiment: String,
    active: Option<RunRecord>,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            experiment: DEFAULT_EXPERIMENT.into(),
            active: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Every run recorded under `experiment`, oldest first.
    pub fn runs(&self, experiment: &str) -> Result<Vec<RunRecord>> {
        let dir = self.root.join(experiment);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path().join(RUN_FILE);
            if path.is_file() {
                runs.push(read_record(&path)?);
            }
        }

        runs.sort_by_key(|r| r.start_time);
        Ok(runs)
    }

    /// The record of run `run_id`, whatever its experiment.
    pub fn run(&self, run_id: &str) -> Result<RunRecord> {
        read_record(&self.find_run(run_id)?.join(RUN_FILE))
    }

    fn find_run(&self, run_id: &str) -> Result<PathBuf> {
        if self.root.is_dir() {
            for entry in fs::read_dir(&self.root)? {
                let candidate = entry?.path().join(run_id);
                if candidate.join(RUN_FILE).is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(CleanerError::RunNotFound(run_id.to_string()))
    }

    fn run_dir(&self, record: &RunRecord) -> PathBuf {
        self.root.join(&record.experiment).join(&record.run_id)
    }

    fn active_mut(&mut self) -> Result<&mut RunRecord> {
        self.active.as_mut().ok_or(CleanerError::NoActiveRun)
    }

    fn active_artifacts(&self, artifact_path: &str) -> Result<PathBuf> {
        let record = self.active.as_ref().ok_or(CleanerError::NoActiveRun)?;
        Ok(self.run_dir(record).join(ARTIFACTS_DIR).join(artifact_path))
    }

    fn persist(&self) -> Result<()> {
        let record = self.active.as_ref().ok_or(CleanerError::NoActiveRun)?;
        self.write_record(record)
    }

    fn write_record(&self, record: &RunRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        fs::write(self.run_dir(record).join(RUN_FILE), json)?;
        Ok(())
    }
}

impl Tracker for FileTracker {
    fn set_experiment(&mut self, name: &str) -> Result<()> {
        fs::create_dir_all(self.root.join(name))?;
        self.experiment = name.to_string();
        Ok(())
    }

    fn start_run(&mut self, run_name: &str) -> Result<RunInfo> {
        if let Some(active) = &self.active {
            return Err(CleanerError::RunAlreadyActive(active.run_id.clone()));
        }

        let run_id = format!("{:032x}", rand::rng().random::<u128>());
        let record = RunRecord {
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            experiment: self.experiment.clone(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
        };

        // The run only becomes active once its record is on disk.
        fs::create_dir_all(self.run_dir(&record).join(ARTIFACTS_DIR))?;
        self.write_record(&record)?;
        self.active = Some(record);

        Ok(RunInfo {
            run_id,
            run_name: run_name.to_string(),
            experiment: self.experiment.clone(),
        })
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let record = self.active_mut()?;
        record.status = status;
        record.end_time = Some(Utc::now());
        log::debug!("ending run {} as {status}", record.run_id);

        let result = self.persist();
        self.active = None;
        result
    }

    fn log_params(&mut self, params: &[(&str, String)]) -> Result<()> {
        let record = self.active_mut()?;
        for (key, value) in params {
            record.params.insert(key.to_string(), value.clone());
        }
        self.persist()
    }

    fn log_metrics(&mut self, metrics: &[(&str, f64)]) -> Result<()> {
        let record = self.active_mut()?;
        for (key, value) in metrics {
            record.metrics.insert(key.to_string(), *value);
        }
        self.persist()
    }

    fn log_artifacts(&mut self, local_dir: &Path, artifact_path: &str) -> Result<()> {
        let target = self.active_artifacts(artifact_path)?;
        copy_dir(local_dir, &target)
    }

    fn log_model(&mut self, model: &dyn Artifact, artifact_path: &str) -> Result<()> {
        let target = self.active_artifacts(artifact_path)?;
        model.save_to(&target)
    }

    fn artifact_dir(&self, run_id: &str, artifact_path: &str) -> Result<PathBuf> {
        let dir = self
            .find_run(run_id)?
            .join(ARTIFACTS_DIR)
            .join(artifact_path);

        if !dir.is_dir() {
            return Err(CleanerError::ModelNotFound(dir));
        }
        Ok(dir)
    }
}

fn read_record(path: &Path) -> Result<RunRecord> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_lifecycle_is_persisted() {
        let root = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::new(root.path());
        tracker.set_experiment("EC_test").unwrap();

        let run = tracker.start_run("first").unwrap();
        assert_eq!(run.run_id.len(), 32);

        tracker
            .log_params(&[("lr", "0.01".into()), ("optimizer", "adam".into())])
            .unwrap();
        tracker.log_metrics(&[("loss", 0.5)]).unwrap();
        tracker.end_run(RunStatus::Finished).unwrap();

        let record = tracker.run(&run.run_id).unwrap();
        assert_eq!(record.experiment, "EC_test");
        assert_eq!(record.params["optimizer"], "adam");
        assert_eq!(record.metrics["loss"], 0.5);
        assert_eq!(record.status, RunStatus::Finished);
    }

    #[test]
    fn failed_start_leaves_no_active_run() {
        let root = tempfile::tempdir().unwrap();
        let blocked = root.path().join("not-a-dir");
        fs::write(&blocked, "").unwrap();
        let mut tracker = FileTracker::new(&blocked);

        assert!(matches!(
            tracker.start_run("first"),
            Err(CleanerError::Io(_))
        ));
        assert!(matches!(
            tracker.end_run(RunStatus::Failed),
            Err(CleanerError::NoActiveRun)
        ));
        assert!(matches!(
            tracker.start_run("second"),
            Err(CleanerError::Io(_))
        ));
    }

    #[test]
    fn logging_outside_a_run_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::new(root.path());
        assert!(matches!(
            tracker.log_metrics(&[("loss", 1.)]),
            Err(CleanerError::NoActiveRun)
        ));
    }

    #[test]
    fn nested_runs_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::new(root.path());
        tracker.start_run("outer").unwrap();
        assert!(matches!(
            tracker.start_run("inner"),
            Err(CleanerError::RunAlreadyActive(_))
        ));
    }

    #[test]
    fn artifacts_are_copied_recursively() {
        let root = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        fs::create_dir(local.path().join("nested")).unwrap();
        fs::write(local.path().join("config.json"), "{}").unwrap();
        fs::write(local.path().join("nested").join("vocab.txt"), "a\nb").unwrap();

        let mut tracker = FileTracker::new(root.path());
        let run = tracker.start_run("artifacts").unwrap();
        tracker.log_artifacts(local.path(), "tokenizer").unwrap();
        tracker.end_run(RunStatus::Finished).unwrap();

        let dir = tracker.artifact_dir(&run.run_id, "tokenizer").unwrap();
        assert!(dir.join("config.json").is_file());
        assert_eq!(
            fs::read_to_string(dir.join("nested").join("vocab.txt")).unwrap(),
            "a\nb"
        );
    }

    #[test]
    fn unknown_run_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(root.path());
        assert!(matches!(
            tracker.artifact_dir("nope", "encoder"),
            Err(CleanerError::RunNotFound(_))
        ));
    }
}
