use std::{fs, path::Path};

use email_cleaning::{
    specs::{ClassifierTrainRequest, EncoderTrainRequest, FromJson, Origin, PipelineSpecs},
    tracking::{RunStatus, Tracker},
    CleanerError, EmailCleaner, Settings,
};

const THREADS_CSV: &str = "thread_id,line,is_start,is_body
t1,Hi Alice,1,0
t1,The report is attached.,0,1
t1,Best,0,0
t1,Bob,0,0
t1,On Monday Alice wrote:,1,0
t1,> Can you send the report?,0,1
t2,Hello team,1,0
t2,Standup moves to 10am.,0,1
t2,Thanks,0,0
";

const LINES_CSV: &str = "line,category
Hi Alice,greeting
The report is attached.,body
Best,signature
From: alice@example.com,header
> Can you send the report?,quote
This message is confidential.,disclaimer
-----Original Message-----,separator
";

fn mk_settings(root: &Path) -> Settings {
    Settings {
        tracking_dir: root.join("mlruns"),
        staging_dir: root.join("temp"),
        models_dir: root.join("models"),
        line_batch_size: 4,
        max_tokens: 16,
        seed: Some(42),
        ..Settings::default()
    }
}

fn write_csv(root: &Path, name: &str, contents: &str) -> String {
    let path = root.join(name);
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn segment_returns_one_thread_per_input() {
    let root = tempfile::tempdir().unwrap();
    let cleaner = EmailCleaner::new(mk_settings(root.path()));

    let threads = [
        "Hi Bob,\nLunch tomorrow?\nAlice",
        "Hello,\n\nSee the notes below.\n\nOn Friday Carol wrote:\n> notes",
    ];
    let mut specs = PipelineSpecs::new(Origin::Init, "fresh");
    specs.encoder_dim = Some(8);

    let dataset = cleaner.segment(&threads, &specs).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.threads[0].len(), 3);
    assert_eq!(dataset.threads[1].len(), 6);
    assert!(dataset.threads.iter().all(|t| t.lines[0].is_start));
}

#[test]
fn train_encoder_leaves_no_staging_dir() {
    let root = tempfile::tempdir().unwrap();
    let settings = mk_settings(root.path());
    let csv_path = write_csv(root.path(), "lines.csv", LINES_CSV);
    let mut cleaner = EmailCleaner::new(settings.clone());

    let request = EncoderTrainRequest::from_json(&format!(
        r#"{{
            "run": {{"run_name": "encoder-smoke", "csv_path": {csv_path:?}, "metrics": [], "lr": 0.01, "epochs": 2}},
            "encoder": {{"origin": "init", "encoder": "base"}}
        }}"#
    ))
    .unwrap();

    let trained = cleaner.train_encoder(&request).unwrap();
    assert_eq!(trained.history.epochs(), 2);

    let staged = settings.staging_dir.join(&trained.run.run_id);
    assert!(!staged.exists());
    let leftovers = fs::read_dir(&settings.staging_dir).unwrap().count();
    assert_eq!(leftovers, 0);

    let tracker = cleaner.tracker();
    assert!(tracker.artifact_dir(&trained.run.run_id, "encoder").is_ok());
    assert!(tracker.artifact_dir(&trained.run.run_id, "tokenizer").is_ok());
}

#[test]
fn train_classifier_logs_one_run_with_configured_metrics() {
    let root = tempfile::tempdir().unwrap();
    let settings = mk_settings(root.path());
    let csv_path = write_csv(root.path(), "threads.csv", THREADS_CSV);
    let mut cleaner = EmailCleaner::new(settings.clone());

    let request = ClassifierTrainRequest::from_json(&format!(
        r#"{{
            "run": {{"run_name": "classifier-smoke", "csv_path": {csv_path:?}, "metrics": ["accuracy", "f1", "start_accuracy"], "lr": 0.01, "epochs": 3}},
            "pipeline": {{"origin": "init", "classifier_id": "clf", "encoder_dim": 8, "features": ["blank", "greeting", "closing", "header_key"]}}
        }}"#
    ))
    .unwrap();

    cleaner.train_classifier(&request).unwrap();

    let runs = cleaner
        .tracker()
        .runs(&settings.classifier_experiment)
        .unwrap();
    assert_eq!(runs.len(), 1);

    let run = &runs[0];
    assert_eq!(run.run_name, "classifier-smoke");
    assert_eq!(run.status, RunStatus::Finished);
    assert_eq!(run.params["metrics"], "accuracy,f1,start_accuracy");
    assert_eq!(run.params["features"], "blank,greeting,closing,header_key");
    for metric in ["accuracy", "f1", "start_accuracy"] {
        let value = run.metrics[metric];
        assert!((0.0..=1.0).contains(&value), "{metric} = {value}");
    }
}

#[test]
fn classifier_trains_on_a_tracked_encoder_and_reloads_by_run_id() {
    let root = tempfile::tempdir().unwrap();
    let settings = mk_settings(root.path());
    let lines_csv = write_csv(root.path(), "lines.csv", LINES_CSV);
    let threads_csv = write_csv(root.path(), "threads.csv", THREADS_CSV);
    let mut cleaner = EmailCleaner::new(settings.clone());

    let encoder_request = EncoderTrainRequest::from_json(&format!(
        r#"{{
            "run": {{"run_name": "encoder", "csv_path": {lines_csv:?}, "metrics": [], "lr": 0.01, "epochs": 1}},
            "encoder": {{"origin": "init", "encoder": "base"}}
        }}"#
    ))
    .unwrap();
    let encoder_run = cleaner.train_encoder(&encoder_request).unwrap().run.run_id;

    let classifier_request = ClassifierTrainRequest::from_json(&format!(
        r#"{{
            "run": {{"run_name": "classifier", "csv_path": {threads_csv:?}, "metrics": ["accuracy"], "lr": 0.01, "epochs": 1}},
            "pipeline": {{"origin": "init", "classifier_id": "clf", "encoder_id": {encoder_run:?}}}
        }}"#
    ))
    .unwrap();
    let classifier_run = cleaner
        .train_classifier(&classifier_request)
        .unwrap()
        .run
        .run_id;

    let record = cleaner.tracker().run(&classifier_run).unwrap();
    assert_eq!(record.params["encoder_id"], encoder_run);

    let specs = PipelineSpecs::new(Origin::Tracker, classifier_run);
    let text = ["Hi Alice\nThe report is attached.\nBest\nBob"];
    let first = cleaner.segment(&text, &specs).unwrap();
    let second = cleaner.segment(&text, &specs).unwrap();
    assert_eq!(first.threads[0].len(), 4);
    assert_eq!(first, second);
}

#[test]
fn request_missing_a_field_fails_at_construction() {
    let json = r#"{
        "run": {"run_name": "r", "csv_path": "threads.csv", "metrics": [], "lr": 0.01},
        "pipeline": {"origin": "init", "classifier_id": "clf"}
    }"#;

    assert!(matches!(
        ClassifierTrainRequest::from_json(json),
        Err(CleanerError::InvalidRequest(_))
    ));
}

#[test]
fn missing_dataset_fails_the_call_without_a_run() {
    let root = tempfile::tempdir().unwrap();
    let settings = mk_settings(root.path());
    let mut cleaner = EmailCleaner::new(settings.clone());

    let request = ClassifierTrainRequest::from_json(
        r#"{
            "run": {"run_name": "r", "csv_path": "/nonexistent/threads.csv", "metrics": [], "lr": 0.01, "epochs": 1},
            "pipeline": {"origin": "init", "classifier_id": "clf"}
        }"#,
    )
    .unwrap();

    assert!(cleaner.train_classifier(&request).is_err());
    assert!(cleaner
        .tracker()
        .runs(&settings.classifier_experiment)
        .unwrap()
        .is_empty());
}
