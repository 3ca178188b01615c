//! The two training entry points: the line classifier of a pipeline and the
//! sentence encoder.

use crate::{
    data::{EmailDataset, EmailLineDataset},
    model::{seeded_rng, CategoryHead, History, Metric, MultifactorLoss, LOSS_NAME},
    pipeline::{EncoderModel, PipelineModel},
    settings::Settings,
    specs::RunSpecs,
    staging::StagingDir,
    tracking::{with_run, RunInfo, Tracker},
    CleanerError, Result,
};

const OPTIMIZER: &str = "adam";

/// The tracked run a training call produced and its per-epoch history.
#[derive(Debug, Clone)]
pub struct TrainedRun {
    pub run: RunInfo,
    pub history: History,
}

/// Trains the classifier of `pipeline` on a thread-level dataset.
///
/// The run's `classifier`, `encoder` and `tokenizer` artifacts together make
/// up the whole pipeline, so it can be reloaded from the run id alone.
///
/// # Arguments
/// * `settings` - Runtime settings; selects the experiment.
/// * `tracker` - Receives params, final metrics and the trained classifier.
/// * `run_specs` - Run name, learning rate, epochs and metric names.
/// * `dataset` - Labelled threads.
/// * `pipeline` - The pipeline whose classifier is trained in place.
///
/// # Errors
/// `UnknownMetric` before anything is tracked if a metric name is unknown.
/// Every other failure ends the run as failed and is returned unchanged.
pub fn train_classifier<K: Tracker + ?Sized>(
    settings: &Settings,
    tracker: &mut K,
    run_specs: &RunSpecs,
    dataset: &EmailDataset,
    pipeline: &mut PipelineModel,
) -> Result<TrainedRun> {
    let metrics = Metric::parse_all(&run_specs.metrics)?;
    tracker.set_experiment(&settings.classifier_experiment)?;

    with_run(tracker, &run_specs.run_name, |tracker, run| {
        let features: Vec<_> = pipeline.features().iter().map(|f| f.name()).collect();
        tracker.log_params(&[
            ("epochs", run_specs.epochs.to_string()),
            ("optimizer", OPTIMIZER.to_string()),
            ("lr", run_specs.lr.to_string()),
            ("loss", MultifactorLoss::NAME.to_string()),
            ("metrics", run_specs.metrics.join(",")),
            (
                "encoder_id",
                pipeline.encoder_id.clone().unwrap_or_else(|| "none".into()),
            ),
            ("encoder_dim", pipeline.encoder_dim().to_string()),
            ("features", features.join(",")),
        ])?;

        log::info!("creating features for {} threads", dataset.len());
        let feed = pipeline.feed(dataset)?;

        log::info!("training classifier...");
        let history = pipeline
            .classifier
            .compile(run_specs.lr, MultifactorLoss::default(), metrics.clone())
            .fit(&feed, run_specs.epochs)?;

        let last: Vec<_> = metrics
            .iter()
            .filter_map(|m| history.last(m.name()).map(|v| (m.name(), v)))
            .collect();
        tracker.log_metrics(&last)?;

        log::info!("logging pipeline to tracker");
        tracker.log_model(&pipeline.classifier, "classifier")?;
        tracker.log_model(&pipeline.encoder.encoder.model, "encoder")?;
        tracker.log_model(&pipeline.encoder.encoder.tokenizer, "tokenizer")?;

        log::info!("training complete");
        Ok(TrainedRun {
            run: run.clone(),
            history,
        })
    })
}

/// Fine-tunes `encoder` on a line-level dataset through a 7-way category head.
///
/// The trained encoder and its tokenizer are staged under
/// `<staging_dir>/<run_id>` and logged as the run's `encoder` and
/// `tokenizer` artifacts. The staging directory is gone once this returns,
/// whatever the outcome.
///
/// # Errors
/// `StagingConflict` if the run's staging directory already exists; any
/// training, I/O or tracker error otherwise. The run is then ended as failed.
pub fn train_encoder<K: Tracker + ?Sized>(
    settings: &Settings,
    tracker: &mut K,
    run_specs: &RunSpecs,
    dataset: &EmailLineDataset,
    encoder: &mut EncoderModel,
) -> Result<TrainedRun> {
    if settings.line_batch_size == 0 {
        return Err(CleanerError::InvalidRequest(
            "line_batch_size must be positive".into(),
        ));
    }
    tracker.set_experiment(&settings.encoder_experiment)?;

    with_run(tracker, &run_specs.run_name, |tracker, run| {
        tracker.log_params(&[
            ("epochs", run_specs.epochs.to_string()),
            ("optimizer", OPTIMIZER.to_string()),
            ("lr", run_specs.lr.to_string()),
            ("loss", LOSS_NAME.to_string()),
        ])?;

        let feed = dataset
            .samples(settings.line_batch_size)
            .map(|(lines, labels)| Ok((encoder.tokenizer.encode_batch(lines)?, labels)))
            .collect::<Result<Vec<_>>>()?;

        log::info!("training encoder on {} lines...", dataset.len());
        let rng = seeded_rng(settings.seed);
        let history = CategoryHead::compile(&mut encoder.model, run_specs.lr, rng)
            .fit(&feed, run_specs.epochs)?;

        if let Some(loss) = history.last("loss") {
            tracker.log_metrics(&[("loss", loss)])?;
        }

        let staging = StagingDir::create(&settings.staging_dir, &run.run_id)?;
        log::info!("saving model in staging dir {}", staging.path().display());
        encoder.save(staging.path())?;

        log::info!("logging encoder to tracker");
        tracker.log_artifacts(&staging.join("encoder"), "encoder")?;
        tracker.log_artifacts(&staging.join("tokenizer"), "tokenizer")?;
        staging.close()?;

        log::info!("training complete");
        Ok(TrainedRun {
            run: run.clone(),
            history,
        })
    })
}
