//! Service facade wiring settings, the tracker and the model store together.

use crate::{
    data::{EmailDataset, EmailLineDataset},
    pipeline::ModelStore,
    settings::Settings,
    specs::{ClassifierTrainRequest, EncoderTrainRequest, PipelineSpecs},
    tracking::{FileTracker, Tracker},
    training::{self, TrainedRun},
    Result,
};

/// Entry point for segmenting threads and training models.
pub struct EmailCleaner<K: Tracker = FileTracker> {
    settings: Settings,
    tracker: K,
}

impl EmailCleaner {
    /// A cleaner reporting to a [`FileTracker`] rooted at `settings.tracking_dir`.
    pub fn new(settings: Settings) -> Self {
        let tracker = FileTracker::new(&settings.tracking_dir);
        Self { settings, tracker }
    }
}

impl<K: Tracker> EmailCleaner<K> {
    pub fn with_tracker(settings: Settings, tracker: K) -> Self {
        Self { settings, tracker }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tracker(&self) -> &K {
        &self.tracker
    }

    /// Segments each thread text with the pipeline `specs` resolve to.
    ///
    /// # Returns
    /// A dataset holding one thread per input text, in input order.
    pub fn segment<S: AsRef<str>>(
        &self,
        threads: &[S],
        specs: &PipelineSpecs,
    ) -> Result<EmailDataset> {
        let pipeline = ModelStore::new(&self.settings, &self.tracker)
            .with_corpus(threads)
            .load_pipeline(specs)?;

        log::info!("segmenting {} threads", threads.len());
        let threads = threads
            .iter()
            .map(|text| pipeline.segment(text.as_ref()))
            .collect::<Result<_>>()?;

        Ok(EmailDataset::new(threads))
    }

    /// Trains the classifier of the requested pipeline on `request.run.csv_path`.
    pub fn train_classifier(&mut self, request: &ClassifierTrainRequest) -> Result<TrainedRun> {
        log::info!("loading thread dataset {}", request.run.csv_path);
        let dataset = EmailDataset::from_csv(&request.run.csv_path)?;
        let mut pipeline = ModelStore::new(&self.settings, &self.tracker)
            .with_corpus(&dataset.lines())
            .load_pipeline(&request.pipeline)?;

        training::train_classifier(
            &self.settings,
            &mut self.tracker,
            &request.run,
            &dataset,
            &mut pipeline,
        )
    }

    /// Fine-tunes the requested encoder on `request.run.csv_path`.
    pub fn train_encoder(&mut self, request: &EncoderTrainRequest) -> Result<TrainedRun> {
        log::info!("loading line dataset {}", request.run.csv_path);
        let dataset = EmailLineDataset::from_csv(&request.run.csv_path)?;
        let mut encoder = ModelStore::new(&self.settings, &self.tracker)
            .with_corpus(dataset.lines())
            .load_encoder(&request.encoder)?;

        training::train_encoder(
            &self.settings,
            &mut self.tracker,
            &request.run,
            &dataset,
            &mut encoder,
        )
    }
}
