use std::path::PathBuf;

use super::{EncoderModel, Feature, FeatureCreator, PipelineModel, ALL_FEATURES};
use crate::{
    model::{seeded_rng, ClassifierConfig, ClassifierModel},
    settings::Settings,
    specs::{EncoderSpecs, Origin, PipelineSpecs},
    tracking::Tracker,
    CleanerError, Result,
};

/// Vocabulary cap (special tokens included) of a freshly trained tokenizer.
pub const DEFAULT_VOCAB_SIZE: usize = 4096;
/// Embedding width of a freshly initialised encoder.
pub const DEFAULT_ENCODER_DIM: usize = 64;

const CLASSIFIER_DIR: &str = "classifier";
const ENCODER_DIR: &str = "encoder";
const TOKENIZER_DIR: &str = "tokenizer";

/// Resolves model specs into loaded models.
///
/// * `local`: `<models_dir>/<id>/{encoder,tokenizer,classifier}`.
/// * `tracker`: the `encoder`, `tokenizer` and `classifier` artifacts of the
///   tracked run whose id is `<id>`.
/// * `init`: fresh weights, seeded from `Settings::seed` when set, with a
///   tokenizer trained on the store's corpus.
pub struct ModelStore<'a, K: Tracker + ?Sized> {
    settings: &'a Settings,
    tracker: &'a K,
    corpus: Vec<String>,
}

impl<'a, K: Tracker + ?Sized> ModelStore<'a, K> {
    pub fn new(settings: &'a Settings, tracker: &'a K) -> Self {
        Self {
            settings,
            tracker,
            corpus: Vec::new(),
        }
    }

    /// Lines the tokenizer of an `init` encoder is trained on. Without a
    /// corpus it only knows the special tokens.
    pub fn with_corpus<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        self.corpus = lines.iter().map(|l| l.as_ref().to_string()).collect();
        self
    }

    /// # Errors
    /// `InvalidRequest` for an unknown origin; `ModelNotFound`/`RunNotFound`
    /// for missing artifacts.
    pub fn load_encoder(&self, specs: &EncoderSpecs) -> Result<EncoderModel> {
        log::info!("loading encoder {} ({})", specs.encoder, specs.origin);
        let origin = specs.origin.parse()?;
        self.encoder(origin, &specs.encoder, None)
    }

    /// Loads the encoder, feature set and classifier of a pipeline.
    ///
    /// With `encoder_id`, the encoder is resolved under `encoder_origin`.
    /// Without one, it is the encoder stored next to the classifier, or a
    /// fresh one of `encoder_dim` (or the default width) for `init`.
    ///
    /// # Errors
    /// * `InvalidRequest` for an unknown origin.
    /// * `UnknownFeature` for an unknown feature name.
    /// * `ShapeMismatch` if a loaded encoder's width disagrees with
    ///   `encoder_dim`, or the classifier's input width with the features.
    /// * `ModelNotFound`/`RunNotFound` for missing artifacts.
    pub fn load_pipeline(&self, specs: &PipelineSpecs) -> Result<PipelineModel> {
        log::info!(
            "loading pipeline {} ({})",
            specs.classifier_id,
            specs.origin
        );
        let origin: Origin = specs.origin.parse()?;

        let features = match &specs.features {
            Some(names) => Feature::parse_all(names)?,
            None => ALL_FEATURES.to_vec(),
        };

        let encoder = match &specs.encoder_id {
            Some(id) => {
                let encoder_origin = match &specs.encoder_origin {
                    Some(name) => name.parse()?,
                    None if origin == Origin::Init => Origin::Tracker,
                    None => origin,
                };
                log::info!("loading encoder {id} ({encoder_origin})");
                self.encoder(encoder_origin, id, specs.encoder_dim)?
            }
            None => self.encoder(origin, &specs.classifier_id, specs.encoder_dim)?,
        };
        let creator = FeatureCreator::new(encoder, features);

        let classifier = match origin {
            Origin::Local => {
                ClassifierModel::load(&self.local_dir(&specs.classifier_id, CLASSIFIER_DIR))?
            }
            Origin::Tracker => ClassifierModel::load(
                &self.tracker.artifact_dir(&specs.classifier_id, CLASSIFIER_DIR)?,
            )?,
            Origin::Init => {
                let mut rng = seeded_rng(self.settings.seed);
                ClassifierModel::init(ClassifierConfig::new(creator.output_dim()), &mut rng)
            }
        };

        PipelineModel::new(creator, classifier, specs.encoder_id.clone())
    }

    fn encoder(&self, origin: Origin, id: &str, dim: Option<usize>) -> Result<EncoderModel> {
        let encoder = match origin {
            Origin::Local => EncoderModel::from_dirs(
                &self.local_dir(id, ENCODER_DIR),
                &self.local_dir(id, TOKENIZER_DIR),
            )?,
            Origin::Tracker => EncoderModel::from_dirs(
                &self.tracker.artifact_dir(id, ENCODER_DIR)?,
                &self.tracker.artifact_dir(id, TOKENIZER_DIR)?,
            )?,
            Origin::Init => {
                let mut rng = seeded_rng(self.settings.seed);
                return EncoderModel::init(
                    &self.corpus,
                    DEFAULT_VOCAB_SIZE,
                    self.settings.max_tokens,
                    dim.unwrap_or(DEFAULT_ENCODER_DIM),
                    &mut rng,
                );
            }
        };

        match dim {
            Some(expected) if expected != encoder.dim() => Err(CleanerError::ShapeMismatch {
                what: "encoder_dim",
                got: encoder.dim(),
                expected,
            }),
            _ => Ok(encoder),
        }
    }

    fn local_dir(&self, id: &str, part: &str) -> PathBuf {
        self.settings.models_dir.join(id).join(part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{EmailDataset, EmailThread, Line},
        specs::{FromJson, RunSpecs},
        tracking::{with_run, FileTracker},
        training,
    };

    const TEXT: &str = "Hi Bob,\nSee you\n-- \nAlice";

    fn settings(root: &std::path::Path) -> Settings {
        Settings {
            tracking_dir: root.join("mlruns"),
            staging_dir: root.join("temp"),
            models_dir: root.join("models"),
            max_tokens: 16,
            seed: Some(11),
            ..Settings::default()
        }
    }

    fn log_encoder(tracker: &mut FileTracker, dim: usize) -> (String, EncoderModel) {
        let mut rng = seeded_rng(Some(4));
        let corpus = ["Hi Bob,", "See you"];
        let encoder = EncoderModel::init(&corpus, 64, 16, dim, &mut rng).unwrap();
        let run_id = with_run(tracker, "encoder", |tracker, run| {
            tracker.log_model(&encoder.model, ENCODER_DIR)?;
            tracker.log_model(&encoder.tokenizer, TOKENIZER_DIR)?;
            Ok(run.run_id.clone())
        })
        .unwrap();
        (run_id, encoder)
    }

    #[test]
    fn init_pipeline_honours_encoder_dim_and_features() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let tracker = FileTracker::new(&settings.tracking_dir);
        let store = ModelStore::new(&settings, &tracker);

        let mut specs = PipelineSpecs::new(Origin::Init, "fresh");
        specs.encoder_dim = Some(12);
        specs.features = Some(vec!["blank".into(), "quoted".into()]);

        let pipeline = store.load_pipeline(&specs).unwrap();
        assert_eq!(pipeline.encoder_dim(), 12);
        assert_eq!(pipeline.classifier.config().input_dim, 14);
    }

    #[test]
    fn init_tokenizer_is_trained_on_the_corpus() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let tracker = FileTracker::new(&settings.tracking_dir);
        let store = ModelStore::new(&settings, &tracker).with_corpus(&["Lunch at noon"]);

        let encoder = store
            .load_encoder(&EncoderSpecs::new(Origin::Init, "base"))
            .unwrap();
        assert!(encoder.tokenizer.token_id("lunch").is_some());
        assert!(encoder.tokenizer.token_id("dinner").is_none());
    }

    #[test]
    fn local_pipeline_round_trips_through_models_dir() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let tracker = FileTracker::new(&settings.tracking_dir);
        let corpus: Vec<_> = TEXT.lines().collect();
        let store = ModelStore::new(&settings, &tracker).with_corpus(&corpus);

        let mut specs = PipelineSpecs::new(Origin::Init, "v1");
        specs.encoder_dim = Some(6);
        let pipeline = store.load_pipeline(&specs).unwrap();

        let dir = settings.models_dir.join("v1");
        pipeline.encoder.encoder.save(&dir).unwrap();
        pipeline.classifier.save(&dir.join(CLASSIFIER_DIR)).unwrap();

        specs.origin = Origin::Local.to_string();
        let loaded = store.load_pipeline(&specs).unwrap();
        assert_eq!(loaded.segment(TEXT).unwrap(), pipeline.segment(TEXT).unwrap());

        specs.encoder_id = Some("v1".into());
        let loaded = store.load_pipeline(&specs).unwrap();
        assert_eq!(loaded.segment(TEXT).unwrap(), pipeline.segment(TEXT).unwrap());

        specs.encoder_dim = Some(7);
        assert!(matches!(
            store.load_pipeline(&specs),
            Err(CleanerError::ShapeMismatch { what: "encoder_dim", .. })
        ));
    }

    #[test]
    fn tracker_encoder_is_read_from_run_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let mut tracker = FileTracker::new(&settings.tracking_dir);
        let (run_id, _) = log_encoder(&mut tracker, 5);

        let store = ModelStore::new(&settings, &tracker);
        let loaded = store
            .load_encoder(&EncoderSpecs::new(Origin::Tracker, run_id))
            .unwrap();
        assert_eq!(loaded.dim(), 5);
    }

    #[test]
    fn init_classifier_is_built_on_a_tracked_encoder() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let mut tracker = FileTracker::new(&settings.tracking_dir);
        let (run_id, encoder) = log_encoder(&mut tracker, 5);

        let store = ModelStore::new(&settings, &tracker);
        let mut specs = PipelineSpecs::new(Origin::Init, "fresh");
        specs.encoder_id = Some(run_id.clone());

        let pipeline = store.load_pipeline(&specs).unwrap();
        assert_eq!(pipeline.encoder_id.as_deref(), Some(run_id.as_str()));
        assert_eq!(pipeline.encoder.encoder.model.embeddings, encoder.model.embeddings);
        assert_eq!(
            pipeline.classifier.config().input_dim,
            5 + ALL_FEATURES.len()
        );

        specs.encoder_origin = Some(Origin::Local.to_string());
        assert!(matches!(
            store.load_pipeline(&specs),
            Err(CleanerError::ModelNotFound(_))
        ));
    }

    #[test]
    fn unknown_origin_fails_at_load() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let tracker = FileTracker::new(&settings.tracking_dir);
        let store = ModelStore::new(&settings, &tracker);

        let json = r#"{"origin": "hugg", "classifier_id": "x"}"#;
        let specs = PipelineSpecs::from_json(json).unwrap();
        assert!(matches!(
            store.load_pipeline(&specs),
            Err(CleanerError::InvalidRequest(msg)) if msg.contains("hugg")
        ));

        let mut specs = PipelineSpecs::new(Origin::Init, "x");
        specs.encoder_id = Some("e".into());
        specs.encoder_origin = Some("hugg".into());
        assert!(matches!(
            store.load_pipeline(&specs),
            Err(CleanerError::InvalidRequest(_))
        ));

        let encoder = EncoderSpecs::from_json(r#"{"origin": "hugg", "encoder": "e"}"#).unwrap();
        assert!(matches!(
            store.load_encoder(&encoder),
            Err(CleanerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn trained_classifier_run_reloads_as_a_whole_pipeline() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let mut tracker = FileTracker::new(&settings.tracking_dir);

        let mut hi = Line::new("Hi Bob,");
        hi.is_start = true;
        let mut body = Line::new("See you");
        body.is_body = true;
        let thread = EmailThread::new(vec![hi, body, Line::new("Alice")]);
        let dataset = EmailDataset::new(vec![thread]);

        let mut specs = PipelineSpecs::new(Origin::Init, "fresh");
        specs.encoder_dim = Some(6);
        let mut pipeline = ModelStore::new(&settings, &tracker)
            .with_corpus(&dataset.lines())
            .load_pipeline(&specs)
            .unwrap();

        let run_specs = RunSpecs {
            run_name: "classifier".into(),
            csv_path: String::new(),
            metrics: vec![],
            lr: 0.01,
            epochs: 2,
        };
        let trained = training::train_classifier(
            &settings,
            &mut tracker,
            &run_specs,
            &dataset,
            &mut pipeline,
        )
        .unwrap();

        let reloaded = ModelStore::new(&settings, &tracker)
            .load_pipeline(&PipelineSpecs::new(Origin::Tracker, trained.run.run_id))
            .unwrap();
        assert_eq!(reloaded.encoder_dim(), 6);
        assert_eq!(reloaded.segment(TEXT).unwrap(), pipeline.segment(TEXT).unwrap());
    }

    #[test]
    fn missing_local_model_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let tracker = FileTracker::new(&settings.tracking_dir);
        let store = ModelStore::new(&settings, &tracker);

        assert!(matches!(
            store.load_encoder(&EncoderSpecs::new(Origin::Local, "absent")),
            Err(CleanerError::ModelNotFound(_))
        ));
    }
}
