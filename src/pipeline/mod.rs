//! From raw thread text to segmented lines.

mod features;
mod store;

use std::path::Path;

use ndarray::prelude::*;
use rand::Rng;

pub use features::{Feature, FeatureCreator, ALL_FEATURES};
pub use store::{ModelStore, DEFAULT_ENCODER_DIM, DEFAULT_VOCAB_SIZE};

use crate::{
    data::{EmailDataset, EmailThread},
    model::{metrics, ClassifierModel, Encoder, EncoderConfig, ThreadBatch},
    tokenizer::Tokenizer,
    CleanerError, Result,
};

const ENCODER_DIR: &str = "encoder";
const TOKENIZER_DIR: &str = "tokenizer";

/// A sentence encoder together with the tokenizer it was trained with.
#[derive(Debug, Clone)]
pub struct EncoderModel {
    pub tokenizer: Tokenizer,
    pub model: Encoder,
}

impl EncoderModel {
    /// A freshly initialised encoder over a vocabulary trained on `corpus`.
    ///
    /// # Arguments
    /// * `corpus` - Lines the tokenizer vocabulary is trained on.
    /// * `vocab_size` - Upper bound on the vocabulary, special tokens included.
    /// * `max_len` - Maximum tokens per line.
    /// * `dim` - Embedding width.
    pub fn init<S, R>(
        corpus: &[S],
        vocab_size: usize,
        max_len: usize,
        dim: usize,
        rng: &mut R,
    ) -> Result<Self>
    where
        S: AsRef<str> + Sync,
        R: Rng,
    {
        let tokenizer = Tokenizer::train(corpus, vocab_size, max_len)?;
        let config = EncoderConfig {
            vocab_size: tokenizer.vocab_size(),
            dim,
        };
        let model = Encoder::init(config, rng);
        Ok(Self { tokenizer, model })
    }

    /// Pairs a tokenizer with an encoder, checking that every id the
    /// tokenizer can emit has an embedding.
    pub fn new(tokenizer: Tokenizer, model: Encoder) -> Result<Self> {
        let vocab_size = model.config().vocab_size;
        if tokenizer.vocab_size() != vocab_size {
            return Err(CleanerError::ShapeMismatch {
                what: "tokenizer vocab_size",
                got: tokenizer.vocab_size(),
                expected: vocab_size,
            });
        }
        Ok(Self { tokenizer, model })
    }

    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    /// One embedding row per line.
    pub fn embed<S: AsRef<str>>(&self, lines: &[S]) -> Result<Array2<f32>> {
        let encoding = self.tokenizer.encode_batch(lines)?;
        self.model.forward(&encoding)
    }

    /// Loads `dir/encoder` and `dir/tokenizer`.
    pub fn from_dirs(encoder_dir: &Path, tokenizer_dir: &Path) -> Result<Self> {
        let model = Encoder::from_pretrained(encoder_dir)?;
        let tokenizer = Tokenizer::from_pretrained(tokenizer_dir)?;
        Self::new(tokenizer, model)
    }

    /// Writes the encoder and tokenizer under `dir/encoder` and `dir/tokenizer`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.model.save_pretrained(&dir.join(ENCODER_DIR))?;
        self.tokenizer.save_pretrained(&dir.join(TOKENIZER_DIR))
    }

    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_dirs(&dir.join(ENCODER_DIR), &dir.join(TOKENIZER_DIR))
    }
}

/// The full segmentation pipeline: feature creation followed by the
/// two-factor line classifier.
#[derive(Debug, Clone)]
pub struct PipelineModel {
    pub encoder: FeatureCreator,
    pub classifier: ClassifierModel,
    pub encoder_id: Option<String>,
}

impl PipelineModel {
    /// # Errors
    /// `ShapeMismatch` if the classifier's input width differs from the
    /// width of the features the encoder produces.
    pub fn new(
        encoder: FeatureCreator,
        classifier: ClassifierModel,
        encoder_id: Option<String>,
    ) -> Result<Self> {
        let expected = encoder.output_dim();
        let got = classifier.config().input_dim;
        if got != expected {
            return Err(CleanerError::ShapeMismatch {
                what: "classifier input_dim",
                got,
                expected,
            });
        }

        Ok(Self {
            encoder,
            classifier,
            encoder_id,
        })
    }

    pub fn encoder_dim(&self) -> usize {
        self.encoder.encoder.dim()
    }

    pub fn features(&self) -> &[Feature] {
        self.encoder.features()
    }

    /// Splits `text` into lines and labels each of them.
    ///
    /// The first line of a thread always opens a message.
    pub fn segment(&self, text: &str) -> Result<EmailThread> {
        let mut thread = EmailThread::from_text(text);
        if thread.is_empty() {
            return Ok(thread);
        }

        let x = self.encoder.create(&thread.texts())?;
        let probs = self.classifier.predict(x.view())?;

        for (line, p) in thread.lines.iter_mut().zip(probs.rows()) {
            line.is_start = metrics::is_set(p[0]);
            line.is_body = metrics::is_set(p[1]);
        }
        thread.lines[0].is_start = true;

        Ok(thread)
    }

    /// Turns a labelled dataset into per-thread `(features, targets)` batches.
    /// Empty threads are skipped.
    pub fn feed(&self, dataset: &EmailDataset) -> Result<Vec<ThreadBatch>> {
        let mut feed = Vec::with_capacity(dataset.len());

        for (lines, labels) in dataset.samples() {
            if lines.is_empty() {
                continue;
            }

            let x = self.encoder.create(&lines)?;
            let flat: Vec<f32> = labels.iter().flatten().copied().collect();
            let y = Array2::from_shape_vec((labels.len(), labels[0].len()), flat)?;
            feed.push((x, y));
        }

        Ok(feed)
    }
}
