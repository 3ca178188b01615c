use std::path::Path;

use ndarray::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::weights;
use crate::{tokenizer::Encoding, CleanerError, Result};

const EMBEDDINGS: &str = "embeddings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub vocab_size: usize,
    pub dim: usize,
}

/// Sentence encoder: token embeddings averaged over the attended positions.
#[derive(Debug, Clone)]
pub struct Encoder {
    config: EncoderConfig,
    pub(crate) embeddings: Array2<f32>,
}

impl Encoder {
    /// Creates an encoder with uniformly initialised embeddings.
    pub fn init<R: Rng>(config: EncoderConfig, rng: &mut R) -> Self {
        let embeddings = Array2::from_shape_simple_fn((config.vocab_size, config.dim), || {
            rng.random_range(-0.05..0.05)
        });
        Self { config, embeddings }
    }

    pub fn config(&self) -> EncoderConfig {
        self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Encodes a batch into one `dim`-vector per line.
    ///
    /// # Errors
    /// `ShapeMismatch` if a token id is outside the embedding table.
    pub fn forward(&self, encoding: &Encoding) -> Result<Array2<f32>> {
        let mut pooled = Array2::zeros((encoding.batch_size(), self.config.dim));

        for (b, mut out) in pooled.rows_mut().into_iter().enumerate() {
            let mut count = 0.;
            for (&id, &mask) in encoding
                .input_ids
                .row(b)
                .iter()
                .zip(encoding.attention_mask.row(b))
            {
                if mask == 0 {
                    continue;
                }
                out += &self.embedding(id)?;
                count += 1.;
            }
            if count > 0. {
                out /= count;
            }
        }

        Ok(pooled)
    }

    /// Gradient of the embedding table given the gradient w.r.t. the pooled outputs.
    pub fn backward(&self, encoding: &Encoding, d_pooled: ArrayView2<f32>) -> Array2<f32> {
        let mut grad = Array2::zeros(self.embeddings.raw_dim());

        for (b, d) in d_pooled.rows().into_iter().enumerate() {
            let mask = encoding.attention_mask.row(b);
            let count = mask.iter().filter(|&&m| m != 0).count();
            if count == 0 {
                continue;
            }

            let share = &d / count as f32;
            for (&id, &m) in encoding.input_ids.row(b).iter().zip(mask) {
                if m != 0 {
                    let mut row = grad.row_mut(id as usize);
                    row += &share;
                }
            }
        }

        grad
    }

    fn embedding(&self, id: u32) -> Result<ArrayView1<'_, f32>> {
        let id = id as usize;
        if id >= self.config.vocab_size {
            return Err(CleanerError::ShapeMismatch {
                what: "token id",
                got: id,
                expected: self.config.vocab_size,
            });
        }
        Ok(self.embeddings.row(id))
    }

    /// Writes `config.json` and `model.safetensors` into `dir`.
    pub fn save_pretrained(&self, dir: &Path) -> Result<()> {
        weights::save(dir, &self.config, &[(EMBEDDINGS, self.embeddings.clone().into_dyn())])
    }

    /// Reads an encoder written by [`Encoder::save_pretrained`].
    pub fn from_pretrained(dir: &Path) -> Result<Self> {
        let (config, mut tensors): (EncoderConfig, _) = weights::load(dir)?;
        let embeddings: Array2<f32> = weights::take(&mut tensors, EMBEDDINGS)?;

        if embeddings.dim() != (config.vocab_size, config.dim) {
            return Err(CleanerError::ShapeMismatch {
                what: "embeddings",
                got: embeddings.len(),
                expected: config.vocab_size * config.dim,
            });
        }

        Ok(Self { config, embeddings })
    }
}
