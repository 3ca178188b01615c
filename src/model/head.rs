use rand::Rng;

use super::{
    encoder::Encoder,
    layers::{Activation, Dense, Dropout},
    loss::sparse_categorical_crossentropy,
    metrics::History,
    optimizer::Adam,
};
use crate::{data::LineCategory, tokenizer::Encoding, Result};

pub const DROPOUT_RATE: f32 = 0.2;

pub const LOSS_NAME: &str = "sparse_categorical_crossentropy";

/// Encoder fine-tuning graph: `encoder -> dropout(0.2) -> dense(7, softmax)`.
///
/// The dense head only exists for training; the encoder it wraps is the
/// artifact that gets kept.
pub struct CategoryHead<'e, R: Rng> {
    encoder: &'e mut Encoder,
    dropout: Dropout,
    dense: Dense,
    optimizers: [Adam; 3],
    rng: R,
}

impl<'e, R: Rng> CategoryHead<'e, R> {
    /// Wraps `encoder` with a freshly initialised head and Adam state for every tensor.
    pub fn compile(encoder: &'e mut Encoder, learning_rate: f32, mut rng: R) -> Self {
        let dense = Dense::init(
            encoder.dim(),
            LineCategory::COUNT,
            Activation::Softmax,
            &mut rng,
        );

        let optimizers = [
            Adam::new(encoder.embeddings.len(), learning_rate),
            Adam::new(dense.w.len(), learning_rate),
            Adam::new(dense.b.len(), learning_rate),
        ];

        Self {
            encoder,
            dropout: Dropout::new(DROPOUT_RATE),
            dense,
            optimizers,
            rng,
        }
    }

    /// Trains for `epochs` passes over `feed`, one optimizer step per batch.
    ///
    /// # Returns
    /// The per-epoch mean loss under `"loss"`.
    pub fn fit(&mut self, feed: &[(Encoding, Vec<usize>)], epochs: usize) -> Result<History> {
        let mut history = History::new();

        for epoch in 0..epochs {
            let mut total_loss = 0.;
            let mut steps = 0;

            for (encoding, labels) in feed.iter().filter(|(e, _)| e.batch_size() > 0) {
                total_loss += self.train_step(encoding, labels)? as f64;
                steps += 1;
            }

            let loss = if steps == 0 { 0. } else { total_loss / steps as f64 };
            history.record("loss", loss);
            log::debug!("epoch {}/{epochs}: loss {loss:.4}", epoch + 1);
        }

        Ok(history)
    }

    fn train_step(&mut self, encoding: &Encoding, labels: &[usize]) -> Result<f32> {
        let pooled = self.encoder.forward(encoding)?;
        let dropped = self.dropout.forward(pooled, &mut self.rng);
        let probs = self.dense.forward(dropped.view());

        let (loss, dz) = sparse_categorical_crossentropy(probs.view(), labels)?;

        let (dense_grad, d_dropped) = self.dense.backward_linear(dz);
        let d_pooled = self.dropout.backward(d_dropped);
        let embeddings_grad = self.encoder.backward(encoding, d_pooled.view());

        let [emb, w, b] = &mut self.optimizers;
        emb.update(&embeddings_grad, &mut self.encoder.embeddings)?;
        w.update(&dense_grad.w, &mut self.dense.w)?;
        b.update(&dense_grad.b, &mut self.dense.b)?;

        Ok(loss)
    }
}
