use std::path::Path;

use ndarray::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    layers::{Activation, Dense},
    loss::MultifactorLoss,
    metrics::{History, Metric, MetricState},
    optimizer::Adam,
    weights,
};
use crate::{CleanerError, Result};

/// Number of independent outputs per line: `[start, body]`.
pub const FACTORS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub factors: usize,
}

impl ClassifierConfig {
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dim: 32,
            factors: FACTORS,
        }
    }
}

/// Line classifier: `Dense(relu) -> Dense(sigmoid)` over per-line features.
#[derive(Debug, Clone)]
pub struct ClassifierModel {
    config: ClassifierConfig,
    hidden: Dense,
    output: Dense,
}

/// One training step's worth of data: a thread's feature matrix and its
/// `[start, body]` targets.
pub type ThreadBatch = (Array2<f32>, Array2<f32>);

impl ClassifierModel {
    pub fn init<R: Rng>(config: ClassifierConfig, rng: &mut R) -> Self {
        Self {
            config,
            hidden: Dense::init(config.input_dim, config.hidden_dim, Activation::Relu, rng),
            output: Dense::init(config.hidden_dim, config.factors, Activation::Sigmoid, rng),
        }
    }

    pub fn config(&self) -> ClassifierConfig {
        self.config
    }

    /// Per-line factor probabilities.
    ///
    /// # Errors
    /// `ShapeMismatch` if `x` doesn't have `input_dim` columns.
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(x.ncols())?;
        let h = self.hidden.predict(x);
        Ok(self.output.predict(h.view()))
    }

    /// Binds an optimizer, a loss and a metric set to the model.
    pub fn compile(
        &mut self,
        learning_rate: f32,
        loss: MultifactorLoss,
        metrics: Vec<Metric>,
    ) -> CompiledClassifier<'_> {
        let optimizers = [
            Adam::new(self.hidden.w.len(), learning_rate),
            Adam::new(self.hidden.b.len(), learning_rate),
            Adam::new(self.output.w.len(), learning_rate),
            Adam::new(self.output.b.len(), learning_rate),
        ];

        CompiledClassifier {
            model: self,
            optimizers,
            loss,
            metrics,
        }
    }

    fn check_input(&self, got: usize) -> Result<()> {
        if got != self.config.input_dim {
            return Err(CleanerError::ShapeMismatch {
                what: "classifier input",
                got,
                expected: self.config.input_dim,
            });
        }
        Ok(())
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        weights::save(
            dir,
            &self.config,
            &[
                ("hidden.w", self.hidden.w.clone().into_dyn()),
                ("hidden.b", self.hidden.b.clone().into_dyn()),
                ("output.w", self.output.w.clone().into_dyn()),
                ("output.b", self.output.b.clone().into_dyn()),
            ],
        )
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let (config, mut tensors): (ClassifierConfig, _) = weights::load(dir)?;

        let hidden_w: Array2<f32> = weights::take(&mut tensors, "hidden.w")?;
        let hidden_b: Array1<f32> = weights::take(&mut tensors, "hidden.b")?;
        let output_w: Array2<f32> = weights::take(&mut tensors, "output.w")?;
        let output_b: Array1<f32> = weights::take(&mut tensors, "output.b")?;

        let expected = [
            (hidden_w.dim(), (config.input_dim, config.hidden_dim)),
            (output_w.dim(), (config.hidden_dim, config.factors)),
        ];
        for (got, want) in expected {
            if got != want {
                return Err(CleanerError::ShapeMismatch {
                    what: "classifier weights",
                    got: got.0 * got.1,
                    expected: want.0 * want.1,
                });
            }
        }
        if hidden_b.len() != config.hidden_dim || output_b.len() != config.factors {
            return Err(CleanerError::Serialization(
                "classifier biases don't match config".into(),
            ));
        }

        Ok(Self {
            config,
            hidden: Dense::from_params(hidden_w, hidden_b, Activation::Relu),
            output: Dense::from_params(output_w, output_b, Activation::Sigmoid),
        })
    }
}

/// A classifier bound to its optimizer state, loss and metrics.
pub struct CompiledClassifier<'m> {
    model: &'m mut ClassifierModel,
    optimizers: [Adam; 4],
    loss: MultifactorLoss,
    metrics: Vec<Metric>,
}

impl CompiledClassifier<'_> {
    /// Trains for `epochs` passes over `feed`, one optimizer step per thread.
    ///
    /// # Returns
    /// The per-epoch mean loss under `"loss"` and every compiled metric under its name.
    pub fn fit(&mut self, feed: &[ThreadBatch], epochs: usize) -> Result<History> {
        let mut history = History::new();

        for epoch in 0..epochs {
            let mut state = MetricState::new(self.model.config.factors);
            let mut total_loss = 0.;
            let mut steps = 0;

            for (x, y) in feed.iter().filter(|(x, _)| x.nrows() > 0) {
                total_loss += self.train_step(x.view(), y.view(), &mut state)? as f64;
                steps += 1;
            }

            let loss = if steps == 0 { 0. } else { total_loss / steps as f64 };
            history.record("loss", loss);
            for metric in &self.metrics {
                history.record(metric.name(), state.value(*metric));
            }

            log::debug!("epoch {}/{epochs}: loss {loss:.4}", epoch + 1);
        }

        Ok(history)
    }

    fn train_step(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        state: &mut MetricState,
    ) -> Result<f32> {
        let model = &mut *self.model;
        model.check_input(x.ncols())?;

        let h = model.hidden.forward(x);
        let probs = model.output.forward(h.view());
        let (loss, dz) = self.loss.compute(probs.view(), y)?;
        state.update(probs.view(), y);

        let (output_grad, dh) = model.output.backward_linear(dz);
        let (hidden_grad, _) = model.hidden.backward(dh);

        let [hw, hb, ow, ob] = &mut self.optimizers;
        hw.update(&hidden_grad.w, &mut model.hidden.w)?;
        hb.update(&hidden_grad.b, &mut model.hidden.b)?;
        ow.update(&output_grad.w, &mut model.output.w)?;
        ob.update(&output_grad.b, &mut model.output.b)?;

        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn separable_feed() -> Vec<ThreadBatch> {
        // Feature 0 marks message starts, feature 1 marks body lines.
        let x = array![[1f32, 0.], [0., 1.], [0., 1.], [1., 0.], [0., 0.]];
        let y = array![[1f32, 0.], [0., 1.], [0., 1.], [1., 0.], [0., 0.]];
        vec![(x.clone(), y.clone()), (x, y)]
    }

    #[test]
    fn fit_reduces_loss_and_records_metrics() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut model = ClassifierModel::init(ClassifierConfig::new(2), &mut rng);

        let history = model
            .compile(0.05, MultifactorLoss::default(), vec![Metric::Accuracy])
            .fit(&separable_feed(), 150)
            .unwrap();

        let losses = history.get("loss").unwrap();
        assert_eq!(losses.len(), 150);
        assert!(losses[149] < losses[0]);
        assert_eq!(history.last("accuracy"), Some(1.));
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = ClassifierModel::init(ClassifierConfig::new(3), &mut rng);
        assert!(model.predict(Array2::zeros((1, 2)).view()).is_err());
    }

    #[test]
    fn save_and_load_keep_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let model = ClassifierModel::init(ClassifierConfig::new(4), &mut rng);
        model.save(dir.path()).unwrap();

        let loaded = ClassifierModel::load(dir.path()).unwrap();
        let x = Array2::from_elem((3, 4), 0.3);
        assert_eq!(loaded.predict(x.view()).unwrap(), model.predict(x.view()).unwrap());
    }
}
