use ndarray::prelude::*;

use crate::{CleanerError, Result};

const EPS: f32 = 1e-7;

/// Mean sparse categorical cross-entropy over a batch of softmax outputs.
///
/// # Returns
/// The loss and its gradient w.r.t. the softmax *pre-activations*.
///
/// # Errors
/// `ShapeMismatch` if there isn't one label per row, `InvalidData` if a
/// label is not a valid class index.
pub fn sparse_categorical_crossentropy(
    probs: ArrayView2<f32>,
    labels: &[usize],
) -> Result<(f32, Array2<f32>)> {
    let (n, classes) = probs.dim();
    if labels.len() != n {
        return Err(CleanerError::ShapeMismatch {
            what: "labels",
            got: labels.len(),
            expected: n,
        });
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= classes) {
        return Err(CleanerError::InvalidData(format!(
            "label {bad} out of range for {classes} classes"
        )));
    }

    let mut dz = probs.to_owned();
    let mut loss = 0.;
    for (i, &label) in labels.iter().enumerate() {
        loss -= probs[[i, label]].clamp(EPS, 1.).ln();
        dz[[i, label]] -= 1.;
    }

    let scale = 1. / n.max(1) as f32;
    Ok((loss * scale, dz * scale))
}

/// Weighted sum of per-factor binary cross-entropies, one factor per output column.
///
/// Used by the line classifier, whose outputs are independent sigmoid
/// factors (`[start, body]`).
#[derive(Debug, Clone, PartialEq)]
pub struct MultifactorLoss {
    weights: Vec<f32>,
}

impl Default for MultifactorLoss {
    fn default() -> Self {
        Self::new(vec![1., 1.])
    }
}

impl MultifactorLoss {
    pub const NAME: &'static str = "multifactor_loss";

    pub fn new(weights: Vec<f32>) -> Self {
        Self { weights }
    }

    pub fn factors(&self) -> usize {
        self.weights.len()
    }

    /// # Returns
    /// The loss and its gradient w.r.t. the sigmoid *pre-activations*.
    ///
    /// # Errors
    /// `ShapeMismatch` if `probs` and `targets` disagree or have the wrong number of factors.
    pub fn compute(
        &self,
        probs: ArrayView2<f32>,
        targets: ArrayView2<f32>,
    ) -> Result<(f32, Array2<f32>)> {
        if probs.dim() != targets.dim() {
            return Err(CleanerError::ShapeMismatch {
                what: "targets",
                got: targets.len(),
                expected: probs.len(),
            });
        }
        if probs.ncols() != self.weights.len() {
            return Err(CleanerError::ShapeMismatch {
                what: "factors",
                got: probs.ncols(),
                expected: self.weights.len(),
            });
        }

        let scale = 1. / probs.nrows().max(1) as f32;
        let mut loss = 0.;
        let mut dz = Array2::zeros(probs.raw_dim());

        for ((i, k), &p) in probs.indexed_iter() {
            let y = targets[[i, k]];
            let w = self.weights[k];
            let pc = p.clamp(EPS, 1. - EPS);
            loss -= w * (y * pc.ln() + (1. - y) * (1. - pc).ln());
            dz[[i, k]] = w * (p - y) * scale;
        }

        Ok((loss * scale, dz))
    }
}
