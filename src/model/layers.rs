use ndarray::{prelude::*, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activation applied after a dense layer's affine map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Softmax,
}

impl Activation {
    /// Applies the activation to a batch of pre-activations, row by row.
    pub fn apply(self, mut z: Array2<f32>) -> Array2<f32> {
        match self {
            Self::Linear => {}
            Self::Relu => z.mapv_inplace(|v| v.max(0.)),
            Self::Sigmoid => z.mapv_inplace(sigmoid),
            Self::Softmax => {
                for mut row in z.rows_mut() {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row /= sum;
                }
            }
        }
        z
    }

    /// Turns the gradient w.r.t. the activations `a` into the gradient
    /// w.r.t. the pre-activations.
    pub fn derive(self, mut da: Array2<f32>, a: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Self::Linear => {}
            Self::Relu => da.zip_mut_with(&a, |d, &a| {
                if a <= 0. {
                    *d = 0.
                }
            }),
            Self::Sigmoid => da.zip_mut_with(&a, |d, &a| *d *= a * (1. - a)),
            Self::Softmax => {
                for (mut d_row, a_row) in da.rows_mut().into_iter().zip(a.rows()) {
                    let dot = d_row.dot(&a_row);
                    Zip::from(&mut d_row)
                        .and(&a_row)
                        .for_each(|d, &a| *d = a * (*d - dot));
                }
            }
        }
        da
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1. / (1. + (-x).exp())
}

/// Gradients of a [`Dense`] layer.
#[derive(Debug, Clone)]
pub struct DenseGrad {
    pub w: Array2<f32>,
    pub b: Array1<f32>,
}

/// Fully connected layer mapping `n_in` features to `n_out` outputs.
#[derive(Debug, Clone)]
pub struct Dense {
    pub(crate) w: Array2<f32>,
    pub(crate) b: Array1<f32>,
    act_fn: Activation,

    // Forward metadata
    x: Array2<f32>,
    a: Array2<f32>,
}

impl Dense {
    /// Creates a layer with Glorot-uniform weights and zero biases.
    pub fn init<R: Rng>(n_in: usize, n_out: usize, act_fn: Activation, rng: &mut R) -> Self {
        let limit = (6. / (n_in + n_out) as f32).sqrt();
        let w = Array2::from_shape_simple_fn((n_in, n_out), || rng.random_range(-limit..limit));
        Self::from_params(w, Array1::zeros(n_out), act_fn)
    }

    /// Creates a layer from existing parameters.
    ///
    /// # Panics
    /// If `b` doesn't have one entry per column of `w`.
    pub fn from_params(w: Array2<f32>, b: Array1<f32>, act_fn: Activation) -> Self {
        assert_eq!(w.ncols(), b.len(), "bias must match layer outputs");
        Self {
            w,
            b,
            act_fn,
            x: Array2::zeros((0, 0)),
            a: Array2::zeros((0, 0)),
        }
    }

    pub fn n_in(&self) -> usize {
        self.w.nrows()
    }

    pub fn n_out(&self) -> usize {
        self.w.ncols()
    }

    pub fn act_fn(&self) -> Activation {
        self.act_fn
    }

    /// Stateless forward pass.
    pub fn predict(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let z = x.dot(&self.w) + &self.b;
        self.act_fn.apply(z)
    }

    /// Forward pass keeping the input and activations for [`Dense::backward`].
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Array2<f32> {
        self.x = x.to_owned();
        self.a = self.predict(x);
        self.a.clone()
    }

    /// Backward pass from the gradient w.r.t. this layer's outputs.
    ///
    /// # Returns
    /// The parameter gradients and the gradient w.r.t. the layer's input.
    pub fn backward(&self, da: Array2<f32>) -> (DenseGrad, Array2<f32>) {
        let dz = self.act_fn.derive(da, self.a.view());
        self.backward_linear(dz)
    }

    /// Backward pass from the gradient w.r.t. the pre-activations, used when
    /// the loss already folded the output activation in.
    pub fn backward_linear(&self, dz: Array2<f32>) -> (DenseGrad, Array2<f32>) {
        let grad = DenseGrad {
            w: self.x.t().dot(&dz),
            b: dz.sum_axis(Axis(0)),
        };
        let dx = dz.dot(&self.w.t());
        (grad, dx)
    }
}

/// Inverted dropout: zeroes a `rate` share of the inputs while training and
/// rescales the rest so the expected activation is unchanged.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
    mask: Array2<f32>,
}

impl Dropout {
    /// # Panics
    /// If `rate` is not in `[0, 1)`.
    pub fn new(rate: f32) -> Self {
        assert!((0. ..1.).contains(&rate), "dropout rate must be in [0, 1)");
        Self {
            rate,
            mask: Array2::zeros((0, 0)),
        }
    }

    pub fn forward<R: Rng>(&mut self, x: Array2<f32>, rng: &mut R) -> Array2<f32> {
        let keep = 1. - self.rate;
        self.mask = Array2::from_shape_simple_fn(x.raw_dim(), || {
            if rng.random::<f32>() < keep {
                1. / keep
            } else {
                0.
            }
        });
        x * &self.mask
    }

    pub fn backward(&self, d: Array2<f32>) -> Array2<f32> {
        d * &self.mask
    }
}
