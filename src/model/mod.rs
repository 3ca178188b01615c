mod classifier;
mod encoder;
mod head;
pub mod layers;
pub mod loss;
pub mod metrics;
mod optimizer;
pub mod weights;

pub use classifier::{
    ClassifierConfig, ClassifierModel, CompiledClassifier, ThreadBatch, FACTORS,
};
pub use encoder::{Encoder, EncoderConfig};
pub use head::{CategoryHead, DROPOUT_RATE, LOSS_NAME};
pub use loss::MultifactorLoss;
pub use metrics::{History, Metric, METRICS};
pub use optimizer::Adam;

use rand::{rngs::StdRng, SeedableRng};

/// A seeded generator when `seed` is given, an OS-seeded one otherwise.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
