mod dataset;
mod thread;

pub use dataset::{EmailDataset, EmailLineDataset, LineCategory};
pub use thread::{EmailThread, Line};
