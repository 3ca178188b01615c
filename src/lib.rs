pub mod control;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod settings;
pub mod specs;
pub mod staging;
pub mod tokenizer;
pub mod tracking;
pub mod training;

pub use control::EmailCleaner;
pub use error::{CleanerError, Result};
pub use settings::Settings;
