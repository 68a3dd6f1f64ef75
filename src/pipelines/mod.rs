pub mod zero_shot_classification_pipeline;

pub use zero_shot_classification_pipeline::*;
