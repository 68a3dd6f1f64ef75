pub mod components;
pub mod engine;
pub mod implementations;

pub use engine::{InferenceEngine, PaddleEngine};
pub use implementations::UtcModel;
