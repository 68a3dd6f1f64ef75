pub mod utc;

pub use utc::UtcModel;
