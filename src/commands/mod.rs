//! Subcommands of the `utc` binary.

pub mod download;

pub use download::DEFAULT_PATH;
