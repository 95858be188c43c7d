//! Process-global configuration sourced from environment variables.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
