//! Command-line surface over the ledger.

pub mod commands;

pub use commands::{Command, Opt};
