//! Configuration loading and offline inspection commands behind the
//! `crewline` binary.

/// Report rendering for each subcommand.
pub mod commands;
/// `crewline.toml` loading and validation.
pub mod config;

pub use config::CrewlineConfig;
