//! Configuration module for the Baculum API
//!
//! Provides CLI arguments and the JSON configuration file.

mod settings;

pub use settings::*;
